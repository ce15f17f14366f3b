//! End-to-end pipeline runs against the in-memory object store.
//!
//! Each test seeds a source bucket, runs the full state machine and checks
//! the published archive, the reported result and the remote calls issued.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;
use zip::ZipArchive;

use s3_folder_zipper::cloud::memory::{CallCounts, MemoryObjectStore};
use s3_folder_zipper::config::PipelineConfig;
use s3_folder_zipper::logging::RunLogger;
use s3_folder_zipper::models::{PipelineResult, PipelineStatus, Stage};
use s3_folder_zipper::pipeline::Pipeline;

const SRC: &str = "src";
const DST: &str = "dst";

fn config_for(temp: &TempDir, prefixes: &[&str]) -> PipelineConfig {
    PipelineConfig::new(
        SRC,
        DST,
        prefixes.iter().map(|p| p.to_string()).collect(),
        "out.zip",
        temp.path().join("stage"),
    )
}

async fn run(store: &Arc<MemoryObjectStore>, config: PipelineConfig) -> PipelineResult {
    Pipeline::new(config, store.clone(), RunLogger::new("test-run"))
        .run()
        .await
}

/// Entries of the published archive, in archive order.
fn published_entries(store: &MemoryObjectStore, key: &str) -> Result<Vec<(String, Vec<u8>)>> {
    let bytes = store.get(DST, key).expect("archive was not published");
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        entries.push((file.name().to_string(), content));
    }
    Ok(entries)
}

fn seed_two_folders(store: &MemoryObjectStore) {
    store.insert(SRC, "a/x.txt", b"contents of x".to_vec());
    store.insert(SRC, "a/sub/y.txt", b"contents of y".to_vec());
    store.insert(SRC, "b/z.txt", b"contents of z".to_vec());
}

#[tokio::test]
async fn test_two_prefixes_produce_stripped_entries() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    seed_two_folders(&store);

    let config = config_for(&temp, &["a/", "b/"]);
    let staging_root = config.local_staging_root.clone();
    let result = run(&store, config).await;

    assert_eq!(result.status, PipelineStatus::Success);
    assert_eq!(result.archive_remote_location, "s3://dst/out.zip");
    assert_eq!(result.object_count, 3);
    assert_eq!(result.total_bytes, 39);
    assert!(result.error_detail.is_none());

    let entries = published_entries(&store, "out.zip")?;
    let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["x.txt", "sub/y.txt", "z.txt"]);
    assert_eq!(entries[1].1, b"contents of y");

    // delete_local_after defaults to true
    assert!(!staging_root.exists());
    assert!(result.local_archive_path.is_none());
    Ok(())
}

#[tokio::test]
async fn test_entry_count_is_sum_over_prefixes() -> Result<()> {
    let temp = TempDir::new()?;
    // Small pages exercise continuation tokens
    let store = Arc::new(MemoryObjectStore::with_page_size(2));

    let mut expected = BTreeMap::new();
    for (prefix, count) in [("p1/", 5usize), ("p2/", 1), ("p3/", 3)] {
        for i in 0..count {
            let name = format!("{}file-{}.bin", &prefix[..2], i);
            let content: Vec<u8> = (0..(i * 997 + 13)).map(|b| (b % 256) as u8).collect();
            store.insert(SRC, &format!("{}{}", prefix, name), content.clone());
            expected.insert(name, content);
        }
    }

    let result = run(&store, config_for(&temp, &["p1/", "p2/", "p3/"])).await;
    assert_eq!(result.status, PipelineStatus::Success);
    assert_eq!(result.object_count, 9);

    let entries = published_entries(&store, "out.zip")?;
    assert_eq!(entries.len(), 9);
    for (name, content) in entries {
        assert_eq!(expected.get(&name), Some(&content), "mismatch for {}", name);
    }
    Ok(())
}

#[tokio::test]
async fn test_second_run_is_skipped() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    seed_two_folders(&store);

    let mut config = config_for(&temp, &["a/", "b/"]);
    config.skip_if_exists = true;

    let first = run(&store, config.clone()).await;
    assert_eq!(first.status, PipelineStatus::Success);
    let after_first = store.calls();

    let second = run(&store, config).await;
    assert_eq!(second.status, PipelineStatus::Skipped);
    assert_eq!(second.archive_remote_location, first.archive_remote_location);

    let after_second = store.calls();
    assert_eq!(after_second.put, 1);
    assert_eq!(after_second.list, after_first.list);
    assert_eq!(after_second.get, after_first.get);
    assert_eq!(after_second.head, after_first.head + 1);
    Ok(())
}

#[tokio::test]
async fn test_existing_destination_short_circuits() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    seed_two_folders(&store);
    store.insert(DST, "exports/out.zip", b"previous archive".to_vec());

    let mut config = config_for(&temp, &["a/", "b/"]);
    config.skip_if_exists = true;
    config.destination_prefix = "exports/".to_string();
    let staging_root = config.local_staging_root.clone();

    let result = run(&store, config).await;
    assert_eq!(result.status, PipelineStatus::Skipped);
    assert_eq!(result.archive_remote_location, "s3://dst/exports/out.zip");

    let calls = store.calls();
    assert_eq!((calls.head, calls.list, calls.get, calls.put), (1, 0, 0, 0));
    assert!(!staging_root.exists());
    assert_eq!(store.get(DST, "exports/out.zip").unwrap(), b"previous archive");
    Ok(())
}

#[tokio::test]
async fn test_overwrite_when_skip_disabled() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    seed_two_folders(&store);
    store.insert(DST, "out.zip", b"stale".to_vec());

    let result = run(&store, config_for(&temp, &["a/"])).await;
    assert_eq!(result.status, PipelineStatus::Success);
    assert_eq!(store.calls().head, 0);
    assert_eq!(published_entries(&store, "out.zip")?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_traversal_key_is_rejected() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    store.insert(SRC, "a/ok.txt", b"fine".to_vec());
    store.insert(SRC, "a/../escape.txt", b"malicious".to_vec());

    let result = run(&store, config_for(&temp, &["a/"])).await;

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.failed_stage, Some(Stage::Listing));
    let detail = result.error_detail.unwrap_or_default();
    assert!(detail.starts_with("PathEscapeError"), "{}", detail);
    assert!(detail.contains("a/../escape.txt"));

    assert!(!temp.path().join("escape.txt").exists());
    assert_eq!(store.calls().get, 0);
    assert_eq!(store.calls().put, 0);
    Ok(())
}

#[tokio::test]
async fn test_collision_fails_without_upload() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    store.insert(SRC, "a/x.txt", b"from a".to_vec());
    store.insert(SRC, "b/x.txt", b"from b".to_vec());

    let result = run(&store, config_for(&temp, &["a/", "b/"])).await;

    assert_eq!(result.status, PipelineStatus::Failed);
    let detail = result.error_detail.unwrap_or_default();
    assert!(detail.starts_with("ArchiveCollisionError"), "{}", detail);
    assert!(detail.contains("a/x.txt") && detail.contains("b/x.txt"));
    assert_eq!(store.calls().put, 0);
    assert!(store.keys(DST).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_empty_prefix_contributes_nothing() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    seed_two_folders(&store);

    let result = run(&store, config_for(&temp, &["a/", "empty/"])).await;
    assert_eq!(result.status, PipelineStatus::Success);
    assert_eq!(result.object_count, 2);

    let names: Vec<_> = published_entries(&store, "out.zip")?
        .into_iter()
        .map(|(n, _)| n)
        .collect();
    assert_eq!(names, vec!["x.txt", "sub/y.txt"]);
    Ok(())
}

#[tokio::test]
async fn test_only_empty_prefixes_publish_empty_archive() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());

    let result = run(&store, config_for(&temp, &["empty/"])).await;
    assert_eq!(result.status, PipelineStatus::Success);
    assert_eq!(result.object_count, 0);
    assert!(published_entries(&store, "out.zip")?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_directory_placeholders_are_ignored() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    store.insert(SRC, "a/", Vec::new());
    store.insert(SRC, "a/sub/", Vec::new());
    store.insert(SRC, "a/sub/y.txt", b"y".to_vec());

    let result = run(&store, config_for(&temp, &["a/"])).await;
    assert_eq!(result.status, PipelineStatus::Success);
    assert_eq!(result.object_count, 1);
    assert_eq!(published_entries(&store, "out.zip")?[0].0, "sub/y.txt");
    Ok(())
}

#[tokio::test]
async fn test_compression_level_boundaries() -> Result<()> {
    let text = "the quick brown fox jumps over the lazy dog\n".repeat(2_000);
    let mut sizes = Vec::new();

    for level in [1u8, 9] {
        let temp = TempDir::new()?;
        let store = Arc::new(MemoryObjectStore::new());
        store.insert(SRC, "a/text.txt", text.as_bytes().to_vec());
        store.insert(SRC, "a/bin.dat", (0..50_000u32).map(|i| (i * 31 % 251) as u8).collect::<Vec<_>>());

        let mut config = config_for(&temp, &["a/"]);
        config.compression_level = level;
        let result = run(&store, config).await;
        assert_eq!(result.status, PipelineStatus::Success, "level {}", level);

        let entries = published_entries(&store, "out.zip")?;
        let text_entry = entries.iter().find(|(n, _)| n == "text.txt").unwrap();
        assert_eq!(text_entry.1, text.as_bytes());
        sizes.push(store.get(DST, "out.zip").unwrap().len());
    }

    assert!(sizes.iter().all(|&s| s < text.len()));
    Ok(())
}

#[tokio::test]
async fn test_download_failure_aborts_and_keeps_staging() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    seed_two_folders(&store);
    store.fail_get("b/z.txt");

    let mut config = config_for(&temp, &["a/", "b/"]);
    config.max_concurrent_downloads = 1;
    let staging_root = config.local_staging_root.clone();
    let result = run(&store, config).await;

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.failed_stage, Some(Stage::Downloading));
    assert!(result.error_detail.unwrap_or_default().contains("b/z.txt"));
    assert_eq!(store.calls().put, 0);
    assert!(staging_root.join("x.txt").exists());
    assert!(result.local_archive_path.is_none());
    Ok(())
}

#[tokio::test]
async fn test_cleanup_on_failure_removes_staging() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    seed_two_folders(&store);
    store.fail_get("b/z.txt");

    let mut config = config_for(&temp, &["a/", "b/"]);
    config.cleanup_on_failure = true;
    let staging_root = config.local_staging_root.clone();
    let result = run(&store, config).await;

    assert_eq!(result.status, PipelineStatus::Failed);
    assert!(!staging_root.exists());
    Ok(())
}

#[tokio::test]
async fn test_publish_failure_preserves_local_files() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    seed_two_folders(&store);
    store.fail_puts();

    let mut config = config_for(&temp, &["a/", "b/"]);
    // Publishing failures keep everything for a manual retry
    config.cleanup_on_failure = true;
    let staging_root = config.local_staging_root.clone();
    let archive_path = config.local_archive_path.clone();
    let result = run(&store, config).await;

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.failed_stage, Some(Stage::Publishing));
    assert!(result.error_detail.unwrap_or_default().starts_with("PublishFailed"));
    assert_eq!(result.local_archive_path.as_deref(), Some(archive_path.as_path()));
    assert!(archive_path.exists());
    assert!(staging_root.join("sub/y.txt").exists());
    assert!(store.keys(DST).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_keep_local_files_when_requested() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    seed_two_folders(&store);

    let mut config = config_for(&temp, &["a/", "b/"]);
    config.delete_local_after = false;
    let staging_root = config.local_staging_root.clone();
    let result = run(&store, config).await;

    assert_eq!(result.status, PipelineStatus::Success);
    assert!(staging_root.join("z.txt").exists());
    let local = result.local_archive_path.expect("archive kept");
    assert_eq!(std::fs::read(local)?, store.get(DST, "out.zip").unwrap());
    Ok(())
}

#[tokio::test]
async fn test_dry_run_touches_nothing() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    seed_two_folders(&store);

    let config = config_for(&temp, &["a/", "b/"]);
    let staging_root = config.local_staging_root.clone();
    let result = Pipeline::new(config, store.clone(), RunLogger::new("dry"))
        .plan()
        .await;

    assert_eq!(result.status, PipelineStatus::DryRun);
    assert_eq!(result.object_count, 3);
    assert_eq!(result.total_bytes, 39);
    assert_eq!(store.calls().get, 0);
    assert_eq!(store.calls().put, 0);
    assert!(!staging_root.exists());
    Ok(())
}

#[tokio::test]
async fn test_invalid_config_fails_before_remote_calls() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    seed_two_folders(&store);

    let mut config = config_for(&temp, &["a"]);
    config.skip_if_exists = true;
    let result = run(&store, config).await;

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.failed_stage, Some(Stage::Init));
    assert!(result.error_detail.unwrap_or_default().starts_with("ConfigError"));
    let calls = store.calls();
    assert_eq!(calls.head + calls.list + calls.get + calls.put, 0);
    Ok(())
}

#[tokio::test]
async fn test_listing_failure_reports_prefix() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    seed_two_folders(&store);
    store.fail_list("b/");

    let result = run(&store, config_for(&temp, &["a/", "b/"])).await;
    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.failed_stage, Some(Stage::Listing));
    let detail = result.error_detail.unwrap_or_default();
    assert!(detail.contains("s3://src/b/"), "{}", detail);
    assert_eq!(store.calls().get, 0);
    Ok(())
}

#[tokio::test]
async fn test_result_carries_run_metadata() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    seed_two_folders(&store);

    let result = run(&store, config_for(&temp, &["a/"])).await;
    assert_eq!(result.run_id, "test-run");
    let started = chrono::DateTime::parse_from_rfc3339(&result.started_at)?;
    let finished = chrono::DateTime::parse_from_rfc3339(&result.finished_at)?;
    assert!(finished >= started);
    Ok(())
}

#[tokio::test]
async fn test_occupied_staging_directory_is_left_alone() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    seed_two_folders(&store);

    let mut config = config_for(&temp, &["a/", "b/"]);
    config.cleanup_on_failure = true;
    let staging_root = config.local_staging_root.clone();
    std::fs::create_dir_all(&staging_root)?;
    std::fs::write(staging_root.join("unrelated_user_file.txt"), b"mine")?;

    let result = run(&store, config).await;

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.failed_stage, Some(Stage::Init));
    assert!(result.error_detail.unwrap_or_default().starts_with("StagingError"));
    assert_eq!(store.calls(), CallCounts::default());
    assert_eq!(std::fs::read(staging_root.join("unrelated_user_file.txt"))?, b"mine");
    Ok(())
}

#[tokio::test]
async fn test_existing_empty_staging_directory_is_kept() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    seed_two_folders(&store);

    let config = config_for(&temp, &["a/", "b/"]);
    let staging_root = config.local_staging_root.clone();
    std::fs::create_dir_all(&staging_root)?;

    let result = run(&store, config).await;

    assert_eq!(result.status, PipelineStatus::Success);
    assert!(staging_root.is_dir());
    assert_eq!(std::fs::read_dir(&staging_root)?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_interrupted_download_is_retried() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    seed_two_folders(&store);
    store.interrupt_get_once("a/sub/y.txt");

    let result = run(&store, config_for(&temp, &["a/", "b/"])).await;

    assert_eq!(result.status, PipelineStatus::Success);
    assert_eq!(store.calls().get, 4);
    let entries = published_entries(&store, "out.zip")?;
    assert_eq!(entries[1], ("sub/y.txt".to_string(), b"contents of y".to_vec()));
    Ok(())
}

#[tokio::test]
async fn test_file_and_folder_with_one_name_collide_before_download() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    store.insert(SRC, "a/x", b"plain file".to_vec());
    store.insert(SRC, "a/x/y", b"nested file".to_vec());

    let result = run(&store, config_for(&temp, &["a/"])).await;

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.failed_stage, Some(Stage::Listing));
    let detail = result.error_detail.unwrap_or_default();
    assert!(detail.starts_with("ArchiveCollisionError"), "{}", detail);
    assert_eq!(store.calls().get, 0);
    assert_eq!(store.calls().put, 0);
    Ok(())
}

#[tokio::test]
async fn test_reported_location_is_the_uploaded_key() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryObjectStore::new());
    seed_two_folders(&store);

    let mut config = config_for(&temp, &["a/"]);
    config.destination_prefix = "exports/2024/".to_string();
    let result = run(&store, config).await;

    assert_eq!(result.status, PipelineStatus::Success);
    let keys = store.keys(DST);
    assert_eq!(keys, vec!["exports/2024/out.zip"]);
    assert_eq!(result.archive_remote_location, format!("s3://{}/{}", DST, keys[0]));
    Ok(())
}
