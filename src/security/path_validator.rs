//! Validation of remote keys before they are turned into local paths.
//!
//! Object keys are arbitrary strings. Anything that would be interpreted by
//! the local filesystem as something other than a plain name (`..`, a root,
//! a drive prefix, an embedded NUL) is rejected here so that a staged file
//! can never land outside the staging root.

use std::path::{Component, Path, PathBuf};

/// Strip `prefix` from `key` and normalize the remainder into a
/// `/`-separated relative path.
///
/// Empty and `.` segments are dropped. Returns the reason on rejection.
pub fn relative_key_path(key: &str, prefix: &str) -> Result<String, String> {
    let remainder = key
        .strip_prefix(prefix)
        .ok_or_else(|| format!("key is not under prefix '{}'", prefix))?;

    if remainder.contains('\0') {
        return Err("key contains a NUL byte".to_string());
    }

    let mut segments = Vec::new();
    for segment in remainder.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err("key contains a '..' segment".to_string()),
            name => {
                validate_segment(name)?;
                segments.push(name);
            }
        }
    }

    if segments.is_empty() {
        return Err("key has no file name after the prefix".to_string());
    }
    Ok(segments.join("/"))
}

/// A segment must be exactly one normal path component on this platform.
fn validate_segment(segment: &str) -> Result<(), String> {
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) => Err("key contains a '..' segment".to_string()),
        _ => Err(format!("segment '{}' is not a plain file name", segment)),
    }
}

/// Join a validated relative path onto `root`, confirming the result is
/// still under `root`.
pub fn join_within(root: &Path, relative: &str) -> Result<PathBuf, String> {
    let mut resolved = root.to_path_buf();
    for segment in relative.split('/') {
        validate_segment(segment)?;
        resolved.push(segment);
    }

    // Final check that we're still within the root
    if !resolved.starts_with(root) || resolved == root {
        return Err("resolved path escapes the staging root".to_string());
    }
    Ok(resolved)
}
