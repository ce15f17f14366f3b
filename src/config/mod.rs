// Configuration file model and the validated settings derived from it
mod pipeline_config;
mod zipper_config;

pub use pipeline_config::{
    default_archive_path,
    default_download_workers,
    default_staging_root,
    PipelineConfig,
};

pub use zipper_config::{
    AwsConfig,
    OptionsConfig,
    ZipConfig,
    ZipperConfig,
};
