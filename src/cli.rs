use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::constants::DEFAULT_CONFIG_FILE;

/// Command-line arguments for s3-folder-zipper.
///
/// Everything about what to archive lives in the configuration file; the
/// command line only selects the file and how the run is reported.
#[derive(Parser, Debug)]
#[clap(
    name = "s3-folder-zipper",
    version,
    about = "Combine S3 folders into a single zip archive and publish it back to S3"
)]
pub struct Args {
    /// Path to configuration YAML file
    #[clap(short = 'c', long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// List and validate the inputs without downloading or uploading
    #[clap(long)]
    pub dry_run: bool,

    /// Verbose logging (overrides logging.level)
    #[clap(short, long)]
    pub verbose: bool,

    /// Write a JSON summary of the run to this path
    #[clap(long)]
    pub summary: Option<PathBuf>,

    /// Subcommands
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a sample configuration file
    InitConfig {
        /// Path to output configuration file
        #[clap(default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,
    },
}
