//! The aggregation pipeline.
//!
//! ```text
//! Init -> (CheckExisting) -> Listing -> Downloading -> Building -> Publishing -> Cleanup -> Done
//! ```
//!
//! Each stage lives in its own module and receives the storage capability
//! and a [`RunLogger`](crate::logging::RunLogger) from the
//! [`Pipeline`](orchestrator::Pipeline), which owns the staging directory
//! and the local archive for the length of the run.

pub mod archive;
pub mod downloader;
pub mod guard;
pub mod lister;
pub mod orchestrator;
pub mod publisher;
pub mod staging;

pub use archive::{ArchiveBuilder, ArchiveSummary};
pub use downloader::Downloader;
pub use guard::ExistenceGuard;
pub use lister::ObjectLister;
pub use orchestrator::Pipeline;
pub use publisher::Publisher;
pub use staging::StagingArea;
