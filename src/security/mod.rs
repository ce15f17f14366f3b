//! Security utilities and validation functions.
//!
//! - Key validation so remote keys cannot escape the staging root
//! - Credential scrubbing before error text reaches logs or summaries

pub mod credential_scrubber;
pub mod path_validator;

pub use credential_scrubber::{safe_error_message, scrub_credentials};
pub use path_validator::{join_within, relative_key_path};
