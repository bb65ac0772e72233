use chrono::{DateTime, Utc};

// Common types
pub type ChainId = String;
pub type Timestamp = DateTime<Utc>;

/// Name of the per-project metadata directory.
pub const METADATA_DIR: &str = ".mindshell";

/// Version string reported as the assistant's runtime identity.
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn now() -> Timestamp {
    Utc::now()
}
