pub mod error;
pub mod telemetry;
pub mod types;
pub mod utils;

pub use error::{Error, Result};
