//! Project and system context for prompt construction.

pub mod cache;
pub mod detector;

pub use cache::{ContextCache, ContextSnapshot, CACHE_TTL, CACHE_VERSION};
pub use detector::{ToolProbe, WhichProbe};
