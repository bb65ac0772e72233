pub mod builtins;
pub mod command_runner;
pub mod config;
pub mod context;
pub mod history_store;
pub mod providers;
pub mod response_parser;
pub mod streaming_runner;

pub use command_runner::CommandRunner;
pub use config::Config;
pub use context::ContextCache;
pub use history_store::HistoryStore;
pub use providers::ProviderRegistry;
pub use streaming_runner::{StreamEvent, StreamingCommandRunner};
