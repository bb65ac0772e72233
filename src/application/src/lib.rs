pub mod assistant;
pub mod diagnostic_runner;
pub mod prompt_builder;
pub mod retry_chain;

use assistant::AiAssistant;
use diagnostic_runner::DiagnosticRunner;
use domain::services::CommandExecutor;
use infrastructure::{
    config::Config, providers::PullProgress, CommandRunner, ContextCache, HistoryStore,
    ProviderRegistry, StreamingCommandRunner,
};
use retry_chain::{RetryChainManager, RetryPolicy};
use shared::error::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything one interactive session needs, wired against a project root.
pub struct Engine {
    pub config: Config,
    pub context: Arc<ContextCache>,
    pub history: Arc<HistoryStore>,
    pub assistant: Arc<AiAssistant>,
    pub streaming: Arc<StreamingCommandRunner>,
    pub retry: RetryChainManager,
    pub shell_retry: RetryChainManager,
    pub diagnostics: DiagnosticRunner,
}

/// Default engine: buffered runner for recovery and diagnostics, streaming
/// runner for shell mode, on-disk history under the metadata directory.
pub fn create_engine(
    config: Config,
    project_root: PathBuf,
    pull_progress: Option<mpsc::Sender<PullProgress>>,
) -> Result<Engine> {
    let history = Arc::new(HistoryStore::discover());
    create_engine_with_history(config, project_root, history, pull_progress)
}

pub fn create_engine_with_history(
    config: Config,
    project_root: PathBuf,
    history: Arc<HistoryStore>,
    pull_progress: Option<mpsc::Sender<PullProgress>>,
) -> Result<Engine> {
    let context = Arc::new(ContextCache::new(project_root));
    let providers = ProviderRegistry::with_defaults(pull_progress)?;
    let assistant = Arc::new(AiAssistant::new(config.clone(), providers, context.clone()));

    let runner: Arc<dyn CommandExecutor> = Arc::new(CommandRunner::new());
    let streaming = Arc::new(StreamingCommandRunner::new().with_timeout(config.stream_timeout()));
    let policy = RetryPolicy::from_config(&config);

    let retry = RetryChainManager::new(
        runner.clone(),
        assistant.clone(),
        history.clone(),
        context.clone(),
    )
    .with_policy(policy);
    let shell_retry = RetryChainManager::new(
        streaming.clone(),
        assistant.clone(),
        history.clone(),
        context.clone(),
    )
    .with_policy(policy);
    let diagnostics = DiagnosticRunner::new(runner, assistant.clone(), history.clone());

    Ok(Engine {
        config,
        context,
        history,
        assistant,
        streaming,
        retry,
        shell_retry,
        diagnostics,
    })
}
