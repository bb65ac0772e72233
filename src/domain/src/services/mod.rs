use async_trait::async_trait;
use shared::error::Result;

use crate::entities::context::PromptContext;
use crate::models::{CommandOutput, InteractionResponse};

/// Runs one line of user input and reports the outcome as data.
///
/// Implementations never fail: spawn errors, timeouts and non-zero exits all
/// come back as a `CommandOutput` with `error` set.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, raw_input: &str) -> CommandOutput;
}

/// A remote or local language model reachable with a (prompt, system prompt)
/// pair.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
        model_id: &str,
        api_key: Option<&str>,
    ) -> Result<String>;
}

/// Append-only interaction history.
#[async_trait]
pub trait HistoryLog: Send + Sync {
    async fn append(&self, record: CommandOutput) -> Result<()>;
    async fn load(&self) -> Vec<CommandOutput>;
}

/// Supplies the flattened context embedded into system prompts.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn prompt_context(&self) -> PromptContext;
}

/// Turns prompts into parsed structured replies.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Answer a natural-language request from the user.
    async fn ask(&self, prompt: &str) -> Result<InteractionResponse>;

    /// Submit a fully assembled recovery or analysis prompt.
    async fn recover(&self, prompt_text: &str) -> Result<InteractionResponse>;
}
