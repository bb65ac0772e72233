use crate::prompt_builder::{build_system_prompt, RECOVERY_INSTRUCTION};
use async_trait::async_trait;
use domain::models::InteractionResponse;
use domain::services::{ContextSource, LlmProvider, ResponseGenerator};
use infrastructure::config::{Config, ModelSelection};
use infrastructure::providers::ProviderRegistry;
use infrastructure::response_parser::parse_response;
use shared::error::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Sends prompts to the configured model and parses its replies.
pub struct AiAssistant {
    config: Config,
    providers: ProviderRegistry,
    context: Arc<dyn ContextSource>,
}

impl AiAssistant {
    pub fn new(
        config: Config,
        providers: ProviderRegistry,
        context: Arc<dyn ContextSource>,
    ) -> Self {
        Self {
            config,
            providers,
            context,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn resolve(&self) -> Result<(Arc<dyn LlmProvider>, ModelSelection)> {
        if !self.config.is_valid() {
            return Err(Error::Provider("Invalid or missing config".to_string()));
        }
        let selection = self
            .config
            .model_selection()
            .ok_or_else(|| Error::Provider("No model selected".to_string()))?;
        let provider = self.providers.get(&selection.provider)?;
        Ok((provider, selection))
    }

    async fn complete(&self, prompt: &str, system_prompt: &str) -> Result<InteractionResponse> {
        let (provider, selection) = self.resolve()?;
        info!(
            "Querying {} model {}",
            selection.provider, selection.model_id
        );
        let raw = provider
            .generate(
                prompt,
                system_prompt,
                &selection.model_id,
                self.config.api_key(&selection.provider),
            )
            .await?;
        debug!("Raw model reply: {} bytes", raw.len());
        Ok(parse_response(&raw))
    }
}

#[async_trait]
impl ResponseGenerator for AiAssistant {
    async fn ask(&self, prompt: &str) -> Result<InteractionResponse> {
        // Fail on config before paying for context detection.
        self.resolve()?;
        let context = self.context.prompt_context().await;
        let system_prompt = build_system_prompt(&context);
        self.complete(prompt, &system_prompt).await
    }

    async fn recover(&self, prompt_text: &str) -> Result<InteractionResponse> {
        self.complete(RECOVERY_INSTRUCTION, prompt_text).await
    }
}
