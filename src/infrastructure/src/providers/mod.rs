pub mod gemini;
pub mod ollama;
pub mod openai;

pub use gemini::GeminiClient;
pub use ollama::{OllamaClient, PullProgress, PullStage};
pub use openai::OpenAiClient;

use domain::services::LlmProvider;
use shared::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Provider identifier (the part of `provider:model` before the colon) to
/// client.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `openai`, `gemini` and `ollama`. Ollama model downloads report on
    /// `pull_progress` when given.
    pub fn with_defaults(pull_progress: Option<mpsc::Sender<PullProgress>>) -> Result<Self> {
        let mut ollama = OllamaClient::new()?;
        if let Some(sender) = pull_progress {
            ollama = ollama.with_progress(sender);
        }

        let mut registry = Self::new();
        registry.register("openai", Arc::new(OpenAiClient::new()?));
        registry.register("gemini", Arc::new(GeminiClient::new()?));
        registry.register("ollama", Arc::new(ollama));
        Ok(registry)
    }

    pub fn register(&mut self, id: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(id.into(), provider);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn LlmProvider>> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Provider(format!("Unsupported model provider: {}", id)))
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort();
        ids
    }
}
