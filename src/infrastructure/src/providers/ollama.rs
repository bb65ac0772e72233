use async_trait::async_trait;
use domain::services::LlmProvider;
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use shared::error::{Error, Result};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Message,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct PullStatus {
    #[serde(default)]
    status: String,
    total: Option<u64>,
    completed: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullStage {
    Initializing,
    Downloading,
    Verifying,
    Writing,
    Complete,
}

impl PullStage {
    /// Stage implied by an Ollama status line, if any.
    pub fn classify(status: &str) -> Option<Self> {
        let status = status.to_lowercase();
        if status.contains("pulling") || status.contains("downloading") {
            Some(Self::Downloading)
        } else if status.contains("verifying") {
            Some(Self::Verifying)
        } else if status.contains("writing") || status.contains("saving") {
            Some(Self::Writing)
        } else if status.contains("success") || status.contains("complete") {
            Some(Self::Complete)
        } else {
            None
        }
    }
}

/// One update from an in-flight model download.
#[derive(Debug, Clone, PartialEq)]
pub struct PullProgress {
    pub model: String,
    pub message: String,
    pub stage: PullStage,
    pub percentage: f64,
    pub is_complete: bool,
    pub error: Option<String>,
}

/// Folds NDJSON pull status lines into progress events. Stage and
/// percentage persist across lines that do not mention them.
struct PullTracker {
    model: String,
    stage: PullStage,
    percentage: f64,
}

impl PullTracker {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            stage: PullStage::Initializing,
            percentage: 0.0,
        }
    }

    fn event(&self, message: String, is_complete: bool, error: Option<String>) -> PullProgress {
        PullProgress {
            model: self.model.clone(),
            message,
            stage: self.stage,
            percentage: self.percentage,
            is_complete,
            error,
        }
    }

    fn started(&self) -> PullProgress {
        self.event("Initializing download...".to_string(), false, None)
    }

    fn update(&mut self, status: &PullStatus) -> PullProgress {
        if let Some(error) = &status.error {
            return self.event(format!("Download failed: {}", error), true, Some(error.clone()));
        }
        if let Some(stage) = PullStage::classify(&status.status) {
            self.stage = stage;
        }
        if let (Some(total), Some(completed)) = (status.total, status.completed) {
            if total > 0 {
                self.percentage = (completed as f64 / total as f64 * 100.0).min(100.0);
            }
        }
        if self.stage == PullStage::Complete {
            self.percentage = 100.0;
            return self.event("Download completed!".to_string(), true, None);
        }
        self.event(status.status.clone(), false, None)
    }
}

/// Local Ollama HTTP client. Models missing from `/api/tags` are pulled
/// before the first generation.
#[derive(Clone)]
pub struct OllamaClient {
    client: Arc<Client>,
    base_url: String,
    progress: Option<mpsc::Sender<PullProgress>>,
}

impl OllamaClient {
    pub fn new() -> Result<Self> {
        let base_url =
            env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::with_base_url(base_url)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        // Local inference can be slow on first load.
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_nodelay(true)
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            progress: None,
        })
    }

    /// Report model downloads triggered by `generate` on `sender`.
    pub fn with_progress(mut self, sender: mpsc::Sender<PullProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub async fn installed_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| {
                Error::Http(format!("Ollama is not reachable at {}: {}", self.base_url, e))
            })?;
        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    pub async fn has_model(&self, model: &str) -> Result<bool> {
        let wanted = model.to_lowercase();
        Ok(self.installed_models().await?.iter().any(|name| {
            let name = name.to_lowercase();
            name == wanted || name.split(':').next() == Some(wanted.as_str())
        }))
    }

    /// Download `model`, publishing progress on `progress` if given.
    pub async fn pull_model(
        &self,
        model: &str,
        progress: Option<&mpsc::Sender<PullProgress>>,
    ) -> Result<()> {
        info!("Pulling Ollama model '{}'", model);
        let mut tracker = PullTracker::new(model);
        publish(progress, tracker.started()).await;

        let mut response = self
            .client
            .post(format!("{}/api/pull", self.base_url))
            .json(&PullRequest { model, stream: true })
            .send()
            .await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("Failed to download model '{}': {}", model, body);
            publish(progress, tracker.event(message.clone(), true, Some(body))).await;
            return Err(Error::Http(message));
        }

        let mut pending: Vec<u8> = Vec::new();
        let mut finished = false;
        loop {
            let chunk = response.chunk().await?;
            let at_end = chunk.is_none();
            match chunk {
                Some(bytes) => pending.extend_from_slice(&bytes),
                None => pending.push(b'\n'),
            }
            while let Some(newline) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                let Some(status) = parse_pull_line(&String::from_utf8_lossy(&line)) else {
                    continue;
                };
                let event = tracker.update(&status);
                finished |= event.is_complete && event.error.is_none();
                let failure = event.error.clone();
                publish(progress, event).await;
                if let Some(error) = failure {
                    return Err(Error::Http(format!(
                        "Failed to download model '{}': {}",
                        model, error
                    )));
                }
            }
            if at_end {
                break;
            }
        }

        if !finished {
            tracker.stage = PullStage::Complete;
            tracker.percentage = 100.0;
            publish(progress, tracker.event("Download completed!".to_string(), true, None)).await;
        }
        Ok(())
    }

    async fn ensure_model(&self, model: &str) -> Result<()> {
        if self.has_model(model).await? {
            debug!("Ollama model '{}' already present", model);
            return Ok(());
        }
        self.pull_model(model, self.progress.as_ref()).await
    }
}

fn parse_pull_line(line: &str) -> Option<PullStatus> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    serde_json::from_str(line).ok()
}

async fn publish(progress: Option<&mpsc::Sender<PullProgress>>, event: PullProgress) {
    if let Some(sender) = progress {
        let _ = sender.send(event).await;
    }
}

#[async_trait]
impl LlmProvider for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
        model_id: &str,
        _api_key: Option<&str>,
    ) -> Result<String> {
        self.ensure_model(model_id).await?;

        let mut messages = Vec::new();
        if !system_prompt.is_empty() {
            messages.push(Message {
                role: "system".to_string(),
                content: system_prompt.to_string(),
            });
        }
        messages.push(Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        });
        let request = ChatRequest {
            model: model_id,
            messages,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::Http(format!("Ollama API error: {}", text)));
        }

        let mut full_content = String::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(chat) = serde_json::from_str::<ChatResponse>(line) {
                full_content.push_str(&chat.message.content);
                if chat.done {
                    break;
                }
            }
        }
        if full_content.trim().is_empty() {
            return Err(Error::Parse("No response received from Ollama".to_string()));
        }
        Ok(full_content)
    }
}
