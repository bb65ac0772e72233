use async_trait::async_trait;
use domain::services::LlmProvider;
use reqwest::{Client, ClientBuilder};
use serde_json::{json, Value};
use shared::error::{Error, Result};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// `generateContent` REST client. The system prompt and the user prompt are
/// sent as two text parts of one content entry.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

fn first_text(body: &Value) -> Option<String> {
    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl LlmProvider for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
        model_id: &str,
        api_key: Option<&str>,
    ) -> Result<String> {
        let api_key = api_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| Error::Provider("Gemini API key is not set".to_string()))?;

        let body = json!({
            "contents": [{
                "parts": [
                    {"text": system_prompt},
                    {"text": prompt}
                ]
            }]
        });

        debug!("Gemini request: model={}", model_id);
        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, model_id
            ))
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http(format!("Gemini API error ({}): {}", status, body)));
        }

        let parsed: Value = response.json().await?;
        Ok(first_text(&parsed).unwrap_or_else(|| "No response from Gemini".to_string()))
    }
}
