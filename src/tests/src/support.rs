use application::assistant::AiAssistant;
use async_trait::async_trait;
use infrastructure::config::Config;
use infrastructure::context::{ContextCache, ToolProbe};
use infrastructure::providers::{OpenAiClient, ProviderRegistry};
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Tool probe that reports only `git` and counts its calls.
#[derive(Default)]
pub struct CountingProbe(AtomicUsize);

impl CountingProbe {
    pub fn calls(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolProbe for CountingProbe {
    async fn available(&self, tool: &str) -> bool {
        self.0.fetch_add(1, Ordering::SeqCst);
        tool == "git"
    }
}

pub fn openai_config() -> Config {
    let mut config = Config {
        model: "openai:gpt-4o-mini".into(),
        ..Default::default()
    };
    config.api_keys.insert("openai".into(), "sk-test".into());
    config
}

/// Chat Completions body whose first choice carries `content`.
pub fn completion(content: &str) -> serde_json::Value {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    })
}

pub async fn mount_reply(server: &MockServer, content: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(content)))
        .expect(expected_calls)
        .mount(server)
        .await;
}

pub fn context_cache(root: &Path) -> (Arc<ContextCache>, Arc<CountingProbe>) {
    let probe = Arc::new(CountingProbe::default());
    let cache = Arc::new(ContextCache::with_probe(root, probe.clone()));
    (cache, probe)
}

/// Assistant talking to `server` through the real OpenAI client.
pub fn assistant(
    config: Config,
    server: &MockServer,
    context: Arc<ContextCache>,
) -> Arc<AiAssistant> {
    let mut providers = ProviderRegistry::new();
    providers.register(
        "openai",
        Arc::new(OpenAiClient::with_base_url(server.uri()).unwrap()),
    );
    Arc::new(AiAssistant::new(config, providers, context))
}

/// Every request body the mock server received, as text.
pub async fn request_bodies(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| String::from_utf8_lossy(&request.body).to_string())
        .collect()
}

/// The system message of a recorded chat request.
pub fn system_message(body: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(body).unwrap();
    value["messages"][0]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}
