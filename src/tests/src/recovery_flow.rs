use crate::support::{
    assistant, context_cache, mount_reply, openai_config, request_bodies, system_message,
};
use application::retry_chain::{ChainStatus, RetryChainManager, RetryPolicy};
use domain::models::{Origin, ResponseKind};
use application::assistant::AiAssistant;
use infrastructure::config::Config;
use infrastructure::providers::{OllamaClient, ProviderRegistry};
use infrastructure::{CommandRunner, HistoryStore};
use std::sync::Arc;
use wiremock::MockServer;

const FIND_REPLY: &str =
    r#"{"type":"command","command":"find . -name missing.txt","confidence":7}"#;

struct Fixture {
    _project: tempfile::TempDir,
    _storage: tempfile::TempDir,
    server: MockServer,
    history: Arc<HistoryStore>,
    manager: RetryChainManager,
    missing: String,
}

async fn fixture(config: Config) -> Fixture {
    fixture_with_policy(config, RetryPolicy::default()).await
}

async fn fixture_with_policy(config: Config, policy: RetryPolicy) -> Fixture {
    let project = tempfile::tempdir().unwrap();
    let storage = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    let (context, _) = context_cache(project.path());
    let history = Arc::new(HistoryStore::new(storage.path()));
    let manager = RetryChainManager::new(
        Arc::new(CommandRunner::new()),
        assistant(config, &server, context.clone()),
        history.clone(),
        context,
    )
    .with_policy(policy);
    let missing = project.path().join("missing.txt").display().to_string();

    Fixture {
        _project: project,
        _storage: storage,
        server,
        history,
        manager,
        missing,
    }
}

#[tokio::test]
async fn missing_file_enters_recovery_with_two_attempts() {
    let fx = fixture(openai_config()).await;
    mount_reply(&fx.server, FIND_REPLY, 1).await;
    let command = format!("cat {}", fx.missing);

    let outcome = fx
        .manager
        .handle_command("show me missing.txt", &command, None)
        .await
        .unwrap();

    assert!(!outcome.done);
    assert_eq!(outcome.status, ChainStatus::Recovering);
    assert_eq!(outcome.next_response.kind, ResponseKind::Command);
    assert_eq!(
        outcome.next_response.command.as_deref(),
        Some("find . -name missing.txt")
    );
    assert_eq!(outcome.next_response.confidence, 7.0);

    let attempts = outcome.chain.attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].origin, Origin::User);
    assert_eq!(attempts[0].command, command);
    let error = attempts[0].error.as_deref().unwrap();
    assert!(error.starts_with("ENOENT"), "unexpected error: {}", error);
    assert_eq!(attempts[1].origin, Origin::Ai);

    let bodies = request_bodies(&fx.server).await;
    let system = system_message(&bodies[0]);
    assert!(system.contains("--- SMART ERROR RECOVERY MODE ---"));
    assert!(system.contains(&format!("Command:\n```\n{}\n```", command)));
    assert!(system.contains(error));

    let records = fx.history.load_history().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].prompt, "show me missing.txt");
    assert_eq!(records[0].exit_code, Some(1));
}

#[tokio::test]
async fn accepted_suggestion_resolves_chain() {
    let fx = fixture(openai_config()).await;
    mount_reply(&fx.server, FIND_REPLY, 1).await;

    let first = fx
        .manager
        .handle_command("show", &format!("cat {}", fx.missing), None)
        .await
        .unwrap();
    let chain_id = first.chain.id.clone();

    let second = fx
        .manager
        .handle_command("show", "echo found it", Some(first.chain))
        .await
        .unwrap();

    assert!(second.done);
    assert_eq!(second.status, ChainStatus::Resolved);
    assert_eq!(second.next_response.content, "found it");
    assert_eq!(second.chain.id, chain_id);
    assert_eq!(second.chain.len(), 3);
    assert!(second.chain.last().unwrap().error.is_none());
    assert_eq!(fx.history.load_history().await.len(), 2);
}

#[tokio::test]
async fn recovery_prompt_carries_full_history() {
    let fx = fixture(openai_config()).await;
    mount_reply(&fx.server, FIND_REPLY, 2).await;

    let first = fx
        .manager
        .handle_command("show", &format!("cat {}", fx.missing), None)
        .await
        .unwrap();
    let second = fx
        .manager
        .handle_command("show", "cat also-missing.txt", Some(first.chain))
        .await
        .unwrap();
    assert_eq!(second.chain.len(), 4);

    let bodies = request_bodies(&fx.server).await;
    let system = system_message(&bodies[1]);
    for n in 1..=3 {
        assert!(system.contains(&format!("Attempt {}:", n)));
    }
    assert!(system.contains("- Origin: ai\n- Prompt: show\n- Command: find . -name missing.txt"));
    assert!(system.contains("ENOENT: no such file or directory, open 'also-missing.txt'"));
}

#[tokio::test]
async fn retry_cap_gives_up_without_calling_model() {
    let fx = fixture_with_policy(openai_config(), RetryPolicy::capped(2)).await;
    mount_reply(&fx.server, FIND_REPLY, 1).await;

    let command = format!("cat {}", fx.missing);
    let first = fx.manager.handle_command("show", &command, None).await.unwrap();
    assert_eq!(first.status, ChainStatus::Recovering);

    let second = fx
        .manager
        .handle_command("show", &command, Some(first.chain))
        .await
        .unwrap();
    assert!(second.done);
    assert_eq!(second.status, ChainStatus::GaveUp);
    assert_eq!(second.next_response.kind, ResponseKind::Conversation);
    assert_eq!(second.chain.len(), 3);
}

#[tokio::test]
async fn missing_api_key_aborts_but_keeps_history() {
    let config = Config {
        model: "openai:gpt-4o".into(),
        ..Default::default()
    };
    let fx = fixture(config).await;
    mount_reply(&fx.server, FIND_REPLY, 0).await;

    let err = fx
        .manager
        .handle_command("show", &format!("cat {}", fx.missing), None)
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(fx.history.load_history().await.len(), 1);
}

#[tokio::test]
async fn unreachable_ollama_degrades_to_conversation() {
    let project = tempfile::tempdir().unwrap();
    let storage = tempfile::tempdir().unwrap();
    let (context, _) = context_cache(project.path());
    let history = Arc::new(HistoryStore::new(storage.path()));

    let mut providers = ProviderRegistry::new();
    providers.register(
        "ollama",
        Arc::new(OllamaClient::with_base_url("http://127.0.0.1:1").unwrap()),
    );
    let config = Config {
        model: "ollama:llama3".into(),
        ..Default::default()
    };
    let manager = RetryChainManager::new(
        Arc::new(CommandRunner::new()),
        Arc::new(AiAssistant::new(config, providers, context.clone())),
        history.clone(),
        context,
    );

    let missing = project.path().join("missing.txt").display().to_string();
    let outcome = manager
        .handle_command("show", &format!("cat {}", missing), None)
        .await
        .unwrap();

    assert!(!outcome.done);
    assert_eq!(outcome.status, ChainStatus::Recovering);
    assert_eq!(outcome.next_response.kind, ResponseKind::Conversation);
    assert!(outcome
        .next_response
        .content
        .starts_with("Failed to get AI suggestion:"));
    assert_eq!(outcome.chain.len(), 2);
    assert_eq!(history.load_history().await.len(), 1);
}
