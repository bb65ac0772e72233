use crate::support::{
    assistant, context_cache, mount_reply, openai_config, request_bodies, system_message,
};
use application::diagnostic_runner::{DiagnosticPhase, DiagnosticRunner, DiagnosticSession};
use domain::models::{Attempt, RecordKind, ResponseKind, RetryChain};
use infrastructure::response_parser::parse_response;
use infrastructure::{CommandRunner, HistoryStore};
use std::sync::Arc;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn three_step_reply(missing: &str) -> String {
    serde_json::json!({
        "type": "diagnostic",
        "content": "Let's check the file and its directory",
        "steps": [
            {"label": "Say hello", "command": "echo hello", "explanation": "sanity", "safe": true},
            {"label": "Read the file", "command": format!("cat {}", missing), "safe": true},
            {"label": "Where am I", "command": "pwd", "safe": true}
        ],
        "confidence": 6
    })
    .to_string()
}

#[tokio::test]
async fn failing_middle_step_still_reaches_analysis() {
    let project = tempfile::tempdir().unwrap();
    let storage = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_reply(
        &server,
        r#"{"type":"explanation","content":"missing.txt does not exist here","confidence":8}"#,
        1,
    )
    .await;

    let (context, _) = context_cache(project.path());
    let history = Arc::new(HistoryStore::new(storage.path()));
    let runner = DiagnosticRunner::new(
        Arc::new(CommandRunner::new()),
        assistant(openai_config(), &server, context),
        history.clone(),
    );

    let missing = project.path().join("missing.txt").display().to_string();
    let response = parse_response(&three_step_reply(&missing));
    assert_eq!(response.kind, ResponseKind::Diagnostic);

    let chain = RetryChain::start(Attempt::user("read it", format!("cat {}", missing)));
    let mut session = DiagnosticSession::new(response, "read it", Some(chain));
    session.accept().unwrap();

    while session.phase() == DiagnosticPhase::Running {
        runner.step(&mut session).await.unwrap();
    }
    assert_eq!(session.phase(), DiagnosticPhase::Analyzing);

    let results = session.results();
    assert_eq!(results.len(), 3);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.step, session.steps()[i]);
    }
    assert!(results[0].success);
    assert_eq!(results[0].output, "hello");
    assert!(!results[1].success);
    assert!(results[1].error.as_deref().unwrap().starts_with("ENOENT"));
    assert!(results[2].success);

    let verdict = runner.analyze(&mut session).await.unwrap();
    assert_eq!(verdict.kind, ResponseKind::Explanation);
    assert_eq!(session.phase(), DiagnosticPhase::Completed);

    let bodies = request_bodies(&server).await;
    let system = system_message(&bodies[0]);
    assert!(system.contains("📋 Original Issue:\nread it"));
    assert!(system.contains("🔍 Say hello\n$ echo hello\n✅ hello"));
    assert!(system.contains("🔍 Read the file"));
    assert!(system.contains("❌ ENOENT"));

    let records = history.load_history().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, RecordKind::Explanation);
    assert_eq!(records[0].output, "missing.txt does not exist here");
}

#[tokio::test]
async fn analysis_outage_degrades_to_summary() {
    let project = tempfile::tempdir().unwrap();
    let storage = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let (context, _) = context_cache(project.path());
    let history = Arc::new(HistoryStore::new(storage.path()));
    let runner = DiagnosticRunner::new(
        Arc::new(CommandRunner::new()),
        assistant(openai_config(), &server, context),
        history.clone(),
    );

    let missing = project.path().join("missing.txt").display().to_string();
    let mut session =
        DiagnosticSession::new(parse_response(&three_step_reply(&missing)), "read it", None);
    session.accept().unwrap();

    let verdict = runner.run(&mut session).await.unwrap();
    assert_eq!(verdict.kind, ResponseKind::Conversation);
    assert!(verdict.content.starts_with("Failed to get AI analysis:"));
    assert!(verdict.content.contains("upstream down"));
    assert!(verdict.content.contains("🔍 Where am I"));
    assert_eq!(session.results().len(), 3);
    assert!(history.load_history().await.is_empty());
}
