use crate::support::{
    assistant, context_cache, mount_reply, openai_config, request_bodies, system_message,
};
use domain::services::ResponseGenerator;
use std::fs;

#[tokio::test]
async fn cache_is_shared_between_instances() {
    let project = tempfile::tempdir().unwrap();
    fs::write(project.path().join("Cargo.toml"), "[package]\nname = \"demo\"").unwrap();

    let (first, first_probe) = context_cache(project.path());
    let fresh = first.load().await;
    assert!(!fresh.cached);
    assert!(first_probe.calls() > 0);

    // A second process sees the entry the first one wrote.
    let (second, second_probe) = context_cache(project.path());
    let reused = second.load().await;
    assert!(reused.cached);
    assert_eq!(second_probe.calls(), 0);
    assert_eq!(reused.info.project, fresh.info.project);
    assert_eq!(reused.info.tools, fresh.info.tools);
    assert_eq!(reused.info.project.languages, vec!["Rust"]);

    fs::write(project.path().join("package.json"), r#"{"name":"demo"}"#).unwrap();
    let (third, third_probe) = context_cache(project.path());
    let changed = third.load().await;
    assert!(!changed.cached);
    assert!(third_probe.calls() > 0);
    assert!(changed.info.project.languages.contains(&"JavaScript".to_string()));
}

#[tokio::test]
async fn ask_embeds_detected_context() {
    let project = tempfile::tempdir().unwrap();
    fs::write(project.path().join("Cargo.toml"), "[package]\nname = \"demo\"").unwrap();

    let server = wiremock::MockServer::start().await;
    mount_reply(
        &server,
        "```json\n{\"type\":\"command\",\"content\":\"ls -la\",\"command\":\"ls -la\",\"confidence\":9}\n```",
        1,
    )
    .await;

    let (context, _) = context_cache(project.path());
    let assistant = assistant(openai_config(), &server, context);
    let response = assistant.ask("list files").await.unwrap();
    assert_eq!(response.command.as_deref(), Some("ls -la"));
    assert_eq!(response.confidence, 9.0);

    let bodies = request_bodies(&server).await;
    let system = system_message(&bodies[0]);
    assert!(system.contains("- Project Language: Rust"));
    assert!(system.contains("- Git Repository: not a git repo"));
    assert!(system.contains("- Python Environment: no"));
}
