use domain::models::RecordKind;
use domain::services::CommandExecutor;
use infrastructure::{CommandRunner, StreamEvent, StreamingCommandRunner};

#[tokio::test]
async fn blank_input_is_a_no_op_for_both_runners() {
    let buffered = CommandRunner::new();
    let streaming = StreamingCommandRunner::new();

    for input in ["", "   "] {
        for result in [
            buffered.execute(input).await,
            CommandExecutor::execute(&streaming, input).await,
        ] {
            assert_eq!(result.command_text(), "");
            assert_eq!(result.output, "");
            assert_eq!(result.kind, RecordKind::Empty);
            assert!(result.error.is_none());
            assert!(result.exit_code.is_none());
        }
    }
}

#[cfg(unix)]
#[tokio::test]
async fn nonzero_exit_codes_are_reported_verbatim() {
    let runner = CommandRunner::new();
    for code in [1, 2, 7, 42, 127] {
        let result = runner.execute(&format!("exit {}", code)).await;
        assert_eq!(result.exit_code, Some(code));
        assert!(result.error.as_deref().is_some_and(|e| !e.is_empty()));
    }
}

#[cfg(unix)]
#[tokio::test]
async fn zero_exit_means_no_error() {
    let runner = CommandRunner::new();
    for command in ["printf '  padded  \\n'", "echo warn >&2; echo ok", "true"] {
        let result = runner.execute(command).await;
        assert_eq!(result.exit_code, Some(0), "{}", command);
        assert!(result.error.is_none(), "{}", command);
        assert_eq!(result.output, result.output.trim());
    }
}

#[cfg(unix)]
#[tokio::test]
async fn streaming_and_buffered_agree_on_result() {
    let command = "printf 'one\\n'; printf 'two\\n' >&2; exit 5";
    let buffered = CommandRunner::new().execute(command).await;

    let streaming = StreamingCommandRunner::new();
    let mut events = streaming.subscribe();
    let streamed = streaming.execute(command).await;

    assert_eq!(streamed.exit_code, buffered.exit_code);
    assert_eq!(streamed.output, buffered.output);
    assert_eq!(streamed.error, buffered.error);

    let mut published = String::new();
    let mut closed = None;
    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::Chunk(text) => published.push_str(&text),
            StreamEvent::Closed { exit_code } => closed = Some(exit_code),
        }
    }
    assert!(published.contains("one"));
    assert!(published.contains("two"));
    assert_eq!(closed, Some(Some(5)));
}
