//! Command execution with live output.
//!
//! One subscriber may be registered per command with [`StreamingCommandRunner::subscribe`].
//! The next call to `execute` takes ownership of it, publishes raw chunks as
//! they arrive on either stream, and finishes with a single `Closed` event.

use async_trait::async_trait;
use domain::models::CommandOutput;
use domain::services::CommandExecutor;
use shared::error::Error;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::builtins;
use crate::command_runner::{outcome, shell_command};

const CHANNEL_CAPACITY: usize = 64;
const READ_BUFFER: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Raw output as read from stdout or stderr; not split on lines.
    Chunk(String),
    Closed { exit_code: Option<i32> },
}

type Subscriber = mpsc::Sender<StreamEvent>;

#[derive(Debug, Default)]
pub struct StreamingCommandRunner {
    timeout: Option<Duration>,
    subscriber: Mutex<Option<Subscriber>>,
}

impl StreamingCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the process and report a timeout failure after `timeout`.
    /// Without this the runner waits for the process indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register the output reader for the next command, replacing any
    /// reader that was registered but not yet used.
    pub fn subscribe(&self) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        if let Ok(mut slot) = self.subscriber.lock() {
            *slot = Some(tx);
        }
        rx
    }

    fn take_subscriber(&self) -> Option<Subscriber> {
        self.subscriber.lock().ok().and_then(|mut slot| slot.take())
    }

    pub async fn execute(&self, raw_input: &str) -> CommandOutput {
        let mut subscriber = self.take_subscriber();
        let trimmed = raw_input.trim();

        let result = if trimmed.is_empty() {
            CommandOutput::empty(raw_input)
        } else if let Some(output) = builtins::dispatch(raw_input) {
            let text = output.error.clone().unwrap_or_else(|| output.output.clone());
            if !text.is_empty() {
                publish(&mut subscriber, text).await;
            }
            output
        } else {
            self.run_subprocess(trimmed, &mut subscriber)
                .await
                .with_prompt(raw_input)
        };

        if let Some(tx) = subscriber {
            let _ = tx
                .send(StreamEvent::Closed {
                    exit_code: result.exit_code,
                })
                .await;
        }
        result
    }

    async fn run_subprocess(
        &self,
        command_line: &str,
        subscriber: &mut Option<Subscriber>,
    ) -> CommandOutput {
        debug!("Spawning (streaming): {}", command_line);
        let mut child = match shell_command(command_line).spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!("Failed to spawn '{}': {}", command_line, err);
                return CommandOutput::failure(command_line, err.to_string(), Some(1));
            }
        };

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut collected_out = Vec::new();
        let mut collected_err = Vec::new();

        let pump = async {
            let mut out_buf = [0u8; READ_BUFFER];
            let mut err_buf = [0u8; READ_BUFFER];
            let mut out_text = Utf8Carry::default();
            let mut err_text = Utf8Carry::default();
            let mut out_open = stdout.is_some();
            let mut err_open = stderr.is_some();

            while out_open || err_open {
                tokio::select! {
                    read = read_some(&mut stdout, &mut out_buf), if out_open => match read {
                        Ok(0) | Err(_) => out_open = false,
                        Ok(n) => {
                            collected_out.extend_from_slice(&out_buf[..n]);
                            publish(subscriber, out_text.push(&out_buf[..n])).await;
                        }
                    },
                    read = read_some(&mut stderr, &mut err_buf), if err_open => match read {
                        Ok(0) | Err(_) => err_open = false,
                        Ok(n) => {
                            collected_err.extend_from_slice(&err_buf[..n]);
                            publish(subscriber, err_text.push(&err_buf[..n])).await;
                        }
                    },
                }
            }
            publish(subscriber, out_text.finish()).await;
            publish(subscriber, err_text.finish()).await;
            child.wait().await
        };

        let finished = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, pump).await.ok(),
            None => Some(pump.await),
        };

        match finished {
            Some(Ok(status)) => outcome(
                command_line,
                status,
                &String::from_utf8_lossy(&collected_out),
                &String::from_utf8_lossy(&collected_err),
            ),
            Some(Err(err)) => CommandOutput::failure(command_line, err.to_string(), Some(1)),
            None => {
                let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
                warn!("Streaming command timed out, killing: {}", command_line);
                if let Err(err) = child.start_kill() {
                    debug!("Kill after timeout failed: {}", err);
                }
                let _ = child.wait().await;
                CommandOutput::failure(command_line, Error::Timeout(secs).to_string(), None)
                    .with_output(String::from_utf8_lossy(&collected_out).trim())
            }
        }
    }
}

async fn read_some<R>(reader: &mut Option<R>, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match reader.as_mut() {
        Some(reader) => reader.read(buf).await,
        None => Ok(0),
    }
}

/// Decodes one output stream chunk by chunk. A multi-byte character split
/// across two reads is held back until the rest of it arrives.
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // Truncated sequence at the end: keep it for the next read.
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            // Genuinely invalid bytes are replaced, not retried.
            Err(_) => self.pending.len(),
        };
        let tail = self.pending.split_off(complete);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;
        text
    }

    /// Whatever is left once the stream has closed.
    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Send one chunk; a dropped receiver just stops further publishing.
async fn publish(subscriber: &mut Option<Subscriber>, chunk: String) {
    if chunk.is_empty() {
        return;
    }
    if let Some(tx) = subscriber.as_ref() {
        if tx.send(StreamEvent::Chunk(chunk)).await.is_err() {
            debug!("Output subscriber went away");
            *subscriber = None;
        }
    }
}

#[async_trait]
impl CommandExecutor for StreamingCommandRunner {
    async fn execute(&self, raw_input: &str) -> CommandOutput {
        StreamingCommandRunner::execute(self, raw_input).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    async fn drain(mut rx: mpsc::Receiver<StreamEvent>) -> (String, Option<StreamEvent>) {
        let mut text = String::new();
        let mut last = None;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Chunk(chunk) => text.push_str(&chunk),
                closed @ StreamEvent::Closed { .. } => last = Some(closed),
            }
        }
        (text, last)
    }

    #[tokio::test]
    async fn publishes_chunks_and_close() {
        let runner = StreamingCommandRunner::new();
        let rx = runner.subscribe();
        let reader = tokio::spawn(drain(rx));

        let result = runner
            .execute("sh -c 'printf one; sleep 0.1; printf two >&2; exit 4'")
            .await;
        let (text, last) = reader.await.unwrap();

        assert!(text.contains("one"));
        assert!(text.contains("two"));
        assert_eq!(last, Some(StreamEvent::Closed { exit_code: Some(4) }));
        assert_eq!(result.exit_code, Some(4));
        assert_eq!(result.output, "one");
        assert_eq!(result.error.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn subscriber_is_used_for_one_command_only() {
        let runner = StreamingCommandRunner::new();
        let rx = runner.subscribe();
        let reader = tokio::spawn(drain(rx));

        runner.execute("printf first").await;
        let second = runner.execute("printf second").await;
        let (text, _) = reader.await.unwrap();

        assert_eq!(text, "first");
        assert_eq!(second.output, "second");
    }

    #[tokio::test]
    async fn runs_without_a_subscriber() {
        let runner = StreamingCommandRunner::new();
        let out = runner.execute("printf quiet").await;
        assert_eq!(out.output, "quiet");
        assert!(out.error.is_none());
    }

    #[tokio::test]
    async fn optional_timeout_kills_the_process() {
        let runner = StreamingCommandRunner::new().with_timeout(Some(Duration::from_millis(200)));
        let out = runner.execute("sleep 5").await;
        assert!(out.error.unwrap_or_default().contains("timed out"));
        assert!(out.exit_code.is_none());
    }

    #[tokio::test]
    async fn builtins_publish_their_output() {
        let runner = StreamingCommandRunner::new();
        let rx = runner.subscribe();
        let reader = tokio::spawn(drain(rx));

        let out = runner.execute("echo hi").await;
        let (text, last) = reader.await.unwrap();
        assert_eq!(out.output, "hi");
        assert_eq!(text, "hi");
        assert_eq!(last, Some(StreamEvent::Closed { exit_code: Some(0) }));
    }

    #[test]
    fn carry_holds_split_characters() {
        let bytes = "aé€".as_bytes();
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(&bytes[..2]), "a");
        assert_eq!(carry.push(&bytes[2..4]), "é");
        assert_eq!(carry.push(&bytes[4..5]), "");
        assert_eq!(carry.push(&bytes[5..]), "€");
        assert_eq!(carry.finish(), "");
    }

    #[test]
    fn carry_flushes_truncated_tail_on_finish() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(&[b'x', 0xE2, 0x82]), "x");
        assert_eq!(carry.finish(), "\u{FFFD}");
        assert_eq!(carry.push(&[0xFF, b'y']), "\u{FFFD}y");
    }

    #[tokio::test]
    async fn multibyte_output_across_read_boundary_is_published_intact() {
        let runner = StreamingCommandRunner::new();
        let rx = runner.subscribe();
        let reader = tokio::spawn(drain(rx));

        let result = runner
            .execute("printf '%4095s' '' | tr ' ' a; printf '\\303\\251'")
            .await;
        let (text, _) = reader.await.unwrap();

        assert!(result.output.ends_with('é'));
        assert!(!text.contains('\u{FFFD}'));
        assert_eq!(text, result.output);
    }
}
