use async_trait::async_trait;
use domain::models::CommandOutput;
use domain::services::CommandExecutor;
use shared::error::Error;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::builtins;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Build a `Command` that runs `line` through the platform shell.
pub(crate) fn shell_command(line: &str) -> Command {
    #[cfg(windows)]
    let mut command = {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(line);
        c
    };
    #[cfg(not(windows))]
    let mut command = {
        let mut c = Command::new("sh");
        c.arg("-c").arg(line);
        c
    };
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    command
}

/// Buffered command execution with a hard timeout and an output cap.
///
/// `execute` never fails: every outcome, including spawn errors and
/// timeouts, is reported through the returned `CommandOutput`.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    max_output: usize,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_output: MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.max_output = bytes;
        self
    }

    pub async fn execute(&self, raw_input: &str) -> CommandOutput {
        let trimmed = raw_input.trim();
        if trimmed.is_empty() {
            return CommandOutput::empty(raw_input);
        }

        if let Some(output) = builtins::dispatch(raw_input) {
            debug!("Builtin handled: {}", trimmed);
            return output;
        }

        self.run_subprocess(trimmed).await.with_prompt(raw_input)
    }

    async fn run_subprocess(&self, command_line: &str) -> CommandOutput {
        debug!("Spawning: {}", command_line);
        let mut child = match shell_command(command_line).spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!("Failed to spawn '{}': {}", command_line, err);
                return CommandOutput::failure(command_line, err.to_string(), Some(1));
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let cap = self.max_output;

        let collect = async {
            let (out, err) = tokio::join!(read_capped(stdout, cap), read_capped(stderr, cap));
            let status = child.wait().await;
            (out, err, status)
        };

        let (stdout, stderr, status) = match tokio::time::timeout(self.timeout, collect).await {
            Ok(results) => results,
            Err(_) => {
                warn!("Command timed out, killing: {}", command_line);
                if let Err(err) = child.start_kill() {
                    debug!("Kill after timeout failed: {}", err);
                }
                let _ = child.wait().await;
                return CommandOutput::failure(
                    command_line,
                    Error::Timeout(self.timeout.as_secs()).to_string(),
                    None,
                );
            }
        };

        let status = match status {
            Ok(status) => status,
            Err(err) => return CommandOutput::failure(command_line, err.to_string(), Some(1)),
        };
        let exit_code = status.code().unwrap_or(1);

        let (stdout, stdout_overflow) = match stdout {
            Ok(read) => read,
            Err(err) => {
                return CommandOutput::failure(command_line, err.to_string(), Some(exit_code))
            }
        };
        let (stderr, stderr_overflow) = stderr.unwrap_or_default();
        let stdout = String::from_utf8_lossy(&stdout);
        let stderr = String::from_utf8_lossy(&stderr);

        if stdout_overflow || stderr_overflow {
            let stream = if stdout_overflow { "stdout" } else { "stderr" };
            return CommandOutput::failure(
                command_line,
                format!("{} maxBuffer length exceeded", stream),
                Some(if status.success() { 1 } else { exit_code }),
            )
            .with_output(stdout.trim());
        }

        outcome(command_line, status, &stdout, &stderr)
    }
}

/// Fold a finished process into a result record. Exit 0 is success even when
/// stderr is non-empty.
pub(crate) fn outcome(
    command_line: &str,
    status: ExitStatus,
    stdout: &str,
    stderr: &str,
) -> CommandOutput {
    let stdout = stdout.trim();
    let stderr = stderr.trim();

    if status.success() {
        if !stderr.is_empty() {
            debug!("'{}' wrote to stderr: {}", command_line, stderr);
        }
        return CommandOutput::success(command_line, stdout);
    }

    let exit_code = status.code().unwrap_or(1);
    debug!("'{}' exited with {}", command_line, exit_code);
    let error = if stderr.is_empty() {
        format!("Command failed: {}", command_line)
    } else {
        stderr.to_string()
    };
    CommandOutput::failure(command_line, error, Some(exit_code)).with_output(stdout)
}

/// Read at most `cap` bytes; the flag reports whether the stream had more.
async fn read_capped<R>(reader: Option<R>, cap: usize) -> io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok((Vec::new(), false));
    };
    let mut buf = Vec::new();
    reader.take(cap as u64 + 1).read_to_end(&mut buf).await?;
    let overflow = buf.len() > cap;
    if overflow {
        buf.truncate(cap);
    }
    Ok((buf, overflow))
}

#[async_trait]
impl CommandExecutor for CommandRunner {
    async fn execute(&self, raw_input: &str) -> CommandOutput {
        CommandRunner::execute(self, raw_input).await
    }
}
