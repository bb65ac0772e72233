use crate::render;
use anyhow::Result;
use application::diagnostic_runner::{DiagnosticPhase, DiagnosticSession};
use application::retry_chain::{ChainStatus, CmdOutcome};
use application::Engine;
use colored::Colorize;
use dialoguer::Confirm;
use domain::models::{InteractionResponse, Origin, ResponseKind, RetryChain};
use domain::services::ResponseGenerator;
use infrastructure::StreamEvent;
use std::io::Write;
use tracing::warn;

/// One user's interactive session on top of an `Engine`.
pub struct Session {
    engine: Engine,
    shell_mode: bool,
    assume_yes: bool,
}

impl Session {
    pub fn new(engine: Engine, shell_mode: bool, assume_yes: bool) -> Self {
        Self {
            engine,
            shell_mode,
            assume_yes,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn shell_mode(&self) -> bool {
        self.shell_mode
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        Ok(Confirm::new().with_prompt(prompt).default(true).interact()?)
    }

    /// Run a command and walk the user through recovery until it succeeds,
    /// the user declines a suggestion or the chain gives up.
    pub async fn run_command(&self, prompt: &str, command: &str) -> Result<()> {
        let mut outcome = self.execute(prompt, command, None).await?;
        loop {
            match outcome.status {
                ChainStatus::Resolved => {
                    if !self.shell_mode && !outcome.next_response.content.is_empty() {
                        println!("{}", outcome.next_response.content);
                    }
                    return Ok(());
                }
                ChainStatus::GaveUp => {
                    render::print_response(&outcome.next_response);
                    return Ok(());
                }
                ChainStatus::Recovering => {}
            }

            if let Some(error) = last_user_error(&outcome.chain) {
                if !self.shell_mode {
                    eprintln!("{}", error.red());
                }
            }
            let response = outcome.next_response.clone();
            render::print_response(&response);

            match response.kind {
                ResponseKind::Command => {
                    let Some(next) = suggested_command(&response) else {
                        return Ok(());
                    };
                    if !self.confirm("Run suggested command?")? {
                        return Ok(());
                    }
                    outcome = self.execute(prompt, &next, Some(outcome.chain)).await?;
                }
                ResponseKind::Diagnostic => {
                    return self.diagnose(prompt, response, Some(outcome.chain)).await;
                }
                _ => return Ok(()),
            }
        }
    }

    async fn execute(
        &self,
        prompt: &str,
        command: &str,
        chain: Option<RetryChain>,
    ) -> Result<CmdOutcome> {
        if !self.shell_mode {
            return Ok(self.engine.retry.handle_command(prompt, command, chain).await?);
        }

        let mut events = self.engine.streaming.subscribe();
        let printer = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    StreamEvent::Chunk(text) => {
                        print!("{}", text);
                        let _ = std::io::stdout().flush();
                    }
                    StreamEvent::Closed { exit_code } => {
                        if let Some(code) = exit_code.filter(|code| *code != 0) {
                            eprintln!("{}", format!("[exit {}]", code).red());
                        }
                        break;
                    }
                }
            }
        });

        let outcome = self
            .engine
            .shell_retry
            .handle_command(prompt, command, chain)
            .await;
        if let Err(err) = printer.await {
            warn!("Output printer stopped: {}", err);
        }
        Ok(outcome?)
    }

    pub async fn ask(&self, prompt: &str) -> Result<()> {
        if let Err(err) = self.engine.history.push_ask(prompt).await {
            warn!("Failed to save ask history: {}", err);
        }

        let response = self.engine.assistant.ask(prompt).await?;
        render::print_response(&response);

        match response.kind {
            ResponseKind::Command => {
                if let Some(command) = suggested_command(&response) {
                    if self.confirm("Run this command?")? {
                        self.run_command(prompt, &command).await?;
                    }
                }
            }
            ResponseKind::Diagnostic => {
                self.diagnose(prompt, response, None).await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn diagnose(
        &self,
        prompt: &str,
        response: InteractionResponse,
        chain: Option<RetryChain>,
    ) -> Result<()> {
        let mut session = DiagnosticSession::new(response, prompt, chain);
        let total = session.steps().len();

        if !self.confirm(&format!("Run these {} diagnostic steps?", total))? {
            session.reject()?;
            return Ok(());
        }
        session.accept()?;

        let runner = &self.engine.diagnostics;
        while session.phase() == DiagnosticPhase::Running {
            if let Some(result) = runner.step(&mut session).await? {
                render::print_step(session.current_index(), total, &result);
            }
        }

        println!("{}", "Analyzing diagnostic results...".dimmed());
        let verdict = runner.analyze(&mut session).await?;
        render::print_response(&verdict);
        Ok(())
    }
}

fn suggested_command(response: &InteractionResponse) -> Option<String> {
    response
        .command
        .as_deref()
        .map(str::trim)
        .filter(|command| !command.is_empty())
        .map(str::to_string)
}

fn last_user_error(chain: &RetryChain) -> Option<&str> {
    chain
        .attempts()
        .iter()
        .rev()
        .find(|attempt| attempt.origin == Origin::User)
        .and_then(|attempt| attempt.error.as_deref())
}
