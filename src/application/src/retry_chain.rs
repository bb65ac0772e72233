//! Failure recovery loop.
//!
//! Each call runs one user command against an optional chain. Success ends
//! the chain; failure asks the model for a fix, records its suggestion as an
//! AI attempt and hands control back to the caller.

use crate::prompt_builder::build_recovery_prompt;
use domain::models::{Attempt, InteractionResponse, ResponseKind, RetryChain};
use domain::services::{CommandExecutor, ContextSource, HistoryLog, ResponseGenerator};
use infrastructure::config::Config;
use shared::error::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound on user-origin attempts per chain. `None` never gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: Option<usize>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(infrastructure::config::DEFAULT_MAX_RECOVERY_ATTEMPTS),
        }
    }
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    pub fn capped(max_attempts: usize) -> Self {
        Self {
            max_attempts: Some(max_attempts),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::capped(config.max_recovery_attempts())
    }

    fn exhausted(&self, chain: &RetryChain) -> bool {
        self.max_attempts
            .is_some_and(|max| chain.user_attempts() >= max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    /// The last command succeeded.
    Resolved,
    /// The last command failed and a suggestion is waiting.
    Recovering,
    /// The attempt cap was reached.
    GaveUp,
}

#[derive(Debug, Clone)]
pub struct CmdOutcome {
    pub done: bool,
    pub status: ChainStatus,
    pub next_response: InteractionResponse,
    pub chain: RetryChain,
}

pub struct RetryChainManager {
    executor: Arc<dyn CommandExecutor>,
    generator: Arc<dyn ResponseGenerator>,
    history: Arc<dyn HistoryLog>,
    context: Arc<dyn ContextSource>,
    policy: RetryPolicy,
}

impl RetryChainManager {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        generator: Arc<dyn ResponseGenerator>,
        history: Arc<dyn HistoryLog>,
        context: Arc<dyn ContextSource>,
    ) -> Self {
        Self {
            executor,
            generator,
            history,
            context,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `command` as the next user attempt of `chain` (a new chain when
    /// `None`).
    ///
    /// Only provider misconfiguration is returned as `Err`; every execution
    /// or model failure is folded into the outcome.
    pub async fn handle_command(
        &self,
        prompt: &str,
        command: &str,
        chain: Option<RetryChain>,
    ) -> Result<CmdOutcome> {
        let attempt = Attempt::user(prompt, command);
        let mut chain = match chain {
            Some(mut chain) => {
                chain.push(attempt);
                chain
            }
            None => RetryChain::start(attempt),
        };

        let result = self.executor.execute(command).await;
        chain.record_outcome(Some(result.output.clone()), result.error.clone());

        if let Err(err) = self.history.append(result.clone().with_prompt(prompt)).await {
            warn!("Failed to save history: {}", err);
        }

        if result.is_success() {
            debug!("Chain {} resolved after {} attempts", chain.id, chain.len());
            let response = InteractionResponse::new(ResponseKind::Command, result.output, 9.0)
                .with_command(command);
            return Ok(CmdOutcome {
                done: true,
                status: ChainStatus::Resolved,
                next_response: response,
                chain,
            });
        }

        if self.policy.exhausted(&chain) {
            info!(
                "Chain {} gave up after {} user attempts",
                chain.id,
                chain.user_attempts()
            );
            let response = InteractionResponse::conversation(format!(
                "Giving up after {} attempts. Last error: {}",
                chain.user_attempts(),
                result.error.as_deref().unwrap_or("unknown error")
            ));
            return Ok(CmdOutcome {
                done: true,
                status: ChainStatus::GaveUp,
                next_response: response,
                chain,
            });
        }

        let context = self.context.prompt_context().await;
        let recovery_prompt = build_recovery_prompt(&chain, &context);
        let response = match self.generator.recover(&recovery_prompt).await {
            Ok(response) => response,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!("Recovery request failed: {}", err);
                InteractionResponse::conversation(format!(
                    "Failed to get AI suggestion: {}",
                    err
                ))
            }
        };

        chain.push(Attempt::ai(
            prompt,
            response.command.clone().unwrap_or_default(),
            response.content.clone(),
        ));

        Ok(CmdOutcome {
            done: false,
            status: ChainStatus::Recovering,
            next_response: response,
            chain,
        })
    }
}
