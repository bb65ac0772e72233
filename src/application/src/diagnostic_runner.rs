//! Guided diagnostics: run the model's investigative steps one at a time,
//! then ask it to interpret the results.

use crate::prompt_builder::build_analysis_prompt;
use domain::models::{
    CommandOutput, DiagnosticStep, InteractionResponse, RecordKind, RetryChain, StepResult,
};
use domain::services::{CommandExecutor, HistoryLog, ResponseGenerator};
use shared::error::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

const NO_OUTPUT: &str = "(no output)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticPhase {
    Confirm,
    Running,
    Analyzing,
    Completed,
    Rejected,
}

/// State of one diagnostic session. `results[i]` always belongs to
/// `steps()[i]`.
#[derive(Debug, Clone)]
pub struct DiagnosticSession {
    response: InteractionResponse,
    prompt: String,
    chain: Option<RetryChain>,
    phase: DiagnosticPhase,
    current: usize,
    results: Vec<StepResult>,
}

impl DiagnosticSession {
    pub fn new(
        response: InteractionResponse,
        prompt: impl Into<String>,
        chain: Option<RetryChain>,
    ) -> Self {
        Self {
            response,
            prompt: prompt.into(),
            chain,
            phase: DiagnosticPhase::Confirm,
            current: 0,
            results: Vec::new(),
        }
    }

    pub fn phase(&self) -> DiagnosticPhase {
        self.phase
    }

    pub fn steps(&self) -> &[DiagnosticStep] {
        self.response.diagnostic_steps()
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn accept(&mut self) -> Result<()> {
        self.expect_phase(DiagnosticPhase::Confirm)?;
        self.phase = DiagnosticPhase::Running;
        Ok(())
    }

    pub fn reject(&mut self) -> Result<()> {
        self.expect_phase(DiagnosticPhase::Confirm)?;
        self.phase = DiagnosticPhase::Rejected;
        Ok(())
    }

    fn expect_phase(&self, expected: DiagnosticPhase) -> Result<()> {
        if self.phase != expected {
            return Err(Error::InvalidState(format!(
                "diagnostic session is {:?}, expected {:?}",
                self.phase, expected
            )));
        }
        Ok(())
    }
}

pub struct DiagnosticRunner {
    executor: Arc<dyn CommandExecutor>,
    generator: Arc<dyn ResponseGenerator>,
    history: Arc<dyn HistoryLog>,
}

impl DiagnosticRunner {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        generator: Arc<dyn ResponseGenerator>,
        history: Arc<dyn HistoryLog>,
    ) -> Self {
        Self {
            executor,
            generator,
            history,
        }
    }

    /// Execute the next step. Returns `None` once every step has run, at
    /// which point the session has moved to `Analyzing`.
    pub async fn step(&self, session: &mut DiagnosticSession) -> Result<Option<StepResult>> {
        session.expect_phase(DiagnosticPhase::Running)?;

        let Some(step) = session.steps().get(session.current).cloned() else {
            session.phase = DiagnosticPhase::Analyzing;
            return Ok(None);
        };

        debug!("Diagnostic step {}: {}", session.current + 1, step.command);
        let result = self.executor.execute(&step.command).await;
        let output = if result.output.is_empty() {
            NO_OUTPUT.to_string()
        } else {
            result.output
        };
        let step_result = StepResult {
            step,
            output,
            success: result.error.is_none(),
            error: result.error,
        };

        session.results.push(step_result.clone());
        session.current += 1;
        if session.current >= session.steps().len() {
            session.phase = DiagnosticPhase::Analyzing;
        }
        Ok(Some(step_result))
    }

    /// Ask the model to interpret the collected results. Provider failures
    /// degrade to a conversation reply carrying the raw summary.
    pub async fn analyze(&self, session: &mut DiagnosticSession) -> Result<InteractionResponse> {
        session.expect_phase(DiagnosticPhase::Analyzing)?;

        let analysis_prompt =
            build_analysis_prompt(&session.prompt, session.chain.as_ref(), &session.results);
        let response = match self.generator.recover(&analysis_prompt).await {
            Ok(response) => {
                let record = CommandOutput::note(
                    session.prompt.clone(),
                    response.content.clone(),
                    RecordKind::Explanation,
                );
                if let Err(err) = self.history.append(record).await {
                    warn!("Failed to save diagnostic analysis: {}", err);
                }
                response
            }
            Err(err) => {
                warn!("Diagnostic analysis failed: {}", err);
                InteractionResponse::conversation(format!(
                    "Failed to get AI analysis: {}\n\n{}",
                    err, analysis_prompt
                ))
            }
        };

        session.phase = DiagnosticPhase::Completed;
        Ok(response)
    }

    /// Run all remaining steps, then analyze. The session must already be
    /// accepted.
    pub async fn run(&self, session: &mut DiagnosticSession) -> Result<InteractionResponse> {
        while session.phase() == DiagnosticPhase::Running {
            self.step(session).await?;
        }
        info!(
            "Diagnostic steps finished: {}/{} succeeded",
            session.results.iter().filter(|r| r.success).count(),
            session.results.len()
        );
        self.analyze(session).await
    }
}
