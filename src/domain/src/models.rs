use serde::{Deserialize, Serialize};
use shared::types::{now, ChainId, Timestamp};
use std::fmt;

/// Who authored an attempt in a retry chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    User,
    Ai,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::User => write!(f, "user"),
            Origin::Ai => write!(f, "ai"),
        }
    }
}

/// One (prompt, command, outcome) tuple inside a retry chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub origin: Origin,
    pub prompt: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Attempt {
    pub fn user(prompt: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            origin: Origin::User,
            prompt: prompt.into(),
            command: command.into(),
            output: None,
            error: None,
        }
    }

    pub fn ai(
        prompt: impl Into<String>,
        command: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            origin: Origin::Ai,
            prompt: prompt.into(),
            command: command.into(),
            output: Some(output.into()),
            error: None,
        }
    }
}

/// Ordered history of attempts for one failure-recovery conversation.
///
/// Append-only: attempts are never removed, and only the newest attempt may
/// have its outcome recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryChain {
    pub id: ChainId,
    pub started_at: Timestamp,
    attempts: Vec<Attempt>,
}

impl RetryChain {
    /// Start a chain seeded with its first attempt.
    pub fn start(first: Attempt) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: now(),
            attempts: vec![first],
        }
    }

    pub fn push(&mut self, attempt: Attempt) {
        self.attempts.push(attempt);
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn last(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    /// Fill in the outcome of the newest attempt.
    pub fn record_outcome(&mut self, output: Option<String>, error: Option<String>) {
        if let Some(current) = self.attempts.last_mut() {
            current.output = output;
            current.error = error;
        }
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn user_attempts(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.origin == Origin::User)
            .count()
    }
}

/// Kind of structured reply produced by the AI provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Command,
    Explanation,
    Diagnostic,
    Answer,
    Conversation,
}

impl ResponseKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "command" => Some(Self::Command),
            "explanation" => Some(Self::Explanation),
            "diagnostic" => Some(Self::Diagnostic),
            "answer" => Some(Self::Answer),
            "conversation" => Some(Self::Conversation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Explanation => "explanation",
            Self::Diagnostic => "diagnostic",
            Self::Answer => "answer",
            Self::Conversation => "conversation",
        }
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One AI-proposed investigative command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticStep {
    pub label: String,
    pub command: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub safe: bool,
}

/// Outcome of running one diagnostic step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: DiagnosticStep,
    pub output: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Parsed structured reply from the AI provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<DiagnosticStep>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_safe: Option<bool>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_output: Option<String>,
}

impl InteractionResponse {
    pub fn new(kind: ResponseKind, content: impl Into<String>, confidence: f64) -> Self {
        Self {
            kind,
            content: content.into(),
            command: None,
            explanation: None,
            safe: None,
            steps: None,
            final_command: None,
            final_safe: None,
            confidence,
            llm_output: None,
        }
    }

    pub fn conversation(content: impl Into<String>) -> Self {
        Self::new(ResponseKind::Conversation, content, 5.0)
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn diagnostic_steps(&self) -> &[DiagnosticStep] {
        match (&self.kind, &self.steps) {
            (ResponseKind::Diagnostic, Some(steps)) => steps,
            _ => &[],
        }
    }
}

/// Classification of a record in the interaction history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    #[serde(rename = "")]
    Empty,
    Command,
    Explanation,
    Answer,
    Conversation,
    Diagnostic,
    Error,
}

impl From<ResponseKind> for RecordKind {
    fn from(kind: ResponseKind) -> Self {
        match kind {
            ResponseKind::Command => RecordKind::Command,
            ResponseKind::Explanation => RecordKind::Explanation,
            ResponseKind::Diagnostic => RecordKind::Diagnostic,
            ResponseKind::Answer => RecordKind::Answer,
            ResponseKind::Conversation => RecordKind::Conversation,
        }
    }
}

/// Result of running one command, and the unit stored in the history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: Timestamp,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// The no-op result for blank input.
    pub fn empty(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            command: Some(String::new()),
            output: String::new(),
            error: None,
            timestamp: now(),
            kind: RecordKind::Empty,
            exit_code: None,
        }
    }

    pub fn success(command: impl Into<String>, output: impl Into<String>) -> Self {
        let command = command.into();
        Self {
            prompt: command.clone(),
            command: Some(command),
            output: output.into(),
            error: None,
            timestamp: now(),
            kind: RecordKind::Command,
            exit_code: Some(0),
        }
    }

    pub fn failure(
        command: impl Into<String>,
        error: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        let command = command.into();
        Self {
            prompt: command.clone(),
            command: Some(command),
            output: String::new(),
            error: Some(error.into()),
            timestamp: now(),
            kind: RecordKind::Command,
            exit_code,
        }
    }

    /// A history entry that did not come from running a command.
    pub fn note(prompt: impl Into<String>, output: impl Into<String>, kind: RecordKind) -> Self {
        Self {
            prompt: prompt.into(),
            command: None,
            output: output.into(),
            error: None,
            timestamp: now(),
            kind,
            exit_code: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn command_text(&self) -> &str {
        self.command.as_deref().unwrap_or("")
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
