//! Prompt text for the assistant. Pure string assembly, no I/O.

use domain::entities::context::PromptContext;
use domain::models::{RetryChain, StepResult};

/// User-turn instruction sent alongside a recovery or analysis prompt.
pub const RECOVERY_INSTRUCTION: &str = "Respond with the JSON object only.";

const RESPONSE_FORMAT: &str = r#"RESPONSE FORMAT (Always valid JSON):
{
  "type": "command | diagnostic | explanation | conversation",
  "content": "Main explanation or response",
  "command": "Only if type is command",
  "explanation": "Optional explanation for command",
  "confidence": 1-10,
  "steps": [
    {
      "label": "What this step checks",
      "command": "Shell command",
      "explanation": "Why this step helps",
      "safe": true
    }
  ],
  "final_command": "Optional final shell command",
  "final_safe": true
}
Only include 'steps', 'final_command', and 'final_safe' if type === "diagnostic"."#;

const BASE_PROMPT: &str = r#"You are an intelligent CLI assistant that understands user intent and responds appropriately.

RESPONSE FORMAT: You must respond with a JSON object containing:
{
  "type": "command|explanation|answer|conversation|diagnostic",
  "content": "your main response",
  "command": "shell command if type is command",
  "steps": [
    {
      "label": "Describe what this checks",
      "command": "shell command",
      "explanation": "What the user can learn from it",
      "safe": true
    }
  ],
  "final_command": "optional command to try at the end",
  "final_safe": false,
  "explanation": "optional explanation for commands",
  "confidence": 1-10
}

INTENT DETECTION:
- "command": User wants to execute a shell command (e.g., "list files", "install package", "check git status")
- "explanation": User wants to understand how something works (e.g., "how does grep work?", "explain docker")
- "answer": User asks a factual question (e.g., "what is the difference between...", "when was...")
- "conversation": User is chatting, greeting, or making casual conversation
- "diagnostic": Provide 2-5 safe diagnostic steps to investigate

COMMAND GUIDELINES:
- If a value is needed to complete a command, put it inside < > so the user can fill it in
- Suggest the most appropriate single command or pipeline
- Consider the user's environment and context
- Use modern, safe practices
- For complex operations, break into steps if needed
- Always explain potentially dangerous commands
- If a command may be dangerous (e.g. 'rm', 'dd', 'mkfs', 'chmod', 'reboot'), ALWAYS include a clear warning in the "explanation" field that starts with: "**WARNING:**"

CONTEXT INFORMATION:"#;

const EXAMPLES: &str = r#"EXAMPLES:
User: "list files" → {"type": "command", "content": "ls -la", "command": "ls -la", "confidence": 9}
User: "how does grep work?" → {"type": "explanation", "content": "grep is a command-line utility...", "confidence": 8}
User: "what is Python?" → {"type": "answer", "content": "Python is a high-level programming language...", "confidence": 9}
User: "hello" → {"type": "conversation", "content": "Hello! How can I help you today?", "confidence": 10}

Always respond with valid JSON only."#;

pub fn build_system_prompt(context: &PromptContext) -> String {
    let mut prompt = String::from(BASE_PROMPT);

    let lines = [
        ("Operating System", &context.os),
        ("Project Language", &context.language),
        ("Shell", &context.shell),
        ("Git Repository", &context.git_repo),
        ("Available Package Managers", &context.package_managers),
        ("Python Environment", &context.python_env),
    ];
    for (label, value) in lines {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            prompt.push_str(&format!("\n- {}: {}", label, value));
        }
    }

    prompt.push_str("\n\n");
    prompt.push_str(EXAMPLES);
    prompt
}

/// Every attempt in the chain, oldest first.
pub fn format_attempts(chain: &RetryChain) -> String {
    chain
        .attempts()
        .iter()
        .enumerate()
        .map(|(i, attempt)| {
            format!(
                "Attempt {}:\n- Origin: {}\n- Prompt: {}\n- Command: {}\n- Output: {}\n- Error: {}",
                i + 1,
                attempt.origin,
                attempt.prompt,
                attempt.command,
                attempt.output.as_deref().unwrap_or("none"),
                attempt.error.as_deref().unwrap_or("none"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System prompt plus the failing command and the full attempt history.
pub fn build_recovery_prompt(chain: &RetryChain, context: &PromptContext) -> String {
    let (command, error) = chain
        .last()
        .map(|last| {
            (
                last.command.as_str(),
                last.error.as_deref().unwrap_or("No error info"),
            )
        })
        .unwrap_or(("", "No error info"));

    format!(
        "{base}\n\n--- SMART ERROR RECOVERY MODE ---\n\n\
         The previous command failed.\n\n\
         Command:\n```\n{command}\n```\n\n\
         Error:\n```\n{error}\n```\n\n\
         Attempt history:\n{history}\n\n\
         YOUR JOB:\n\n\
         1. Analyze the error and determine what kind of response is best:\n   \
         - \"command\": Suggest one shell command to fix the issue\n   \
         - \"diagnostic\": Provide 2-5 safe diagnostic steps to investigate\n   \
         - \"explanation\": Just explain why it failed if no command is useful\n   \
         - \"conversation\": If the error is not technical, respond politely\n\n\
         2. Respond in a consistent JSON format (see below)\n\n\
         {format}\n",
        base = build_system_prompt(context),
        command = command,
        error = error,
        history = format_attempts(chain),
        format = RESPONSE_FORMAT,
    )
}

/// Per-step ✅/❌ lines: label, command, then output or error.
pub fn diagnostic_summary(results: &[StepResult]) -> String {
    results
        .iter()
        .map(|result| {
            let detail = if result.success {
                result.output.as_str()
            } else {
                result.error.as_deref().unwrap_or(result.output.as_str())
            };
            format!(
                "🔍 {}\n$ {}\n{} {}\n",
                result.step.label,
                result.step.command,
                if result.success { "✅" } else { "❌" },
                detail
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_analysis_prompt(
    original_prompt: &str,
    chain: Option<&RetryChain>,
    results: &[StepResult],
) -> String {
    let chain_json = chain
        .and_then(|c| serde_json::to_string_pretty(c).ok())
        .unwrap_or_else(|| "null".to_string());

    format!(
        "Please analyze this diagnostic session:\n\n\
         📋 Original Issue:\n{prompt}\n\n\
         🔁 Retry Chain:\n{chain}\n\n\
         📊 Diagnostic Results:\n{summary}\n\n\
         Please provide a short, simple summary and recommendations based on these \
         diagnostic results. In the content, mention the initial command and what was \
         tried to resolve it, including the diagnostic steps.\n\
         1. Analyze and determine what kind of response is best:\n   \
         - \"explanation\": Just explain why it failed if no command is useful\n\
         2. Respond in a consistent JSON format (see below)\n\n\
         {format}\n",
        prompt = original_prompt,
        chain = chain_json,
        summary = diagnostic_summary(results),
        format = RESPONSE_FORMAT,
    )
}
