use colored::Colorize;
use domain::models::{InteractionResponse, ResponseKind, StepResult};
use infrastructure::providers::{PullProgress, PullStage};

pub fn print_response(response: &InteractionResponse) {
    match response.kind {
        ResponseKind::Command => {
            if let Some(command) = &response.command {
                println!("{} {}", "$".cyan().bold(), command.cyan());
            }
            if !response.content.is_empty()
                && response.command.as_deref() != Some(response.content.as_str())
            {
                println!("{}", response.content);
            }
            if let Some(explanation) = &response.explanation {
                if explanation.starts_with("**WARNING:**") {
                    println!("{}", explanation.yellow().bold());
                } else {
                    println!("{}", explanation.dimmed());
                }
            }
        }
        ResponseKind::Diagnostic => {
            println!("{} {}", "Explanation:".dimmed(), response.content.yellow());
            for (i, step) in response.diagnostic_steps().iter().enumerate() {
                println!("  {}. {}", i + 1, step.label);
                println!("     {} {}", "$".cyan(), step.command.cyan().bold());
            }
        }
        ResponseKind::Explanation | ResponseKind::Answer => {
            println!("{}", response.content);
        }
        ResponseKind::Conversation => {
            println!("{}", response.content.green());
        }
    }
    println!(
        "{}",
        format!("confidence {}/10", response.confidence).dimmed()
    );
}

pub fn print_step(index: usize, total: usize, result: &StepResult) {
    let mark = if result.success { "✅" } else { "❌" };
    println!("{} [{}/{}] {}", mark, index, total, result.step.label);
    println!("   {} {}", "$".cyan(), result.step.command);
    let detail = if result.success {
        result.output.as_str()
    } else {
        result.error.as_deref().unwrap_or_default()
    };
    for line in detail.lines() {
        println!("   {}", line.dimmed());
    }
}

pub fn print_pull_progress(event: &PullProgress) {
    if let Some(error) = &event.error {
        eprintln!("{} {}", "Download failed:".red(), error);
        return;
    }
    let label = match event.stage {
        PullStage::Initializing => "init",
        PullStage::Downloading => "download",
        PullStage::Verifying => "verify",
        PullStage::Writing => "write",
        PullStage::Complete => "done",
    };
    eprintln!(
        "{} {} {:>5.1}% {}",
        format!("[{}]", event.model).cyan(),
        label,
        event.percentage,
        event.message.dimmed()
    );
}
