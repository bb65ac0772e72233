mod render;
mod session;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use infrastructure::config::Config;
use infrastructure::providers::PullProgress;
use session::Session;
use shared::telemetry::init_tracing;
use shared::utils::truncate_chars;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "mindshell")]
#[command(about = "AI-assisted shell with command recovery and guided diagnostics")]
#[command(version)]
struct Cli {
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[arg(long, global = true, help = "Run input as shell commands with live output")]
    shell: bool,

    #[arg(short = 'y', long, global = true, help = "Accept every suggestion without asking")]
    yes: bool,

    #[arg(long, global = true, help = "Project root used for context detection")]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a command, entering AI recovery if it fails
    Run {
        #[arg(trailing_var_arg = true, required = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Ask the assistant in natural language
    Ask {
        #[arg(trailing_var_arg = true, required = true)]
        prompt: Vec<String>,
    },
    /// Show the detected project and system context
    Context {
        #[arg(long, conflicts_with = "refresh", help = "One-line status from the cache")]
        quick: bool,
        #[arg(long, help = "Discard the cached context and detect again")]
        refresh: bool,
    },
    /// Show recent interactions
    History {
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
        #[arg(long, help = "Delete the interaction history")]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load();
    let project_root = cli
        .project
        .clone()
        .or_else(|| config.project_path.clone().map(PathBuf::from))
        .map_or_else(std::env::current_dir, Ok)?;
    debug!("Project root: {}", project_root.display());

    let (progress_tx, mut progress_rx) = mpsc::channel::<PullProgress>(32);
    tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            render::print_pull_progress(&event);
        }
    });

    let shell_mode = cli.shell || config.is_shell_mode_active;
    let engine = application::create_engine(config, project_root, Some(progress_tx))?;
    let session = Session::new(engine, shell_mode, cli.yes);

    match cli.command {
        Some(Commands::Run { command }) => {
            let line = command.join(" ");
            remember_command(&session, &line).await;
            session.run_command(&line, &line).await
        }
        Some(Commands::Ask { prompt }) => session.ask(&prompt.join(" ")).await,
        Some(Commands::Context { quick, refresh }) => show_context(&session, quick, refresh).await,
        Some(Commands::History { limit, clear }) => show_history(&session, limit, clear).await,
        None => repl(&session).await,
    }
}

async fn remember_command(session: &Session, line: &str) {
    if let Err(err) = session.engine().history.push_command(line).await {
        warn!("Failed to save command history: {}", err);
    }
}

async fn show_context(session: &Session, quick: bool, refresh: bool) -> Result<()> {
    let cache = &session.engine().context;
    if quick {
        println!("{}", cache.quick_status().await);
        return Ok(());
    }
    if refresh {
        cache.refresh().await?;
    }
    let snapshot = cache.load().await;
    println!("🧠 Context: {}", snapshot.compact);
    println!(
        "⚡ Loaded in {}ms (cached: {})",
        snapshot.elapsed.as_millis(),
        snapshot.cached
    );
    Ok(())
}

async fn show_history(session: &Session, limit: usize, clear: bool) -> Result<()> {
    let history = &session.engine().history;
    if clear {
        history.clear_history().await?;
        println!("History cleared");
        return Ok(());
    }

    let records = history.load_history().await;
    let start = records.len().saturating_sub(limit);
    for record in &records[start..] {
        println!(
            "{} {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            record.prompt.bold()
        );
        if let Some(command) = record.command.as_deref().filter(|c| !c.is_empty()) {
            println!("  {} {}", "$".cyan(), command);
        }
        match &record.error {
            Some(error) => println!("  {}", truncate_chars(error, 200).red()),
            None if !record.output.is_empty() => {
                println!("  {}", truncate_chars(&record.output, 200).dimmed())
            }
            None => {}
        }
    }
    Ok(())
}

async fn repl(session: &Session) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let marker = if session.shell_mode() { "$" } else { "›" };
    println!(
        "{} {}",
        "MindShell".bold(),
        "(type 'exit' to quit, 'clear' to clear the screen)".dimmed()
    );

    loop {
        print!("{} ", marker.cyan().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "exit" | "quit" => break,
            "clear" => {
                print!("\x1B[2J\x1B[1;1H");
                continue;
            }
            _ => {}
        }

        let result = if session.shell_mode() {
            remember_command(session, input).await;
            session.run_command(input, input).await
        } else {
            session.ask(input).await
        };
        if let Err(err) = result {
            eprintln!("{} {}", "Error:".red().bold(), err);
        }
    }
    Ok(())
}
