//! In-process command handlers that bypass the system shell.
//!
//! Lookup is an exact match on the first whitespace-delimited token against a
//! static table; there are no aliases or prefix matches.

use chrono::Local;
use domain::models::CommandOutput;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

type Handler = fn(&[&str]) -> Result<String, String>;

pub struct Builtin {
    pub name: &'static str,
    pub description: &'static str,
    handler: Handler,
}

static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "help",
        description: "Show available commands",
        handler: help,
    },
    Builtin {
        name: "clear",
        description: "Clear the output history",
        handler: clear,
    },
    Builtin {
        name: "pwd",
        description: "Show current working directory",
        handler: pwd,
    },
    Builtin {
        name: "ls",
        description: "List directory contents",
        handler: ls,
    },
    Builtin {
        name: "cat",
        description: "Display file contents",
        handler: cat,
    },
    Builtin {
        name: "echo",
        description: "Display text",
        handler: echo,
    },
    Builtin {
        name: "date",
        description: "Show current date and time",
        handler: date,
    },
    Builtin {
        name: "whoami",
        description: "Show current user",
        handler: whoami,
    },
];

static REGISTRY: Lazy<HashMap<&'static str, &'static Builtin>> =
    Lazy::new(|| BUILTINS.iter().map(|b| (b.name, b)).collect());

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    REGISTRY.get(name).copied()
}

pub fn all() -> &'static [Builtin] {
    BUILTINS
}

/// Run `input` if its first token names a builtin. Returns `None` when the
/// input should go to the system shell instead.
pub fn dispatch(input: &str) -> Option<CommandOutput> {
    let trimmed = input.trim();
    let mut tokens = trimmed.split_whitespace();
    let builtin = lookup(tokens.next()?)?;
    let args: Vec<&str> = tokens.collect();

    let record = match (builtin.handler)(&args) {
        Ok(output) => CommandOutput::success(trimmed, output),
        Err(error) => CommandOutput::failure(trimmed, error, Some(1)),
    };
    Some(record.with_prompt(input))
}

fn help(_args: &[&str]) -> Result<String, String> {
    let mut lines: Vec<String> = BUILTINS
        .iter()
        .map(|b| format!("{:<8} {}", b.name, b.description))
        .collect();
    lines.insert(2, format!("{:<8} {}", "exit", "Exit the application"));
    lines.push(String::new());
    lines.push("Any other command is executed in the system shell.".to_string());
    Ok(lines.join("\n"))
}

fn clear(_args: &[&str]) -> Result<String, String> {
    Ok("✨ Output history cleared".to_string())
}

fn pwd(_args: &[&str]) -> Result<String, String> {
    std::env::current_dir()
        .map(|dir| dir.display().to_string())
        .map_err(|err| describe_io_error(&err, "uv_cwd", ""))
}

fn ls(args: &[&str]) -> Result<String, String> {
    let path = args.first().copied().unwrap_or(".");
    let entries = fs::read_dir(path).map_err(|err| describe_io_error(&err, "scandir", path))?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    let rows: Vec<String> = names
        .iter()
        .map(|name| match fs::metadata(Path::new(path).join(name)) {
            Ok(meta) => {
                let icon = if meta.is_dir() { "📁" } else { "📄" };
                let modified = meta
                    .modified()
                    .ok()
                    .map(|time| {
                        chrono::DateTime::<Local>::from(time)
                            .format("%Y-%m-%d")
                            .to_string()
                    })
                    .unwrap_or_default();
                format!("{} {:<20} {:>8} {}", icon, name, meta.len(), modified)
            }
            Err(_) => format!("❓ {}", name),
        })
        .collect();

    if rows.is_empty() {
        Ok("No items found".to_string())
    } else {
        Ok(rows.join("\n"))
    }
}

fn cat(args: &[&str]) -> Result<String, String> {
    let Some(path) = args.first() else {
        return Err("Usage: cat <filename>".to_string());
    };
    fs::read_to_string(path).map_err(|err| describe_io_error(&err, "open", path))
}

fn echo(args: &[&str]) -> Result<String, String> {
    Ok(args.join(" "))
}

fn date(_args: &[&str]) -> Result<String, String> {
    Ok(Local::now().format("%a %b %d %Y %H:%M:%S %z").to_string())
}

fn whoami(_args: &[&str]) -> Result<String, String> {
    Ok(std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string()))
}

/// Render an I/O failure as `ENOENT: no such file or directory, open 'a.txt'`.
fn describe_io_error(err: &io::Error, op: &str, path: &str) -> String {
    let (code, message) = match (err.kind(), err.raw_os_error()) {
        (io::ErrorKind::NotFound, _) => ("ENOENT", "no such file or directory"),
        (io::ErrorKind::PermissionDenied, _) => ("EACCES", "permission denied"),
        (_, Some(20)) => ("ENOTDIR", "not a directory"),
        (_, Some(21)) => ("EISDIR", "illegal operation on a directory"),
        _ => return err.to_string(),
    };
    if path.is_empty() {
        format!("{}: {}, {}", code, message, op)
    } else {
        format!("{}: {}, {} '{}'", code, message, op, path)
    }
}
