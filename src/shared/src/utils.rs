use crate::types::METADATA_DIR;
use std::path::{Path, PathBuf};

pub fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Walk up from `start` looking for a `.mindshell` directory.
pub fn find_metadata_dir(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        let candidate = dir.join(METADATA_DIR);
        if candidate.is_dir() {
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}

/// Project-local metadata directory if one exists above the working
/// directory, otherwise the global one under the home directory.
pub fn storage_dir() -> PathBuf {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| find_metadata_dir(&cwd))
        .unwrap_or_else(|| home_dir().join(METADATA_DIR))
}

/// Truncate to at most `max` characters, appending an ellipsis when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push_str("...");
    cut
}

/// Last path component of a shell path such as `/usr/bin/zsh`.
pub fn shell_basename(shell: &str) -> &str {
    shell
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(shell)
}
