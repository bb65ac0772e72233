use async_trait::async_trait;
use domain::models::CommandOutput;
use domain::services::HistoryLog;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::error::Result;
use shared::utils::storage_dir;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const HISTORY_FILE: &str = "history.json";
pub const COMMAND_HISTORY_FILE: &str = "commandhistory.json";
pub const ASK_HISTORY_FILE: &str = "ask-history.json";

pub const HISTORY_LIMIT: usize = 30;
pub const INPUT_HISTORY_LIMIT: usize = 100;

/// JSON-file histories kept in the metadata directory: the interaction log
/// plus the recall lists for typed commands and questions.
///
/// Unreadable or malformed files load as empty. Every append rewrites the
/// whole file trimmed to its cap.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Nearest project `.mindshell` directory, else the one in `$HOME`.
    pub fn discover() -> Self {
        Self::new(storage_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn load_history(&self) -> Vec<CommandOutput> {
        self.read_list(HISTORY_FILE).await
    }

    pub async fn append_record(&self, record: CommandOutput) -> Result<()> {
        let mut history = self.load_history().await;
        history.push(record);
        self.write_list(HISTORY_FILE, &history, HISTORY_LIMIT).await
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.write_list::<CommandOutput>(HISTORY_FILE, &[], HISTORY_LIMIT)
            .await
    }

    pub async fn load_commands(&self) -> Vec<String> {
        self.read_list(COMMAND_HISTORY_FILE).await
    }

    pub async fn push_command(&self, command: &str) -> Result<()> {
        self.push_line(COMMAND_HISTORY_FILE, command).await
    }

    pub async fn load_asks(&self) -> Vec<String> {
        self.read_list(ASK_HISTORY_FILE).await
    }

    pub async fn push_ask(&self, question: &str) -> Result<()> {
        self.push_line(ASK_HISTORY_FILE, question).await
    }

    async fn push_line(&self, file: &str, line: &str) -> Result<()> {
        let mut lines: Vec<String> = self.read_list(file).await;
        lines.push(line.to_string());
        self.write_list(file, &lines, INPUT_HISTORY_LIMIT).await
    }

    async fn read_list<T: DeserializeOwned>(&self, file: &str) -> Vec<T> {
        let path = self.dir.join(file);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(_) => return Vec::new(),
        };
        serde_json::from_str(&text).unwrap_or_else(|err| {
            debug!("Ignoring malformed {}: {}", path.display(), err);
            Vec::new()
        })
    }

    async fn write_list<T: Serialize>(&self, file: &str, items: &[T], cap: usize) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let start = items.len().saturating_sub(cap);
        let json = serde_json::to_string_pretty(&items[start..])?;
        tokio::fs::write(self.dir.join(file), json).await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryLog for HistoryStore {
    async fn append(&self, record: CommandOutput) -> Result<()> {
        self.append_record(record).await
    }

    async fn load(&self) -> Vec<CommandOutput> {
        self.load_history().await
    }
}
