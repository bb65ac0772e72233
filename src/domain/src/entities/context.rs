//! Project and system context used to build AI prompts.
//!
//! The static half (`SystemInfo`, `ToolsInfo`, `ProjectInfo`) is expensive to
//! compute and safe to cache per project. The dynamic half (`LocationInfo`,
//! `GitInfo`, `FileSystemContext`) is recomputed on every request.

use serde::{Deserialize, Serialize};
use shared::utils::shell_basename;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub release: String,
    pub shell: String,
    pub user: String,
    pub runtime: String,
    pub cwd: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Development,
    Desktop,
    Documents,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub path: String,
    pub name: String,
    pub parent: String,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<LocationKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    #[serde(rename = "type")]
    pub project_type: String,
    pub languages: Vec<String>,
    pub frameworks: Vec<String>,
    pub package_manager: Option<String>,
    pub build_tool: Option<String>,
    pub has_tests: bool,
    pub has_docker: bool,
    #[serde(rename = "hasCI")]
    pub has_ci: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsInfo {
    pub package_managers: Vec<String>,
    pub languages: Vec<String>,
    pub dev_tools: Vec<String>,
    pub databases: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitInfo {
    pub is_repo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_changes: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_untracked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
}

impl GitInfo {
    /// `git:<branch> [modified] [untracked]`, or `None` outside a repository.
    pub fn status_fragment(&self) -> Option<String> {
        if !self.is_repo {
            return None;
        }
        let mut status = vec![format!(
            "git:{}",
            self.branch.as_deref().unwrap_or("unknown")
        )];
        if self.has_changes == Some(true) {
            status.push("modified".to_string());
        }
        if self.has_untracked == Some(true) {
            status.push("untracked".to_string());
        }
        Some(status.join(" "))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemContext {
    pub file_count: usize,
    pub directories: Vec<String>,
    pub important_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The cacheable half of the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticContext {
    pub system: SystemInfo,
    pub tools: ToolsInfo,
    pub project: ProjectInfo,
}

/// On-disk cache entry for a project's static context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedContext {
    pub version: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub project_hash: String,
    #[serde(rename = "staticc")]
    pub static_context: StaticContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicContext {
    pub location: LocationInfo,
    pub git: GitInfo,
    pub files: FileSystemContext,
}

/// Cached static context merged with freshly computed dynamic context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextInfo {
    pub system: SystemInfo,
    pub location: LocationInfo,
    pub project: ProjectInfo,
    pub tools: ToolsInfo,
    pub git: GitInfo,
    pub files: FileSystemContext,
}

impl ContextInfo {
    pub fn merge(static_context: StaticContext, dynamic: DynamicContext) -> Self {
        Self {
            system: static_context.system,
            tools: static_context.tools,
            project: static_context.project,
            location: dynamic.location,
            git: dynamic.git,
            files: dynamic.files,
        }
    }

    /// One-line summary: `SYS: linux/x86_64 zsh | DIR: api (development) | ...`
    pub fn compact(&self) -> String {
        let mut parts = Vec::new();

        parts.push(format!(
            "SYS: {}/{} {} {}",
            self.system.os,
            self.system.arch,
            shell_basename(&self.system.shell),
            self.system.runtime
        ));
        parts.push(format!(
            "DIR: {} ({})",
            self.location.name,
            match self.location.context {
                Some(LocationKind::Development) => "development",
                Some(LocationKind::Desktop) => "desktop",
                Some(LocationKind::Documents) => "documents",
                None => "unknown",
            }
        ));

        if !self.project.languages.is_empty() {
            parts.push(format!("LANG: {}", self.project.languages.join(", ")));
        }
        if !self.project.frameworks.is_empty() {
            parts.push(format!("FRAMEWORK: {}", self.project.frameworks.join(", ")));
        }
        if let Some(pm) = &self.project.package_manager {
            parts.push(format!("PKG: {}", pm));
        }

        let relevant_tools: Vec<&str> = self
            .tools
            .dev_tools
            .iter()
            .filter(|t| matches!(t.as_str(), "git" | "docker" | "kubectl"))
            .chain(self.tools.languages.iter().take(3))
            .map(String::as_str)
            .collect();
        if !relevant_tools.is_empty() {
            parts.push(format!("TOOLS: {}", relevant_tools.join(", ")));
        }

        if let Some(git) = self.git.status_fragment() {
            parts.push(git);
        }

        let mut flags = Vec::new();
        if self.project.has_tests {
            flags.push("tests");
        }
        if self.project.has_docker {
            flags.push("docker");
        }
        if self.project.has_ci {
            flags.push("ci");
        }
        if !flags.is_empty() {
            parts.push(format!("FLAGS: {}", flags.join(", ")));
        }

        parts.join(" | ")
    }
}

/// Flattened view of the context that the system prompt embeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptContext {
    pub os: Option<String>,
    pub shell: Option<String>,
    pub language: Option<String>,
    pub git_repo: Option<String>,
    pub package_managers: Option<String>,
    pub python_env: Option<String>,
}

impl From<&ContextInfo> for PromptContext {
    fn from(info: &ContextInfo) -> Self {
        let git_repo = if info.git.is_repo {
            format!("{} branch", info.git.branch.as_deref().unwrap_or("main"))
        } else {
            "not a git repo".to_string()
        };
        let has_python = info.project.languages.iter().any(|l| l == "Python");

        Self {
            os: Some(info.system.os.clone()),
            shell: Some(shell_basename(&info.system.shell).to_string()),
            language: Some(info.project.languages.join(", ")),
            git_repo: Some(git_repo),
            package_managers: Some(info.tools.package_managers.join(", ")),
            python_env: Some(if has_python { "yes" } else { "no" }.to_string()),
        }
    }
}
