use async_trait::async_trait;
use domain::entities::context::{
    FileSystemContext, GitInfo, LocationInfo, LocationKind, ProjectInfo, SystemInfo, ToolsInfo,
};
use futures::future::join_all;
use shared::types::{METADATA_DIR, RUNTIME_VERSION};
use std::collections::HashSet;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(1);
const GIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Files whose contents decide project detection. The cache hash covers
/// exactly these plus the top-level listing.
pub const MANIFEST_FILES: &[&str] = &[
    "package.json",
    "tsconfig.json",
    "go.mod",
    "Cargo.toml",
    "requirements.txt",
    "pyproject.toml",
    "pom.xml",
    "build.gradle",
    "composer.json",
    "pubspec.yaml",
    "Gemfile",
    "mix.exs",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolCategory {
    PackageManager,
    Language,
    DevTool,
    Database,
}

const TOOL_CATALOGUE: &[(&str, ToolCategory)] = &[
    ("npm", ToolCategory::PackageManager),
    ("yarn", ToolCategory::PackageManager),
    ("pnpm", ToolCategory::PackageManager),
    ("bun", ToolCategory::PackageManager),
    ("node", ToolCategory::Language),
    ("python", ToolCategory::Language),
    ("python3", ToolCategory::Language),
    ("go", ToolCategory::Language),
    ("rustc", ToolCategory::Language),
    ("java", ToolCategory::Language),
    ("php", ToolCategory::Language),
    ("ruby", ToolCategory::Language),
    ("deno", ToolCategory::Language),
    ("git", ToolCategory::DevTool),
    ("docker", ToolCategory::DevTool),
    ("kubectl", ToolCategory::DevTool),
    ("terraform", ToolCategory::DevTool),
    ("ansible", ToolCategory::DevTool),
    ("helm", ToolCategory::DevTool),
    ("mysql", ToolCategory::Database),
    ("psql", ToolCategory::Database),
    ("mongo", ToolCategory::Database),
    ("redis-cli", ToolCategory::Database),
];

/// Checks whether a developer tool is installed.
#[async_trait]
pub trait ToolProbe: Send + Sync {
    async fn available(&self, tool: &str) -> bool;
}

/// Probes with `which` (`where` on Windows), one second per tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhichProbe;

#[async_trait]
impl ToolProbe for WhichProbe {
    async fn available(&self, tool: &str) -> bool {
        let finder = if cfg!(windows) { "where" } else { "which" };
        let status = Command::new(finder)
            .arg(tool)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();
        matches!(
            tokio::time::timeout(PROBE_TIMEOUT, status).await,
            Ok(Ok(status)) if status.success()
        )
    }
}

pub async fn detect_tools(probe: &dyn ToolProbe) -> ToolsInfo {
    let checks = TOOL_CATALOGUE.iter().map(|(tool, _)| probe.available(tool));
    let results = join_all(checks).await;

    let mut tools = ToolsInfo::default();
    for ((tool, category), found) in TOOL_CATALOGUE.iter().zip(results) {
        if !found {
            continue;
        }
        let bucket = match category {
            ToolCategory::PackageManager => &mut tools.package_managers,
            ToolCategory::Language => &mut tools.languages,
            ToolCategory::DevTool => &mut tools.dev_tools,
            ToolCategory::Database => &mut tools.databases,
        };
        bucket.push(tool.to_string());
    }
    debug!(
        "Tool probe found {} tools",
        tools.package_managers.len()
            + tools.languages.len()
            + tools.dev_tools.len()
            + tools.databases.len()
    );
    tools
}

pub async fn system_info() -> SystemInfo {
    let release = if cfg!(windows) {
        String::new()
    } else {
        run_quiet(Command::new("uname").arg("-r"), PROBE_TIMEOUT)
            .await
            .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
            .unwrap_or_default()
    };

    SystemInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        release,
        shell: std::env::var("SHELL")
            .or_else(|_| std::env::var("ComSpec"))
            .unwrap_or_else(|_| "unknown".to_string()),
        user: std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string()),
        runtime: format!("mindshell{}", RUNTIME_VERSION),
        cwd: std::env::current_dir()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default(),
    }
}

/// Project rule: any of `files` present contributes its language, framework
/// or build tool.
struct Rule {
    files: &'static [&'static str],
    language: Option<&'static str>,
    framework: Option<&'static str>,
    build_tool: Option<&'static str>,
}

const fn rule(
    files: &'static [&'static str],
    language: Option<&'static str>,
    framework: Option<&'static str>,
    build_tool: Option<&'static str>,
) -> Rule {
    Rule {
        files,
        language,
        framework,
        build_tool,
    }
}

const RULES: &[Rule] = &[
    rule(
        &["next.config.js", "next.config.mjs", "next.config.ts"],
        Some("TypeScript"),
        Some("Next.js"),
        None,
    ),
    rule(&["tsconfig.json"], Some("TypeScript"), None, None),
    rule(&["angular.json"], None, Some("Angular"), None),
    rule(&["nuxt.config.js", "nuxt.config.ts"], None, Some("Nuxt"), None),
    rule(&["gatsby-config.js"], None, Some("Gatsby"), None),
    rule(&["remix.config.js"], None, Some("Remix"), None),
    rule(&["vite.config.js", "vite.config.ts"], None, None, Some("Vite")),
    rule(&["webpack.config.js"], None, None, Some("Webpack")),
    rule(&["rollup.config.js"], None, None, Some("Rollup")),
    rule(&["esbuild.config.js"], None, None, Some("ESBuild")),
    rule(&["go.mod", "main.go"], Some("Go"), None, None),
    rule(&["Cargo.toml"], Some("Rust"), None, None),
    rule(
        &["requirements.txt", "pyproject.toml", "main.py", "app.py"],
        Some("Python"),
        None,
        None,
    ),
    rule(&["Pipfile"], Some("Python"), Some("Pipenv"), None),
    rule(&["poetry.lock"], Some("Python"), Some("Poetry"), None),
    rule(&["pom.xml"], Some("Java"), None, Some("Maven")),
    rule(
        &["build.gradle", "build.gradle.kts"],
        Some("Java/Kotlin"),
        None,
        Some("Gradle"),
    ),
    rule(&["composer.json"], Some("PHP"), None, None),
    rule(&["pubspec.yaml"], Some("Dart"), Some("Flutter"), None),
    rule(&["Gemfile"], Some("Ruby"), None, None),
    rule(&["mix.exs"], Some("Elixir"), None, None),
    rule(&["deno.json"], Some("TypeScript"), Some("Deno"), None),
    rule(&["bun.config.js"], Some("TypeScript"), Some("Bun"), None),
];

const PACKAGE_JSON_FRAMEWORKS: &[(&str, &str)] = &[
    ("next", "Next.js"),
    ("react", "React"),
    ("vue", "Vue"),
    ("svelte", "Svelte"),
    ("express", "Express"),
    ("@nestjs/core", "NestJS"),
    ("@angular/core", "Angular"),
    ("fastify", "Fastify"),
];

const TEST_CONFIGS: &[&str] = &[
    "jest.config.js",
    "jest.config.ts",
    "vitest.config.js",
    "vitest.config.ts",
    "cypress.json",
    "cypress.config.js",
    "playwright.config.js",
    "playwright.config.ts",
];

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|existing| existing == value) {
        list.push(value.to_string());
    }
}

/// Top-level entry names, sorted, excluding the metadata directory.
pub async fn list_entries(root: &Path) -> std::io::Result<Vec<String>> {
    let mut dir = tokio::fs::read_dir(root).await?;
    let mut names = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name != METADATA_DIR {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

pub async fn detect_project(root: &Path) -> ProjectInfo {
    let mut project = ProjectInfo {
        project_type: "unknown".to_string(),
        ..Default::default()
    };

    let files = match list_entries(root).await {
        Ok(files) => files,
        Err(err) => {
            project.error = Some(err.to_string());
            return project;
        }
    };
    let file_set: HashSet<&str> = files.iter().map(String::as_str).collect();

    project.package_manager = [
        ("pnpm-lock.yaml", "pnpm"),
        ("yarn.lock", "yarn"),
        ("package-lock.json", "npm"),
        ("bun.lockb", "bun"),
    ]
    .iter()
    .find(|(lockfile, _)| file_set.contains(lockfile))
    .map(|(_, manager)| manager.to_string());

    let package_json = if file_set.contains("package.json") {
        read_package_json(root).await
    } else {
        None
    };

    if file_set.contains("package.json") {
        push_unique(&mut project.languages, "JavaScript");
        if let Some(pkg) = &package_json {
            let has_dep = |name: &str| {
                ["dependencies", "devDependencies"]
                    .iter()
                    .any(|section| pkg.get(section).and_then(|deps| deps.get(name)).is_some())
            };
            if has_dep("typescript") {
                push_unique(&mut project.languages, "TypeScript");
            }
            for (dep, framework) in PACKAGE_JSON_FRAMEWORKS {
                if has_dep(dep) {
                    push_unique(&mut project.frameworks, framework);
                }
            }
        }
    }

    for rule in RULES {
        if !rule.files.iter().any(|file| file_set.contains(file)) {
            continue;
        }
        if let Some(language) = rule.language {
            push_unique(&mut project.languages, language);
        }
        if let Some(framework) = rule.framework {
            push_unique(&mut project.frameworks, framework);
        }
        if let Some(build_tool) = rule.build_tool {
            project.build_tool = Some(build_tool.to_string());
        }
    }
    if root.join("src").join("main.rs").is_file() {
        push_unique(&mut project.languages, "Rust");
    }

    project.has_docker = ["Dockerfile", "docker-compose.yml", "docker-compose.yaml"]
        .iter()
        .any(|file| file_set.contains(file));
    project.has_ci = [
        ".github",
        ".gitlab-ci.yml",
        ".travis.yml",
        "jenkins",
        ".circleci",
        "azure-pipelines.yml",
    ]
    .iter()
    .any(|file| file_set.contains(file));
    project.has_tests = files.iter().any(|file| {
        file.contains("test")
            || file.contains("spec")
            || file.contains("__tests__")
            || TEST_CONFIGS.contains(&file.as_str())
    });

    let has_language = |name: &str| project.languages.iter().any(|l| l == name);
    project.project_type = if !project.frameworks.is_empty() {
        "web-application".to_string()
    } else if has_language("Go") || has_language("Rust") {
        "system-application".to_string()
    } else if has_language("Python") {
        "script/application".to_string()
    } else if file_set.contains("package.json") {
        match &package_json {
            Some(pkg) if pkg.get("main").is_some() || pkg.get("bin").is_some() => {
                "library/cli".to_string()
            }
            _ => "application".to_string(),
        }
    } else {
        "unknown".to_string()
    };

    project
}

async fn read_package_json(root: &Path) -> Option<serde_json::Value> {
    let text = tokio::fs::read_to_string(root.join("package.json")).await.ok()?;
    serde_json::from_str(&text).ok()
}

pub fn location_info(path: &Path) -> LocationInfo {
    let text = path.display().to_string();
    let lower = text.to_lowercase();
    let context = if lower.contains("projects")
        || lower.contains("workspace")
        || lower.contains("dev")
    {
        Some(LocationKind::Development)
    } else if lower.contains("desktop") {
        Some(LocationKind::Desktop)
    } else if lower.contains("documents") {
        Some(LocationKind::Documents)
    } else {
        None
    };

    let file_name = |p: Option<&Path>| {
        p.and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    };

    LocationInfo {
        name: file_name(Some(path)),
        parent: file_name(path.parent()),
        depth: path.components().count().saturating_sub(1),
        path: text,
        context,
    }
}

async fn run_quiet(command: &mut Command, limit: Duration) -> Option<Output> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    match tokio::time::timeout(limit, command.output()).await {
        Ok(Ok(output)) => Some(output),
        _ => None,
    }
}

async fn git(root: &Path, args: &[&str]) -> Option<Output> {
    run_quiet(Command::new("git").args(args).current_dir(root), GIT_TIMEOUT).await
}

pub async fn git_info(root: &Path) -> GitInfo {
    let mut info = GitInfo::default();

    match git(root, &["rev-parse", "--is-inside-work-tree"]).await {
        Some(out) if out.status.success() => info.is_repo = true,
        _ => return info,
    }

    let text = |out: Output| String::from_utf8_lossy(&out.stdout).trim().to_string();

    info.branch = git(root, &["branch", "--show-current"])
        .await
        .filter(|out| out.status.success())
        .map(text);
    info.has_changes = git(root, &["diff", "--quiet"])
        .await
        .map(|out| !out.status.success());
    info.has_untracked = git(root, &["ls-files", "--others", "--exclude-standard"])
        .await
        .filter(|out| out.status.success())
        .map(|out| !text(out).is_empty());
    info.last_commit = git(root, &["log", "-1", "--pretty=format:%h %s"])
        .await
        .filter(|out| out.status.success())
        .map(text)
        .filter(|commit| !commit.is_empty());

    info
}

const IMPORTANT_PATTERNS: &[&str] = &[
    "readme",
    "license",
    "changelog",
    ".env",
    ".gitignore",
    "dockerfile",
    "docker-compose",
    "makefile",
    "justfile",
    "taskfile",
];

pub async fn file_system_context(root: &Path) -> FileSystemContext {
    let mut context = FileSystemContext::default();
    let mut dir = match tokio::fs::read_dir(root).await {
        Ok(dir) => dir,
        Err(err) => {
            context.error = Some(err.to_string());
            return context;
        }
    };

    loop {
        let entry = match dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                context.error = Some(err.to_string());
                break;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if file_type.is_dir() {
            if !name.starts_with('.') && name != "node_modules" {
                context.directories.push(name);
            }
        } else if file_type.is_file() {
            context.file_count += 1;
            let lower = name.to_lowercase();
            if IMPORTANT_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
                context.important_files.push(name);
            }
        }
    }
    context.directories.sort();
    context.important_files.sort();
    context
}

/// Digest over the manifest allow-list and the top-level listing.
///
/// An unreadable root yields a time-salted digest that will not match any
/// stored entry.
pub async fn project_hash(root: &Path) -> String {
    let mut hasher = md5::Context::new();

    for file in MANIFEST_FILES {
        if let Ok(content) = tokio::fs::read_to_string(root.join(file)).await {
            hasher.consume(format!("{}:{}", file, content).as_bytes());
        }
    }

    match list_entries(root).await {
        Ok(entries) => hasher.consume(entries.join(",").as_bytes()),
        Err(err) => {
            debug!("Cannot list {} for hashing: {}", root.display(), err);
            hasher.consume(
                chrono::Utc::now()
                    .timestamp_nanos_opt()
                    .unwrap_or_default()
                    .to_string()
                    .as_bytes(),
            );
        }
    }

    format!("{:x}", hasher.compute())
}
