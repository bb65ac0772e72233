use async_trait::async_trait;
use domain::entities::context::{
    CachedContext, ContextInfo, DynamicContext, PromptContext, StaticContext,
};
use domain::services::ContextSource;
use shared::error::{Error, Result};
use shared::types::METADATA_DIR;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::detector::{self, ToolProbe, WhichProbe};

pub const CACHE_VERSION: &str = "1.0.0";
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Result of a full context load.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub info: ContextInfo,
    pub compact: String,
    /// Whether the static half came from a valid cache entry.
    pub cached: bool,
    pub elapsed: Duration,
}

/// Per-project context cache.
///
/// The static half is stored in `<root>/.mindshell/context-<folder>-<hash>.json`
/// and reused while its version, age and project hash all check out. The
/// dynamic half is recomputed on every call. Cache I/O failures only cost a
/// recompute.
pub struct ContextCache {
    root: PathBuf,
    probe: Arc<dyn ToolProbe>,
    ttl: Duration,
}

impl ContextCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_probe(root, Arc::new(WhichProbe))
    }

    pub fn with_probe(root: impl Into<PathBuf>, probe: Arc<dyn ToolProbe>) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self {
            root,
            probe,
            ttl: CACHE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_path(&self) -> PathBuf {
        let folder = self
            .root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        let digest = format!("{:x}", md5::compute(self.root.display().to_string()));
        self.root
            .join(METADATA_DIR)
            .join(format!("context-{}-{}.json", folder, &digest[..8]))
    }

    /// The stored entry, if it passes version, TTL and hash checks.
    pub async fn load_cached(&self) -> Option<CachedContext> {
        match self.read_valid_entry().await {
            Ok(entry) => entry,
            Err(err) => {
                debug!("Context cache unreadable: {}", err);
                None
            }
        }
    }

    async fn read_valid_entry(&self) -> Result<Option<CachedContext>> {
        let path = self.cache_path();
        if !path.exists() {
            return Ok(None);
        }
        let text = tokio::fs::read_to_string(&path).await?;
        let cached: CachedContext = serde_json::from_str(&text)?;

        if cached.version != CACHE_VERSION {
            debug!("Context cache version mismatch: {}", cached.version);
            return Ok(None);
        }
        let age_ms = chrono::Utc::now().timestamp_millis() - cached.timestamp;
        if age_ms < 0 || age_ms as u128 >= self.ttl.as_millis() {
            debug!("Context cache expired ({} ms old)", age_ms);
            return Ok(None);
        }
        let current = detector::project_hash(&self.root).await;
        if cached.project_hash != current {
            debug!("Context cache hash mismatch");
            return Ok(None);
        }
        Ok(Some(cached))
    }

    /// Persist the entry off the async runtime; see [`write_entry`].
    async fn save(&self, static_context: &StaticContext, project_hash: String) -> Result<()> {
        let path = self.cache_path();
        let entry = CachedContext {
            version: CACHE_VERSION.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            project_hash,
            static_context: static_context.clone(),
        };
        tokio::task::spawn_blocking(move || write_entry(&path, &entry))
            .await
            .map_err(|err| Error::Cache(format!("cache writer failed: {}", err)))?
    }

    async fn compute_static(&self) -> StaticContext {
        let (system, tools, project) = tokio::join!(
            detector::system_info(),
            detector::detect_tools(self.probe.as_ref()),
            detector::detect_project(&self.root)
        );
        StaticContext {
            system,
            tools,
            project,
        }
    }

    /// Static context plus whether it was served from cache.
    pub async fn static_context(&self) -> (StaticContext, bool) {
        if let Some(cached) = self.load_cached().await {
            debug!("Context cache hit: {}", self.cache_path().display());
            return (cached.static_context, true);
        }

        info!("Generating fresh context for {}", self.root.display());
        let fresh = self.compute_static().await;
        let hash = detector::project_hash(&self.root).await;
        if let Err(err) = self.save(&fresh, hash).await {
            warn!("Failed to save context cache: {}", err);
        }
        (fresh, false)
    }

    pub async fn dynamic_context(&self) -> DynamicContext {
        let (git, files) = tokio::join!(
            detector::git_info(&self.root),
            detector::file_system_context(&self.root)
        );
        DynamicContext {
            location: detector::location_info(&self.root),
            git,
            files,
        }
    }

    pub async fn detect(&self) -> ContextInfo {
        let ((static_context, _), dynamic) =
            tokio::join!(self.static_context(), self.dynamic_context());
        ContextInfo::merge(static_context, dynamic)
    }

    pub async fn load(&self) -> ContextSnapshot {
        let started = Instant::now();
        let ((static_context, cached), dynamic) =
            tokio::join!(self.static_context(), self.dynamic_context());
        let info = ContextInfo::merge(static_context, dynamic);
        ContextSnapshot {
            compact: info.compact(),
            info,
            cached,
            elapsed: started.elapsed(),
        }
    }

    /// One-line status that never triggers tool probing.
    pub async fn quick_status(&self) -> String {
        let cached = self.load_cached().await;
        let location = detector::location_info(&self.root);
        let git = detector::git_info(&self.root).await;

        let Some(cached) = cached else {
            return format!(
                "DIR: {} | git:{} {}",
                location.name,
                git.branch.as_deref().unwrap_or("no-git"),
                if git.has_changes == Some(true) {
                    "modified"
                } else {
                    "clean"
                }
            );
        };

        let system = &cached.static_context.system;
        let project = &cached.static_context.project;
        let mut parts = vec![format!("SYS: {}/{}", system.os, system.arch)];
        if !project.languages.is_empty() {
            parts.push(format!("LANG: {}", project.languages.join(", ")));
        }
        if let Some(pm) = &project.package_manager {
            parts.push(format!("PKG: {}", pm));
        }
        parts.push(format!("DIR: {}", location.name));
        if let Some(status) = git.status_fragment() {
            parts.push(status);
        }
        parts.join(" | ")
    }

    /// Drop the stored entry and regenerate it.
    pub async fn refresh(&self) -> Result<StaticContext> {
        let path = self.cache_path();
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
        let (fresh, _) = self.static_context().await;
        info!("Context cache refreshed");
        Ok(fresh)
    }
}

/// Write-to-temp then rename, so readers never see a partial file.
fn write_entry(path: &Path, entry: &CachedContext) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Cache("cache path has no parent".to_string()))?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(serde_json::to_string_pretty(entry)?.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|err| Error::Cache(format!("rename failed: {}", err)))?;
    Ok(())
}

#[async_trait]
impl ContextSource for ContextCache {
    async fn prompt_context(&self) -> PromptContext {
        PromptContext::from(&self.detect().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProbe(AtomicUsize);

    #[async_trait]
    impl ToolProbe for CountingProbe {
        async fn available(&self, tool: &str) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            tool == "git"
        }
    }

    fn setup() -> (tempfile::TempDir, Arc<CountingProbe>, ContextCache) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"demo\"").unwrap();
        let probe = Arc::new(CountingProbe::default());
        let cache = ContextCache::with_probe(dir.path(), probe.clone());
        (dir, probe, cache)
    }

    #[tokio::test]
    async fn second_load_hits_cache_without_probing() {
        let (_dir, probe, cache) = setup();

        let first = cache.load().await;
        let probes = probe.0.load(Ordering::SeqCst);
        assert!(!first.cached);
        assert!(probes > 0);
        assert!(cache.cache_path().exists());

        let second = cache.load().await;
        assert!(second.cached);
        assert_eq!(probe.0.load(Ordering::SeqCst), probes);
        assert_eq!(first.info.project, second.info.project);
        assert_eq!(first.info.tools, second.info.tools);
    }

    #[tokio::test]
    async fn manifest_change_invalidates() {
        let (dir, probe, cache) = setup();
        cache.load().await;
        let probes = probe.0.load(Ordering::SeqCst);

        fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"renamed\"").unwrap();
        let again = cache.load().await;
        assert!(!again.cached);
        assert_eq!(probe.0.load(Ordering::SeqCst), probes * 2);
    }

    #[tokio::test]
    async fn expired_entry_is_ignored() {
        let (_dir, _probe, cache) = setup();
        let cache = cache.with_ttl(Duration::from_millis(0));
        cache.load().await;
        assert!(cache.load_cached().await.is_none());
    }

    #[tokio::test]
    async fn version_mismatch_is_ignored() {
        let (_dir, _probe, cache) = setup();
        cache.load().await;

        let path = cache.cache_path();
        let mut json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        json["version"] = serde_json::json!("0.9.0");
        fs::write(&path, json.to_string()).unwrap();

        assert!(cache.load_cached().await.is_none());
    }

    #[tokio::test]
    async fn corrupt_cache_falls_back_to_recompute() {
        let (_dir, _probe, cache) = setup();
        let path = cache.cache_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let snapshot = cache.load().await;
        assert!(!snapshot.cached);
        assert!(cache.load_cached().await.is_some());
    }

    #[tokio::test]
    async fn cache_file_layout() {
        let (dir, _probe, cache) = setup();
        cache.load().await;

        let path = cache.cache_path();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let folder = dir.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(&format!("context-{}-", folder)));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["version"], CACHE_VERSION);
        assert!(json["staticc"]["project"]["languages"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("Rust")));
    }

    #[tokio::test]
    async fn refresh_regenerates() {
        let (_dir, probe, cache) = setup();
        cache.load().await;
        let probes = probe.0.load(Ordering::SeqCst);

        cache.refresh().await.unwrap();
        assert_eq!(probe.0.load(Ordering::SeqCst), probes * 2);
        assert!(cache.load_cached().await.is_some());
    }

    #[tokio::test]
    async fn quick_status_without_cache_is_minimal() {
        let (_dir, probe, cache) = setup();
        let status = cache.quick_status().await;
        assert!(status.starts_with("DIR: "));
        assert_eq!(probe.0.load(Ordering::SeqCst), 0);

        cache.load().await;
        let status = cache.quick_status().await;
        assert!(status.starts_with("SYS: "));
        assert!(status.contains("LANG: Rust"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_writers_leave_one_complete_entry() {
        let (dir, _probe, first) = setup();
        let second = ContextCache::with_probe(dir.path(), Arc::new(CountingProbe::default()));

        let (a, b) = tokio::join!(first.load(), second.load());
        assert!(!a.cached || !b.cached);

        let entries: Vec<_> = fs::read_dir(dir.path().join(METADATA_DIR))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(entries, vec![first.cache_path()]);
        assert!(first.load_cached().await.is_some());
    }
}
