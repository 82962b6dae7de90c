//! Artifact persistence
//!
//! One `latest` artifact per dashboard, overwritten every run, plus the most
//! recent timestamped snapshots up to a retention cap. The aggregate report
//! lives beside them.

use crate::error::OrchestrationError;
use crate::models::{AggregateReport, JobArtifact};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// Directory name reserved for the aggregate report.
pub const AGGREGATE_DIR: &str = "aggregate";

/// Snapshots kept per dashboard unless configured otherwise.
pub const DEFAULT_SNAPSHOT_RETENTION: usize = 10;

const LATEST_FILE: &str = "latest.json";

#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn write_artifact(&self, artifact: &JobArtifact) -> Result<()>;
    async fn write_report(&self, report: &AggregateReport) -> Result<()>;
    async fn latest_artifact(&self, dashboard: &str) -> Result<Option<JobArtifact>>;
    async fn latest_report(&self) -> Result<Option<AggregateReport>>;
    /// Dashboards with a latest artifact, sorted.
    async fn dashboards(&self) -> Result<Vec<String>>;
}

//
// ================= In-memory =================
//

pub struct InMemoryArtifactStore {
    latest: Arc<RwLock<HashMap<String, JobArtifact>>>,
    snapshots: Arc<RwLock<HashMap<String, VecDeque<JobArtifact>>>>,
    report: Arc<RwLock<Option<AggregateReport>>>,
    retention: usize,
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self {
            latest: Arc::default(),
            snapshots: Arc::default(),
            report: Arc::default(),
            retention: DEFAULT_SNAPSHOT_RETENTION,
        }
    }
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `retention` snapshots per dashboard; zero keeps none.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub async fn snapshot_count(&self, dashboard: &str) -> usize {
        self.snapshots
            .read()
            .await
            .get(dashboard)
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn write_artifact(&self, artifact: &JobArtifact) -> Result<()> {
        if self.retention > 0 {
            let mut snapshots = self.snapshots.write().await;
            let history = snapshots.entry(artifact.dashboard.clone()).or_default();
            history.push_back(artifact.clone());
            while history.len() > self.retention {
                history.pop_front();
            }
        }
        self.latest
            .write()
            .await
            .insert(artifact.dashboard.clone(), artifact.clone());
        Ok(())
    }

    async fn write_report(&self, report: &AggregateReport) -> Result<()> {
        *self.report.write().await = Some(report.clone());
        Ok(())
    }

    async fn latest_artifact(&self, dashboard: &str) -> Result<Option<JobArtifact>> {
        Ok(self.latest.read().await.get(dashboard).cloned())
    }

    async fn latest_report(&self) -> Result<Option<AggregateReport>> {
        Ok(self.report.read().await.clone())
    }

    async fn dashboards(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.latest.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

//
// ================= Files =================
//

/// `<root>/<dashboard>/latest.json` plus `<root>/<dashboard>/<timestamp>.json`.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    root: PathBuf,
    retention: usize,
}

impl FileArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            retention: DEFAULT_SNAPSHOT_RETENTION,
        }
    }

    /// Keep at most `retention` snapshots per directory; zero keeps none.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_for(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(OrchestrationError::ArtifactError(format!(
                "invalid artifact name: {:?}",
                name
            )));
        }
        Ok(self.root.join(name))
    }

    async fn write_pair<T: Serialize + Sync>(
        &self,
        name: &str,
        value: &T,
        generated_at: DateTime<Utc>,
    ) -> Result<()> {
        let dir = self.dir_for(name)?;
        tokio::fs::create_dir_all(&dir).await?;
        let bytes = serde_json::to_vec_pretty(value)?;

        if self.retention > 0 {
            let snapshot = dir.join(format!("{}.json", snapshot_stamp(generated_at)));
            tokio::fs::write(&snapshot, &bytes).await?;
        }

        // Readers must never see a half-written latest.json
        let tmp = dir.join("latest.json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, dir.join(LATEST_FILE)).await?;

        if let Err(e) = self.prune_snapshots(&dir).await {
            warn!(dir = %dir.display(), error = %e, "Snapshot pruning failed");
        }
        Ok(())
    }

    /// Delete the oldest snapshots beyond the retention cap. Stamps sort
    /// chronologically, so file name order is age order.
    async fn prune_snapshots(&self, dir: &Path) -> Result<()> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut snapshots = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name != LATEST_FILE && name.ends_with(".json") {
                snapshots.push(entry.path());
            }
        }
        if snapshots.len() <= self.retention {
            return Ok(());
        }

        snapshots.sort();
        let excess = snapshots.len() - self.retention;
        for path in snapshots.into_iter().take(excess) {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn read_latest<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.dir_for(name)?.join(LATEST_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            OrchestrationError::ArtifactError(format!("corrupt {}: {}", path.display(), e))
        })
    }
}

/// Basic ISO-8601, safe in file names on every platform.
fn snapshot_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

#[async_trait::async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn write_artifact(&self, artifact: &JobArtifact) -> Result<()> {
        if artifact.dashboard == AGGREGATE_DIR {
            return Err(OrchestrationError::ArtifactError(format!(
                "dashboard id {} is reserved",
                AGGREGATE_DIR
            )));
        }
        self.write_pair(&artifact.dashboard, artifact, artifact.generated_at)
            .await
    }

    async fn write_report(&self, report: &AggregateReport) -> Result<()> {
        self.write_pair(AGGREGATE_DIR, report, report.generated_at).await
    }

    async fn latest_artifact(&self, dashboard: &str) -> Result<Option<JobArtifact>> {
        if dashboard == AGGREGATE_DIR {
            return Ok(None);
        }
        self.read_latest(dashboard).await
    }

    async fn latest_report(&self) -> Result<Option<AggregateReport>> {
        self.read_latest(AGGREGATE_DIR).await
    }

    async fn dashboards(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == AGGREGATE_DIR {
                continue;
            }
            if tokio::fs::try_exists(entry.path().join(LATEST_FILE)).await? {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobStatus;
    use crate::synthesis::Synthesizer;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn artifact(dashboard: &str, at: DateTime<Utc>) -> JobArtifact {
        JobArtifact {
            dashboard: dashboard.to_string(),
            generated_at: at,
            metrics: json!({"scores": {"risk_score": 42.0}}),
            ai_analysis: "Volatility contained.".to_string(),
            data_sources: vec!["vix".to_string()],
            status: JobStatus::Completed,
            model: Some("m1".to_string()),
            structured: None,
            errors: vec![],
        }
    }

    #[tokio::test]
    async fn test_file_store_overwrites_latest_and_keeps_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path());
        let first = Utc::now();
        let second = first + chrono::Duration::seconds(60);

        assert_ok!(store.write_artifact(&artifact("the-shield", first)).await);
        let mut newer = artifact("the-shield", second);
        newer.ai_analysis = "Volatility rising.".to_string();
        assert_ok!(store.write_artifact(&newer).await);

        let latest = store.latest_artifact("the-shield").await.unwrap().unwrap();
        assert_eq!(latest.ai_analysis, "Volatility rising.");

        let files = std::fs::read_dir(dir.path().join("the-shield"))
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| name != "latest.json")
            .count();
        assert_eq!(files, 2);

        let raw: serde_json::Value = serde_json::from_slice(
            &std::fs::read(dir.path().join("the-shield/latest.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(raw["dashboard"], "the-shield");
        assert!(raw["generatedAt"].is_string());
    }

    #[tokio::test]
    async fn test_file_store_report_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path());
        assert!(store.dashboards().await.unwrap().is_empty());
        assert!(store.latest_report().await.unwrap().is_none());

        let now = Utc::now();
        let artifacts = vec![artifact("the-shield", now), artifact("the-coin", now)];
        for a in &artifacts {
            store.write_artifact(a).await.unwrap();
        }
        let report = Synthesizer::default().synthesize(&artifacts);
        store.write_report(&report).await.unwrap();

        assert_eq!(store.dashboards().await.unwrap(), vec!["the-coin", "the-shield"]);
        assert_eq!(store.latest_report().await.unwrap(), Some(report));
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path());
        assert_err!(store.write_artifact(&artifact("../escape", Utc::now())).await);
        assert_err!(store.write_artifact(&artifact(AGGREGATE_DIR, Utc::now())).await);
    }

    #[tokio::test]
    async fn test_memory_store_keeps_history() {
        let store = InMemoryArtifactStore::new();
        let now = Utc::now();
        store.write_artifact(&artifact("the-coin", now)).await.unwrap();
        store.write_artifact(&artifact("the-coin", now)).await.unwrap();

        assert_eq!(store.snapshot_count("the-coin").await, 2);
        assert_eq!(store.dashboards().await.unwrap(), vec!["the-coin"]);
        assert!(store.latest_artifact("the-map").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_caps_history() {
        let store = InMemoryArtifactStore::new().with_retention(3);
        let start = Utc::now();
        for minute in 0..5 {
            let at = start + chrono::Duration::minutes(minute);
            assert_ok!(store.write_artifact(&artifact("the-coin", at)).await);
        }
        assert_eq!(store.snapshot_count("the-coin").await, 3);

        let latest_only = InMemoryArtifactStore::new().with_retention(0);
        assert_ok!(latest_only.write_artifact(&artifact("the-coin", start)).await);
        assert_eq!(latest_only.snapshot_count("the-coin").await, 0);
        assert!(latest_only.latest_artifact("the-coin").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_file_store_prunes_oldest_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path()).with_retention(2);
        let start = Utc::now();
        let stamps: Vec<DateTime<Utc>> = (0..4)
            .map(|minute| start + chrono::Duration::minutes(minute))
            .collect();
        for at in &stamps {
            assert_ok!(store.write_artifact(&artifact("the-map", *at)).await);
        }

        let mut kept: Vec<String> = std::fs::read_dir(dir.path().join("the-map"))
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| name != LATEST_FILE)
            .collect();
        kept.sort();
        assert_eq!(
            kept,
            vec![
                format!("{}.json", snapshot_stamp(stamps[2])),
                format!("{}.json", snapshot_stamp(stamps[3])),
            ]
        );
        let latest = store.latest_artifact("the-map").await.unwrap().unwrap();
        assert_eq!(latest.generated_at, stamps[3]);
    }
}
