//! Job orchestration
//!
//! A run walks the wave schedule: every job in a wave fetches its sources,
//! and once all of them are in, each asks the model router for an analysis
//! and writes its artifact. The next wave starts after the configured pause. Jobs never fail the run; a
//! broken job leaves a `partially_failed` artifact behind. Once every wave is
//! done the synthesizer turns the run's artifacts into the aggregate report.

pub mod metrics;
pub mod schedule;

pub use schedule::{JobRun, WaveSchedule};

use crate::artifacts::{ArtifactStore, FileArtifactStore};
use crate::cache::{FileBackend, SystemClock, TtlCache};
use crate::config::{DashboardConfig, OrchestratorConfig};
use crate::credentials::{CredentialProvider, EnvCredentials};
use crate::error::OrchestrationError;
use crate::events::{EventKind, EventSink};
use crate::fetcher::{HttpTransport, ReqwestTransport, ResilientFetcher, RetryPolicy};
use crate::llm::{AnalyzeOptions, ModelRouter};
use crate::models::{
    AggregateReport, FetchResult, JobArtifact, JobOutcome, JobStatus, RunStatus, RunSummary,
    UNAVAILABLE_ANALYSIS,
};
use crate::sources::{AdapterRegistry, SourceService};
use crate::synthesis::Synthesizer;
use crate::Result;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Artifacts finished so far in the current run, by dashboard id.
type Finished = RwLock<HashMap<String, JobArtifact>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RunOptions {
    /// Restrict the run to these dashboards. Empty means all.
    #[serde(default)]
    pub only: Vec<String>,
    /// Skip every model call for this run.
    #[serde(default)]
    pub disable_ai: bool,
}

pub struct JobOrchestrator {
    core: Arc<Core>,
    cache: Arc<TtlCache>,
    run_lock: Mutex<()>,
}

/// Everything a job task needs; shared by all spawned jobs.
struct Core {
    dashboards: HashMap<String, DashboardConfig>,
    schedule: WaveSchedule,
    sources: SourceService,
    router: ModelRouter,
    store: Arc<dyn ArtifactStore>,
    synthesizer: Synthesizer,
    events: Arc<dyn EventSink>,
}

impl JobOrchestrator {
    /// Production wiring: reqwest transport, environment credentials,
    /// artifacts under `output_dir`, file cache when `cache_dir` is set.
    pub fn from_config(config: &OrchestratorConfig, events: Arc<dyn EventSink>) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(ReqwestTransport::new()?);
        let cache = match &config.cache_dir {
            Some(dir) => TtlCache::new(Arc::new(FileBackend::new(dir)?), Arc::new(SystemClock)),
            None => TtlCache::in_memory(),
        }
        .with_events(events.clone());
        let store = Arc::new(
            FileArtifactStore::new(&config.output_dir).with_retention(config.snapshot_retention),
        );

        Ok(Self::assemble(
            config,
            transport,
            Arc::new(cache),
            Arc::new(EnvCredentials::new()),
            store,
            events,
        ))
    }

    /// Wire the pipeline from explicit parts. `config` is assumed valid.
    pub fn assemble(
        config: &OrchestratorConfig,
        transport: Arc<dyn HttpTransport>,
        cache: Arc<TtlCache>,
        credentials: Arc<dyn CredentialProvider>,
        store: Arc<dyn ArtifactStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let fetcher = Arc::new(ResilientFetcher::new(
            transport,
            RetryPolicy::from(&config.fetch),
            events.clone(),
        ));
        let sources = SourceService::new(
            AdapterRegistry::with_defaults(),
            fetcher.clone(),
            cache.clone(),
            credentials.clone(),
            config.ttl.clone(),
        )
        .with_budgets(config.source_budgets.clone())
        .with_events(events.clone());
        let router = ModelRouter::new(
            fetcher,
            cache.clone(),
            credentials,
            config.models.clone(),
            config.ttl.analysis(),
        )
        .with_events(events.clone())
        .with_ai_disabled(config.disable_ai);

        let dashboards = config
            .dashboards
            .iter()
            .map(|d| (d.id.clone(), d.clone()))
            .collect();

        Self {
            core: Arc::new(Core {
                dashboards,
                schedule: WaveSchedule::from_config(&config.schedule),
                sources,
                router,
                store,
                synthesizer: Synthesizer::new(config.synthesis.clone()),
                events,
            }),
            cache,
            run_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> Arc<dyn ArtifactStore> {
        self.core.store.clone()
    }

    pub fn cache(&self) -> Arc<TtlCache> {
        self.cache.clone()
    }

    pub fn schedule(&self) -> &WaveSchedule {
        &self.core.schedule
    }

    /// Scheduled dashboard ids in execution order.
    pub fn dashboards(&self) -> Vec<String> {
        self.core.schedule.job_ids()
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// One full pass over the schedule. Fails only before any job starts:
    /// when another run holds the lock or `only` names an unknown dashboard.
    pub async fn run(&self, options: RunOptions) -> Result<RunSummary> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| OrchestrationError::JobError("a run is already in progress".to_string()))?;

        let schedule = if options.only.is_empty() {
            self.core.schedule.clone()
        } else {
            if let Some(unknown) = options.only.iter().find(|id| !self.core.schedule.contains(id)) {
                return Err(OrchestrationError::config(format!(
                    "unknown dashboard: {}",
                    unknown
                )));
            }
            self.core.schedule.filtered(&options.only)
        };

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        self.core.sources.reset_budgets();

        let finished: Arc<Finished> = Arc::default();
        let disable_ai = options.disable_ai;
        let runs = schedule
            .execute(
                self.core.events.as_ref(),
                |_, id| {
                    let core = self.core.clone();
                    let id = id.to_string();
                    async move { core.fetch_job(&id).await }
                },
                |wave, _, mut gathered| {
                    // Reported at the wave barrier, before any model call
                    gathered.tracker.advance(JobStatus::Analyzing);
                    let core = self.core.clone();
                    let finished = finished.clone();
                    async move { core.analyze_job(gathered, wave, disable_ai, &finished).await }
                },
            )
            .await;

        let mut jobs = Vec::with_capacity(runs.len());
        for run in runs {
            match run.outcome {
                Ok(outcome) => jobs.push(outcome),
                Err(reason) => {
                    let artifact = crashed_artifact(&run.dashboard, &reason);
                    let mut errors = vec![reason];
                    if let Err(e) = self.core.persist(&artifact).await {
                        errors.push(e);
                    }
                    finished.write().await.insert(run.dashboard.clone(), artifact);
                    jobs.push(JobOutcome {
                        dashboard: run.dashboard,
                        wave: run.wave,
                        status: JobStatus::PartiallyFailed,
                        degraded_sources: vec![],
                        errors,
                    });
                }
            }
        }

        let report = self.core.report(&finished).await;

        let status = if jobs.iter().all(|job| job.status == JobStatus::Completed) {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithFailures
        };
        let failed = jobs
            .iter()
            .filter(|job| job.status != JobStatus::Completed)
            .count();
        self.core.events.on_event(
            EventKind::RunCompleted,
            json!({
                "run_id": run_id.to_string(),
                "status": status,
                "jobs": jobs.len(),
                "failed": failed,
                "net_signal": report.net_signal.signal,
                "action": report.decision_tree.action,
            }),
        );

        Ok(RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            status,
            jobs,
            report,
        })
    }
}

impl Core {
    /// First phase of a job: pull every source. Degraded results are kept;
    /// the analysis phase decides what they mean for the job.
    async fn fetch_job(&self, id: &str) -> Gathered {
        let mut tracker = Tracker::new(id, self.events.clone());
        let results = match self.dashboards.get(id) {
            Some(dashboard) => {
                tracker.advance(JobStatus::Fetching);
                self.sources.gather(&dashboard.sources).await
            }
            None => Vec::new(),
        };
        Gathered { tracker, results }
    }

    /// Second phase, started once the whole wave has fetched: analyze,
    /// persist and record the artifact.
    async fn analyze_job(
        &self,
        gathered: Gathered,
        wave: usize,
        disable_ai: bool,
        finished: &Finished,
    ) -> JobOutcome {
        let Gathered { mut tracker, results } = gathered;
        let id = tracker.dashboard.clone();

        let Some(dashboard) = self.dashboards.get(&id) else {
            tracker.advance(JobStatus::PartiallyFailed);
            return JobOutcome {
                errors: vec![format!("no dashboard configured for {}", id)],
                dashboard: id,
                wave,
                status: JobStatus::PartiallyFailed,
                degraded_sources: vec![],
            };
        };

        let mut errors = Vec::new();
        let mut failed = false;

        let degraded_sources: Vec<String> = results
            .iter()
            .filter(|r| r.is_degraded())
            .map(|r| r.source.clone())
            .collect();
        for result in &results {
            if let Some(error) = &result.error {
                errors.push(format!("{}: {}", result.source, error));
            }
        }
        if !results.is_empty() && degraded_sources.len() == results.len() {
            failed = true;
        }
        let metrics = metrics::build_metrics(&dashboard.sources, &results);

        let payload = json!({
            "dashboard": id,
            "scores": metrics["scores"],
            "sources": metrics["sources"],
            "context": self.context_for(dashboard, finished).await,
        });
        let options = AnalyzeOptions {
            disable_ai,
            bypass_cache: false,
        };
        let ai_off = disable_ai || self.router.ai_disabled();

        let (analysis, structured) = if dashboard.task.expects_json() {
            let (analysis, parsed) = self
                .router
                .analyze_structured(dashboard.task, &payload, options)
                .await;
            match parsed {
                Ok(value) => (analysis, Some(value)),
                Err(e) => {
                    // Model exhaustion is reported below with the analysis
                    if !analysis.is_degraded() {
                        errors.push(e.to_string());
                        failed = true;
                    }
                    (analysis, None)
                }
            }
        } else {
            let analysis = self.router.analyze(dashboard.task, &payload, options).await;
            (analysis, None)
        };
        if let Some(error) = &analysis.error {
            if !ai_off {
                errors.push(error.clone());
                failed = true;
            }
        }

        // Structured outlooks carry their own prose summary
        let ai_analysis = structured
            .as_ref()
            .and_then(|value| value.get("summary"))
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or(analysis.content);

        let mut artifact = JobArtifact {
            dashboard: id.clone(),
            generated_at: Utc::now(),
            metrics,
            ai_analysis,
            data_sources: dashboard.sources.iter().map(|s| s.label().to_string()).collect(),
            status: if failed {
                JobStatus::PartiallyFailed
            } else {
                JobStatus::Completed
            },
            model: analysis.model,
            structured,
            errors: errors.clone(),
        };

        if let Err(e) = self.persist(&artifact).await {
            errors.push(e);
            artifact.status = JobStatus::PartiallyFailed;
        }
        tracker.advance(artifact.status);

        let status = artifact.status;
        finished.write().await.insert(id.clone(), artifact);

        JobOutcome {
            dashboard: id,
            wave,
            status,
            degraded_sources,
            errors,
        }
    }

    /// Results of `context_from` dashboards: this run's if they ran,
    /// otherwise the latest stored artifact.
    async fn context_for(&self, dashboard: &DashboardConfig, finished: &Finished) -> Value {
        if dashboard.context_from.is_empty() {
            return Value::Null;
        }

        let finished = finished.read().await;
        let mut context = Map::new();
        for id in &dashboard.context_from {
            let entry = match finished.get(id) {
                Some(artifact) => metrics::context_entry(artifact),
                None => match self.store.latest_artifact(id).await {
                    Ok(Some(artifact)) => metrics::context_entry(&artifact),
                    _ => json!({ "status": "unavailable" }),
                },
            };
            context.insert(id.clone(), entry);
        }
        Value::Object(context)
    }

    async fn persist(&self, artifact: &JobArtifact) -> std::result::Result<(), String> {
        match self.store.write_artifact(artifact).await {
            Ok(()) => {
                self.events.on_event(
                    EventKind::ArtifactWritten,
                    json!({ "dashboard": artifact.dashboard, "status": artifact.status }),
                );
                Ok(())
            }
            Err(e) => {
                self.events.on_event(
                    EventKind::ArtifactFailed,
                    json!({ "dashboard": artifact.dashboard, "error": e.to_string() }),
                );
                Err(format!("artifact write failed: {}", e))
            }
        }
    }

    /// Synthesize over this run's artifacts, filling domains whose dashboard
    /// did not run with the latest stored artifact, then persist the report.
    async fn report(&self, finished: &Finished) -> AggregateReport {
        let finished = finished.read().await;
        let mut artifacts: Vec<JobArtifact> = finished.values().cloned().collect();
        for binding in &self.synthesizer.config().domains {
            if finished.contains_key(&binding.dashboard) {
                continue;
            }
            if let Ok(Some(previous)) = self.store.latest_artifact(&binding.dashboard).await {
                artifacts.push(previous);
            }
        }

        let report = self.synthesizer.synthesize(&artifacts);
        match self.store.write_report(&report).await {
            Ok(()) => self.events.on_event(
                EventKind::ArtifactWritten,
                json!({ "report": "aggregate", "net_signal": report.net_signal.signal }),
            ),
            Err(e) => self.events.on_event(
                EventKind::ArtifactFailed,
                json!({ "report": "aggregate", "error": e.to_string() }),
            ),
        }
        report
    }
}

/// A job that has finished fetching and waits for its wave's barrier.
struct Gathered {
    tracker: Tracker,
    results: Vec<FetchResult>,
}

/// Walks one job through its states, reporting each transition.
struct Tracker {
    dashboard: String,
    status: JobStatus,
    events: Arc<dyn EventSink>,
}

impl Tracker {
    fn new(dashboard: &str, events: Arc<dyn EventSink>) -> Self {
        Self {
            dashboard: dashboard.to_string(),
            status: JobStatus::Pending,
            events,
        }
    }

    fn advance(&mut self, next: JobStatus) {
        if !self.status.can_transition_to(next) {
            return;
        }
        self.events.on_event(
            EventKind::JobTransition,
            json!({ "dashboard": self.dashboard, "from": self.status, "to": next }),
        );
        self.status = next;
    }
}

/// Placeholder artifact for a job whose task died.
fn crashed_artifact(dashboard: &str, reason: &str) -> JobArtifact {
    JobArtifact {
        dashboard: dashboard.to_string(),
        generated_at: Utc::now(),
        metrics: json!({ "sources": {}, "source_status": {}, "scores": {} }),
        ai_analysis: UNAVAILABLE_ANALYSIS.to_string(),
        data_sources: vec![],
        status: JobStatus::PartiallyFailed,
        model: None,
        structured: None,
        errors: vec![reason.to_string()],
    }
}
