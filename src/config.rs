//! Orchestrator configuration
//!
//! Everything the core needs is supplied here rather than hardcoded: fetch
//! policy, TTLs, model chains, waves, dashboards and synthesis rules. Each
//! field has a documented default, so an empty JSON object is a valid file.

use crate::artifacts::DEFAULT_SNAPSHOT_RETENTION;
use crate::error::OrchestrationError;
use crate::llm::{ModelChain, TaskType};
use crate::sources::{SourceKind, SourceRequest};
use crate::synthesis::SynthesisConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retry policy for upstream sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    /// Total attempts per request. Default 3.
    pub retries: u32,
    /// Per-attempt timeout. Default 10 000 ms.
    pub timeout_ms: u64,
    /// Backoff before the second attempt, doubled each time. Default 1 000 ms.
    pub base_backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout_ms: 10_000,
            base_backoff_ms: 1_000,
        }
    }
}

/// Freshness per source class, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtlTable {
    /// Default 30 min.
    pub news_ms: u64,
    /// Spot quotes. Default 1 min.
    pub quotes_ms: u64,
    /// Default 5 min.
    pub sentiment_ms: u64,
    /// Default 15 min.
    pub treasury_ms: u64,
    /// Default 15 min.
    pub economic_ms: u64,
    /// Default 1 h.
    pub research_ms: u64,
    /// Model output. Default 1 h.
    pub analysis_ms: u64,
}

impl Default for TtlTable {
    fn default() -> Self {
        Self {
            news_ms: 30 * 60_000,
            quotes_ms: 60_000,
            sentiment_ms: 5 * 60_000,
            treasury_ms: 15 * 60_000,
            economic_ms: 15 * 60_000,
            research_ms: 60 * 60_000,
            analysis_ms: 60 * 60_000,
        }
    }
}

impl TtlTable {
    pub fn for_source(&self, kind: SourceKind) -> Duration {
        let ms = match kind {
            SourceKind::News => self.news_ms,
            SourceKind::Crypto => self.quotes_ms,
            SourceKind::Sentiment => self.sentiment_ms,
            SourceKind::Treasury => self.treasury_ms,
            SourceKind::Economic => self.economic_ms,
            SourceKind::Research => self.research_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn analysis(&self) -> Duration {
        Duration::from_millis(self.analysis_ms)
    }

    fn entries(&self) -> [(&'static str, u64); 7] {
        [
            ("news_ms", self.news_ms),
            ("quotes_ms", self.quotes_ms),
            ("sentiment_ms", self.sentiment_ms),
            ("treasury_ms", self.treasury_ms),
            ("economic_ms", self.economic_ms),
            ("research_ms", self.research_ms),
            ("analysis_ms", self.analysis_ms),
        ]
    }
}

/// Chat-completions backend and per-task model chains.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Default OpenRouter chat completions.
    pub endpoint: String,
    /// Logical credential name. Default `OPENROUTER`.
    pub credential: String,
    /// Timeout for one model call. Default 60 000 ms.
    pub timeout_ms: u64,
    pub referer: String,
    pub title: String,
    pub chains: BTreeMap<TaskType, ModelChain>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let standard = ModelChain::new(
            "meta-llama/llama-3.3-70b-instruct:free",
            &[
                "mistralai/mistral-small-3.1-24b-instruct:free",
                "google/gemma-3-4b-it:free",
            ],
        );
        let outlook = ModelChain::new(
            "openai/gpt-oss-120b:free",
            &[
                "meta-llama/llama-3.3-70b-instruct:free",
                "mistralai/mistral-small-3.1-24b-instruct:free",
            ],
        );

        Self {
            endpoint: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            credential: "OPENROUTER".to_string(),
            timeout_ms: 60_000,
            referer: "https://alpha-loop.app".to_string(),
            title: "Alpha Loop".to_string(),
            chains: BTreeMap::from([
                (TaskType::MarketAnalysis, standard.clone()),
                (TaskType::CrashAnalysis, standard.clone()),
                (TaskType::ResearchBriefing, standard),
                (TaskType::Outlook, outlook),
            ]),
        }
    }
}

/// Ordered waves of dashboard ids and the pause between them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub waves: Vec<Vec<String>>,
    /// Default 5 000 ms.
    pub wave_delay_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        let wave = |ids: &[&str]| ids.iter().map(|id| id.to_string()).collect::<Vec<_>>();
        Self {
            waves: vec![
                wave(&["the-shield", "the-coin"]),
                wave(&["the-map", "the-frontier"]),
                wave(&["the-commander"]),
            ],
            wave_delay_ms: 5_000,
        }
    }
}

/// One dashboard job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardConfig {
    pub id: String,
    pub task: TaskType,
    #[serde(default)]
    pub sources: Vec<SourceRequest>,
    /// Dashboards from earlier waves whose results feed this one's payload.
    #[serde(default)]
    pub context_from: Vec<String>,
}

pub fn default_dashboards() -> Vec<DashboardConfig> {
    use SourceKind::*;
    let fred = |series: &str, label: &str| {
        SourceRequest::new(Economic)
            .param("series_id", series)
            .param("limit", "30")
            .labeled(label)
    };

    vec![
        DashboardConfig {
            id: "the-shield".to_string(),
            task: TaskType::CrashAnalysis,
            sources: vec![
                fred("VIXCLS", "vix"),
                fred("DGS10", "treasury_10y"),
                SourceRequest::new(Treasury)
                    .param("security_term", "10-Year")
                    .param("security_type", "Note"),
            ],
            context_from: vec![],
        },
        DashboardConfig {
            id: "the-coin".to_string(),
            task: TaskType::MarketAnalysis,
            sources: vec![
                SourceRequest::new(Crypto).param("ids", "bitcoin,ethereum,solana"),
                SourceRequest::new(Sentiment),
                SourceRequest::new(News)
                    .param("q", "bitcoin OR crypto")
                    .param("page_size", "10"),
            ],
            context_from: vec![],
        },
        DashboardConfig {
            id: "the-map".to_string(),
            task: TaskType::MarketAnalysis,
            sources: vec![
                fred("DGS10", "treasury_10y"),
                fred("FEDFUNDS", "fed_funds"),
                fred("DTWEXBGS", "dollar_index"),
                SourceRequest::new(News)
                    .param("q", "federal reserve")
                    .param("page_size", "10"),
            ],
            context_from: vec![],
        },
        DashboardConfig {
            id: "the-frontier".to_string(),
            task: TaskType::ResearchBriefing,
            sources: vec![
                SourceRequest::new(Research)
                    .param("query", "artificial intelligence")
                    .param("hits", "20"),
                SourceRequest::new(News)
                    .param("q", "AI breakthrough")
                    .param("page_size", "10"),
            ],
            context_from: vec![],
        },
        DashboardConfig {
            id: "the-commander".to_string(),
            task: TaskType::Outlook,
            sources: vec![],
            context_from: vec![
                "the-shield".to_string(),
                "the-coin".to_string(),
                "the-map".to_string(),
                "the-frontier".to_string(),
            ],
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub fetch: FetchConfig,
    pub ttl: TtlTable,
    pub models: ModelConfig,
    pub schedule: ScheduleConfig,
    pub dashboards: Vec<DashboardConfig>,
    pub synthesis: SynthesisConfig,
    /// Max network calls per source kind per run. Default: news 10,
    /// economic 20, others unlimited.
    pub source_budgets: BTreeMap<SourceKind, u32>,
    /// Artifact root. Default `data`.
    pub output_dir: PathBuf,
    /// Timestamped snapshots kept per dashboard beside `latest.json`.
    /// Default 10; zero keeps only the latest.
    pub snapshot_retention: usize,
    /// Durable cache directory; memory-only when absent.
    pub cache_dir: Option<PathBuf>,
    /// Skip every model call. Default false.
    pub disable_ai: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            ttl: TtlTable::default(),
            models: ModelConfig::default(),
            schedule: ScheduleConfig::default(),
            dashboards: default_dashboards(),
            synthesis: SynthesisConfig::default(),
            source_budgets: BTreeMap::from([(SourceKind::News, 10), (SourceKind::Economic, 20)]),
            output_dir: PathBuf::from("data"),
            snapshot_retention: DEFAULT_SNAPSHOT_RETENTION,
            cache_dir: None,
            disable_ai: false,
        }
    }
}

impl OrchestratorConfig {
    /// `.env`, then the JSON file named by `ALPHA_LOOP_CONFIG`, then
    /// `ALPHA_LOOP_*` overrides, then validation.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match std::env::var("ALPHA_LOOP_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OrchestrationError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            OrchestrationError::config(format!("invalid config {}: {}", path.display(), e))
        })
    }

    /// Apply `ALPHA_LOOP_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(dir) = get("ALPHA_LOOP_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("ALPHA_LOOP_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(flag) = get("ALPHA_LOOP_DISABLE_AI") {
            self.disable_ai = parse_flag(&flag).ok_or_else(|| {
                OrchestrationError::config(format!("ALPHA_LOOP_DISABLE_AI: not a boolean: {}", flag))
            })?;
        }
        if let Some(delay) = get("ALPHA_LOOP_WAVE_DELAY_MS") {
            self.schedule.wave_delay_ms = delay.parse().map_err(|_| {
                OrchestrationError::config(format!("ALPHA_LOOP_WAVE_DELAY_MS: not a number: {}", delay))
            })?;
        }
        Ok(())
    }

    pub fn dashboard(&self, id: &str) -> Option<&DashboardConfig> {
        self.dashboards.iter().find(|d| d.id == id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.retries == 0 {
            return Err(OrchestrationError::config("fetch.retries must be at least 1"));
        }
        if self.fetch.timeout_ms == 0 {
            return Err(OrchestrationError::config("fetch.timeout_ms must be positive"));
        }
        if let Some((name, _)) = self.ttl.entries().iter().find(|(_, ms)| *ms == 0) {
            return Err(OrchestrationError::config(format!("ttl.{} must be positive", name)));
        }

        if self.models.endpoint.trim().is_empty() {
            return Err(OrchestrationError::config("models.endpoint is empty"));
        }
        if self.models.timeout_ms == 0 {
            return Err(OrchestrationError::config("models.timeout_ms must be positive"));
        }
        for (task, chain) in &self.models.chains {
            if chain.is_empty() {
                return Err(OrchestrationError::config(format!(
                    "task {} has no primary model",
                    task
                )));
            }
        }

        let mut ids = HashSet::new();
        for dashboard in &self.dashboards {
            if !ids.insert(dashboard.id.as_str()) {
                return Err(OrchestrationError::config(format!(
                    "dashboard {} is declared twice",
                    dashboard.id
                )));
            }
            let mut labels = HashSet::new();
            if let Some(source) = dashboard.sources.iter().find(|s| !labels.insert(s.label())) {
                return Err(OrchestrationError::config(format!(
                    "dashboard {} has two sources labeled {}; give each a distinct label",
                    dashboard.id,
                    source.label()
                )));
            }
            if !self.models.chains.contains_key(&dashboard.task) {
                return Err(OrchestrationError::config(format!(
                    "dashboard {} uses task {} which has no model chain",
                    dashboard.id, dashboard.task
                )));
            }
        }

        let mut wave_of: HashMap<&str, usize> = HashMap::new();
        for (index, wave) in self.schedule.waves.iter().enumerate() {
            if wave.is_empty() {
                return Err(OrchestrationError::config(format!("wave {} is empty", index)));
            }
            for id in wave {
                if !ids.contains(id.as_str()) {
                    return Err(OrchestrationError::config(format!(
                        "wave {} names unknown dashboard {}",
                        index, id
                    )));
                }
                if wave_of.insert(id.as_str(), index).is_some() {
                    return Err(OrchestrationError::config(format!(
                        "dashboard {} is scheduled more than once",
                        id
                    )));
                }
            }
        }
        for dashboard in &self.dashboards {
            let wave = wave_of.get(dashboard.id.as_str()).ok_or_else(|| {
                OrchestrationError::config(format!("dashboard {} is not scheduled", dashboard.id))
            })?;
            for dependency in &dashboard.context_from {
                match wave_of.get(dependency.as_str()) {
                    Some(dep_wave) if dep_wave < wave => {}
                    _ => {
                        return Err(OrchestrationError::config(format!(
                            "dashboard {} takes context from {} which does not run in an earlier wave",
                            dashboard.id, dependency
                        )))
                    }
                }
            }
        }

        self.synthesis.validate()
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
