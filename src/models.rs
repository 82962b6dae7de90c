//! Core data models shared across the fetch, analysis and synthesis layers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Text shown whenever no model produced usable commentary.
pub const UNAVAILABLE_ANALYSIS: &str =
    "AI analysis is temporarily unavailable. The metrics on this dashboard are current; \
     commentary will return on the next scheduled run.";

//
// ================= Enums =================
//

/// Analysis domain used by the conflict matrix.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Risk,
    Crypto,
    Macro,
    Tech,
}

impl Domain {
    pub const ALL: [Domain; 4] = [Domain::Risk, Domain::Crypto, Domain::Macro, Domain::Tech];
}

/// Categorical label attached to a domain or to the net signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Defensive,
    Cautious,
    Calm,
    Bullish,
    Bearish,
    Neutral,
    Positive,
    Negative,
    Unknown,
}

/// Which way a signal leans, used for agreement counting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Constructive,
    Neutral,
    Adverse,
    Unknown,
}

impl Signal {
    pub fn direction(&self) -> Direction {
        match self {
            Signal::Calm | Signal::Bullish | Signal::Positive => Direction::Constructive,
            Signal::Cautious | Signal::Neutral => Direction::Neutral,
            Signal::Defensive | Signal::Bearish | Signal::Negative => Direction::Adverse,
            Signal::Unknown => Direction::Unknown,
        }
    }

    pub fn color(&self) -> &'static str {
        match self.direction() {
            Direction::Constructive => "#28a745",
            Direction::Neutral => "#ffc107",
            Direction::Adverse => "#dc3545",
            Direction::Unknown => "#718096",
        }
    }
}

/// Per-job state machine: Pending → Fetching → Analyzing → Completed | PartiallyFailed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Fetching,
    Analyzing,
    Completed,
    PartiallyFailed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::PartiallyFailed)
    }

    /// Forward-only transitions; any live state may fall to `PartiallyFailed`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Fetching) => true,
            (JobStatus::Fetching, JobStatus::Analyzing) => true,
            (JobStatus::Analyzing, JobStatus::Completed) => true,
            (current, JobStatus::PartiallyFailed) => !current.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithFailures,
}

//
// ================= Cache =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

//
// ================= Fetching =================
//

/// Outcome of one adapter call. A populated `error` means `data` holds the
/// adapter's typed empty value rather than upstream data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchResult {
    pub data: Value,
    pub fetched_at: DateTime<Utc>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub from_cache: bool,
}

impl FetchResult {
    pub fn ok(source: impl Into<String>, data: Value, from_cache: bool) -> Self {
        Self {
            data,
            fetched_at: Utc::now(),
            source: source.into(),
            error: None,
            from_cache,
        }
    }

    pub fn degraded(source: impl Into<String>, empty: Value, error: impl Into<String>) -> Self {
        Self {
            data: empty,
            fetched_at: Utc::now(),
            source: source.into(),
            error: Some(error.into()),
            from_cache: false,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

//
// ================= Model calls =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    Json,
}

/// One concrete model request. Fallback specs differ only in `model`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelCallSpec {
    pub prompt: String,
    pub system_prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl ModelCallSpec {
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }
}

/// Narrative produced for a job. `content` is never empty, even when every
/// model failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub from_cache: bool,
}

impl AnalysisResult {
    pub fn success(content: String, model: &str, usage: Option<Value>) -> Self {
        Self {
            content,
            model: Some(model.to_string()),
            usage,
            error: None,
            timestamp: Utc::now(),
            from_cache: false,
        }
    }

    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            content: UNAVAILABLE_ANALYSIS.to_string(),
            model: None,
            usage: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
            from_cache: false,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

//
// ================= Artifacts =================
//

/// Per-dashboard snapshot written once per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobArtifact {
    pub dashboard: String,
    #[serde(rename = "generatedAt")]
    pub generated_at: DateTime<Utc>,
    pub metrics: Value,
    pub ai_analysis: String,
    pub data_sources: Vec<String>,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<Value>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl JobArtifact {
    pub fn is_degraded(&self) -> bool {
        self.status == JobStatus::PartiallyFailed
    }
}

//
// ================= Aggregate report =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainSignal {
    pub signal: Signal,
    pub score: f64,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetSignal {
    pub signal: Signal,
    pub score: f64,
    pub confidence: f64,
    pub color: String,
}

/// The single decision the rule tree emits for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub condition: String,
    pub action: String,
    pub confidence: f64,
    pub reasoning: String,
    /// Index of the rule that fired; `None` means the default decision.
    #[serde(default)]
    pub rule_index: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateReport {
    #[serde(rename = "generatedAt")]
    pub generated_at: DateTime<Utc>,
    pub conflict_matrix: BTreeMap<Domain, DomainSignal>,
    pub net_signal: NetSignal,
    pub decision_tree: Decision,
    #[serde(default)]
    pub degraded_domains: Vec<Domain>,
}

//
// ================= Run summary =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobOutcome {
    pub dashboard: String,
    pub wave: usize,
    pub status: JobStatus,
    #[serde(default)]
    pub degraded_sources: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub jobs: Vec<JobOutcome>,
    pub report: AggregateReport,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Domain::Risk => "Risk",
            Domain::Crypto => "Crypto",
            Domain::Macro => "Macro",
            Domain::Tech => "Tech",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Fetching => "fetching",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Completed => "completed",
            JobStatus::PartiallyFailed => "partially_failed",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_job_status_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Fetching));
        assert!(JobStatus::Fetching.can_transition_to(JobStatus::Analyzing));
        assert!(JobStatus::Analyzing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Fetching.can_transition_to(JobStatus::PartiallyFailed));

        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Analyzing));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::PartiallyFailed));
        assert!(!JobStatus::PartiallyFailed.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_cache_entry_expiry_is_strict() {
        let now = Utc::now();
        let entry = CacheEntry {
            value: serde_json::json!(1),
            cached_at: now,
            expires_at: now + Duration::milliseconds(100),
        };
        assert!(!entry.is_expired(now + Duration::milliseconds(100)));
        assert!(entry.is_expired(now + Duration::milliseconds(101)));
    }

    #[test]
    fn test_unavailable_analysis_is_displayable() {
        let result = AnalysisResult::unavailable("no models");
        assert!(result.is_degraded());
        assert!(!result.content.trim().is_empty());
        assert!(result.model.is_none());
    }

    #[test]
    fn test_artifact_wire_format() {
        let artifact = JobArtifact {
            dashboard: "the-coin".into(),
            generated_at: Utc::now(),
            metrics: serde_json::json!({"scores": {"momentum_score": 55.0}}),
            ai_analysis: "BTC holding range".into(),
            data_sources: vec!["crypto".into()],
            status: JobStatus::Completed,
            model: Some("m1".into()),
            structured: None,
            errors: vec![],
        };

        let value = serde_json::to_value(&artifact).unwrap();
        assert!(value.get("generatedAt").is_some());
        assert_eq!(value["ai_analysis"], "BTC holding range");
        assert_eq!(value["data_sources"][0], "crypto");
        assert_eq!(value["status"], "completed");
        assert!(value.get("structured").is_none());
    }

    #[test]
    fn test_signal_colors_follow_direction() {
        assert_eq!(Signal::Calm.color(), Signal::Bullish.color());
        assert_eq!(Signal::Defensive.color(), "#dc3545");
        assert_eq!(Signal::Unknown.direction(), Direction::Unknown);
        assert_eq!(serde_json::to_value(Signal::Defensive).unwrap(), "DEFENSIVE");
    }
}
