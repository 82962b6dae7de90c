//! Observability sink
//!
//! Core components never log directly; they report structured events to an
//! injected `EventSink`. The default sink forwards to `tracing`.

use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    FetchAttempt,
    FetchRetry,
    FetchFailed,
    CacheHit,
    CacheMiss,
    CacheExpired,
    CacheCleared,
    CacheIoFailed,
    SourceDegraded,
    CredentialMissing,
    BudgetExhausted,
    ModelAttempt,
    ModelFallback,
    ModelExhausted,
    AiDisabled,
    JobTransition,
    WaveStarted,
    WaveFetched,
    WavePause,
    WaveCompleted,
    ArtifactWritten,
    ArtifactFailed,
    RunCompleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FetchAttempt => "fetch_attempt",
            EventKind::FetchRetry => "fetch_retry",
            EventKind::FetchFailed => "fetch_failed",
            EventKind::CacheHit => "cache_hit",
            EventKind::CacheMiss => "cache_miss",
            EventKind::CacheExpired => "cache_expired",
            EventKind::CacheCleared => "cache_cleared",
            EventKind::CacheIoFailed => "cache_io_failed",
            EventKind::SourceDegraded => "source_degraded",
            EventKind::CredentialMissing => "credential_missing",
            EventKind::BudgetExhausted => "budget_exhausted",
            EventKind::ModelAttempt => "model_attempt",
            EventKind::ModelFallback => "model_fallback",
            EventKind::ModelExhausted => "model_exhausted",
            EventKind::AiDisabled => "ai_disabled",
            EventKind::JobTransition => "job_transition",
            EventKind::WaveStarted => "wave_started",
            EventKind::WaveFetched => "wave_fetched",
            EventKind::WavePause => "wave_pause",
            EventKind::WaveCompleted => "wave_completed",
            EventKind::ArtifactWritten => "artifact_written",
            EventKind::ArtifactFailed => "artifact_failed",
            EventKind::RunCompleted => "run_completed",
        }
    }
}

/// Receiver for structured events emitted by the core.
pub trait EventSink: Send + Sync {
    fn on_event(&self, kind: EventKind, detail: Value);
}

/// Forwards events to `tracing`, choosing a level per kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn on_event(&self, kind: EventKind, detail: Value) {
        let event = kind.as_str();
        match kind {
            EventKind::ModelExhausted | EventKind::ArtifactFailed => {
                error!(event, %detail, "orchestrator event")
            }
            EventKind::FetchRetry
            | EventKind::FetchFailed
            | EventKind::SourceDegraded
            | EventKind::CredentialMissing
            | EventKind::BudgetExhausted
            | EventKind::ModelFallback
            | EventKind::CacheIoFailed => warn!(event, %detail, "orchestrator event"),
            EventKind::CacheHit
            | EventKind::CacheMiss
            | EventKind::CacheExpired
            | EventKind::FetchAttempt
            | EventKind::ModelAttempt => debug!(event, %detail, "orchestrator event"),
            _ => info!(event, %detail, "orchestrator event"),
        }
    }
}

/// Keeps every event in memory. Used by tests and for run inspection.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<(EventKind, Value)>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(EventKind, Value)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .map(|events| events.iter().filter(|(k, _)| *k == kind).count())
            .unwrap_or(0)
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<Value> {
        self.events
            .lock()
            .map(|events| {
                events
                    .iter()
                    .filter(|(k, _)| *k == kind)
                    .map(|(_, detail)| detail.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl EventSink for RecordingEventSink {
    fn on_event(&self, kind: EventKind, detail: Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push((kind, detail));
        }
    }
}

/// Default sink shared by components built without an explicit one.
pub fn tracing_sink() -> Arc<dyn EventSink> {
    Arc::new(TracingEventSink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recording_sink_filters_by_kind() {
        let sink = RecordingEventSink::new();
        sink.on_event(EventKind::CacheHit, json!({"key": "a"}));
        sink.on_event(EventKind::CacheMiss, json!({"key": "b"}));
        sink.on_event(EventKind::CacheHit, json!({"key": "c"}));

        assert_eq!(sink.count(EventKind::CacheHit), 2);
        assert_eq!(sink.of_kind(EventKind::CacheMiss), vec![json!({"key": "b"})]);
        assert_eq!(sink.events().len(), 3);
    }

    #[test]
    fn test_kind_names_match_serde() {
        let serialized = serde_json::to_value(EventKind::ModelFallback).unwrap();
        assert_eq!(serialized, EventKind::ModelFallback.as_str());
    }
}
