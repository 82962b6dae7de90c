//! Model routing with ordered fallback
//!
//! Every model gets exactly one attempt; an outage on one backend is usually
//! total, so the router moves down the chain instead of retrying. Whatever
//! happens, `analyze` returns displayable content.

pub mod extract;
pub mod openrouter;
pub mod tasks;

pub use extract::extract_json;
pub use tasks::{ModelChain, TaskType};

use crate::cache::TtlCache;
use crate::config::ModelConfig;
use crate::credentials::CredentialProvider;
use crate::error::OrchestrationError;
use crate::events::{tracing_sink, EventKind, EventSink};
use crate::fetcher::ResilientFetcher;
use crate::keys::model_cache_key;
use crate::models::{AnalysisResult, ModelCallSpec};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Per-call switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalyzeOptions {
    /// Skip the model entirely and return the canned result.
    pub disable_ai: bool,
    /// Ignore a cached result (a fresh one is still written).
    pub bypass_cache: bool,
}

pub struct ModelRouter {
    fetcher: Arc<ResilientFetcher>,
    cache: Arc<TtlCache>,
    credentials: Arc<dyn CredentialProvider>,
    config: ModelConfig,
    analysis_ttl: Duration,
    disable_ai: bool,
    events: Arc<dyn EventSink>,
}

impl ModelRouter {
    pub fn new(
        fetcher: Arc<ResilientFetcher>,
        cache: Arc<TtlCache>,
        credentials: Arc<dyn CredentialProvider>,
        config: ModelConfig,
        analysis_ttl: Duration,
    ) -> Self {
        Self {
            fetcher,
            cache,
            credentials,
            config,
            analysis_ttl,
            disable_ai: false,
            events: tracing_sink(),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Process-wide switch, equivalent to passing `disable_ai` on every call.
    pub fn with_ai_disabled(mut self, disabled: bool) -> Self {
        self.disable_ai = disabled;
        self
    }

    pub fn ai_disabled(&self) -> bool {
        self.disable_ai
    }

    pub fn chain(&self, task: TaskType) -> Option<&ModelChain> {
        self.config.chains.get(&task)
    }

    /// Narrative analysis for `payload`. Never fails.
    pub async fn analyze(
        &self,
        task: TaskType,
        payload: &Value,
        options: AnalyzeOptions,
    ) -> AnalysisResult {
        if options.disable_ai || self.disable_ai {
            self.events
                .on_event(EventKind::AiDisabled, json!({ "task": task.as_str() }));
            return AnalysisResult::unavailable("AI analysis disabled for this run");
        }

        // Without a key the call still runs, just uncached
        let key = match model_cache_key(task.as_str(), payload) {
            Ok(key) => Some(key),
            Err(e) => {
                self.events.on_event(
                    EventKind::CacheIoFailed,
                    json!({ "task": task.as_str(), "error": e.to_string() }),
                );
                None
            }
        };
        if let Some(key) = key.as_deref().filter(|_| !options.bypass_cache) {
            if let Some(cached) = self.cache.get(key) {
                if let Ok(mut result) = serde_json::from_value::<AnalysisResult>(cached) {
                    result.from_cache = true;
                    return result;
                }
            }
        }

        let chain = match self.chain(task) {
            Some(chain) if !chain.is_empty() => chain,
            _ => {
                let error = OrchestrationError::ModelExhausted {
                    task: task.to_string(),
                    reason: "no models configured".to_string(),
                };
                self.report_exhausted(task, &error);
                return AnalysisResult::unavailable(error.to_string());
            }
        };

        let api_key = self.credentials.api_key(&self.config.credential);
        if api_key.is_empty() {
            self.events.on_event(
                EventKind::CredentialMissing,
                json!({ "task": task.as_str(), "credential": self.config.credential }),
            );
            let error = OrchestrationError::CredentialMissing(self.config.credential.clone());
            return AnalysisResult::unavailable(error.to_string());
        }

        let base_spec = task.call_spec(payload, &chain.primary);
        let models: Vec<&str> = chain.models().collect();
        let mut failures = Vec::with_capacity(models.len());

        for (position, model) in models.iter().enumerate() {
            self.events.on_event(
                EventKind::ModelAttempt,
                json!({ "task": task.as_str(), "model": model, "position": position }),
            );

            match self.call(&base_spec.with_model(model), &api_key).await {
                Ok((content, usage)) => {
                    let result = AnalysisResult::success(content, model, usage);
                    if let Some(key) = &key {
                        match serde_json::to_value(&result) {
                            Ok(value) => self.cache.set(key, value, self.analysis_ttl),
                            Err(e) => failures.push(format!("cache encode: {}", e)),
                        }
                    }
                    return result;
                }
                Err(e) => {
                    if let Some(next) = models.get(position + 1) {
                        self.events.on_event(
                            EventKind::ModelFallback,
                            json!({
                                "task": task.as_str(),
                                "failed": model,
                                "error": e.to_string(),
                                "next": next,
                            }),
                        );
                    }
                    failures.push(format!("{}: {}", model, e));
                }
            }
        }

        let error = OrchestrationError::ModelExhausted {
            task: task.to_string(),
            reason: failures.join("; "),
        };
        self.report_exhausted(task, &error);
        AnalysisResult::unavailable(error.to_string())
    }

    /// Analysis plus the JSON object extracted from it. The analysis is
    /// always returned; the structured half fails with `ModelExhausted` when
    /// no model answered, or `ParseError` when the answer held no JSON.
    pub async fn analyze_structured(
        &self,
        task: TaskType,
        payload: &Value,
        options: AnalyzeOptions,
    ) -> (AnalysisResult, Result<Value>) {
        let analysis = self.analyze(task, payload, options).await;
        if let Some(reason) = &analysis.error {
            let error = OrchestrationError::ModelExhausted {
                task: task.to_string(),
                reason: reason.clone(),
            };
            return (analysis, Err(error));
        }
        let structured = extract_json(&analysis.content);
        (analysis, structured)
    }

    async fn call(&self, spec: &ModelCallSpec, api_key: &str) -> Result<(String, Option<Value>)> {
        let request = openrouter::chat_request(&self.config, spec, api_key)?;
        let body = self
            .fetcher
            .fetch_with(&request, 1, Duration::from_millis(self.config.timeout_ms))
            .await?;
        openrouter::parse_reply(body)
    }

    fn report_exhausted(&self, task: TaskType, error: &OrchestrationError) {
        self.events.on_event(
            EventKind::ModelExhausted,
            json!({ "task": task.as_str(), "error": error.to_string() }),
        );
    }
}
