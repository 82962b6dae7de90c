//! Source adapters and the service that runs them
//!
//! An adapter only knows how to build its upstream request, how to reshape
//! the reply and what its empty value looks like. `SourceService` wraps each
//! call in cache lookup, credential and budget checks, the resilient fetcher
//! and degradation, so a failing upstream never escapes as an error.

pub mod crypto;
pub mod economic;
pub mod news;
pub mod research;
pub mod sentiment;
pub mod treasury;

use crate::cache::TtlCache;
use crate::config::TtlTable;
use crate::credentials::CredentialProvider;
use crate::error::OrchestrationError;
use crate::events::{tracing_sink, EventKind, EventSink};
use crate::fetcher::{HttpRequest, ResilientFetcher};
use crate::keys::SourceKey;
use crate::models::FetchResult;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

pub type Params = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    News,
    Crypto,
    Sentiment,
    Treasury,
    Economic,
    Research,
}

impl SourceKind {
    pub const ALL: [SourceKind; 6] = [
        SourceKind::News,
        SourceKind::Crypto,
        SourceKind::Sentiment,
        SourceKind::Treasury,
        SourceKind::Economic,
        SourceKind::Research,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::News => "news",
            SourceKind::Crypto => "crypto",
            SourceKind::Sentiment => "sentiment",
            SourceKind::Treasury => "treasury",
            SourceKind::Economic => "economic",
            SourceKind::Research => "research",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical source request as declared by a dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRequest {
    pub kind: SourceKind,
    #[serde(default)]
    pub params: Params,
    /// Name used in artifacts; defaults to the kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SourceRequest {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            params: Params::new(),
            label: None,
        }
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn labeled(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or_else(|| self.kind.as_str())
    }

    pub fn key(&self) -> SourceKey {
        SourceKey::new(self.kind.as_str(), &self.params)
    }
}

/// Uniform wrapper around one upstream.
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Logical credential name, if the upstream needs one.
    fn credential(&self) -> Option<&'static str> {
        None
    }

    fn request(&self, params: &Params, api_key: &str) -> Result<HttpRequest>;

    /// Reshape the upstream reply into the stable internal schema.
    fn normalize(&self, raw: Value, params: &Params) -> Result<Value>;

    /// Typed value returned when the upstream is unavailable.
    fn empty(&self, params: &Params) -> Value;
}

/// Adapter registry for looking up adapters by kind
pub struct AdapterRegistry {
    adapters: HashMap<SourceKind, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Registry with every built-in adapter on its public endpoint.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(news::NewsAdapter::default()));
        registry.register(Arc::new(crypto::CryptoAdapter::default()));
        registry.register(Arc::new(sentiment::SentimentAdapter::default()));
        registry.register(Arc::new(treasury::TreasuryAdapter::default()));
        registry.register(Arc::new(economic::EconomicAdapter::default()));
        registry.register(Arc::new(research::ResearchAdapter::default()));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<SourceKind> {
        let mut kinds: Vec<_> = self.adapters.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= Service =================
//

pub struct SourceService {
    registry: AdapterRegistry,
    fetcher: Arc<ResilientFetcher>,
    cache: Arc<TtlCache>,
    credentials: Arc<dyn CredentialProvider>,
    ttl: TtlTable,
    budgets: BTreeMap<SourceKind, u32>,
    spent: Mutex<HashMap<SourceKind, u32>>,
    events: Arc<dyn EventSink>,
}

impl SourceService {
    pub fn new(
        registry: AdapterRegistry,
        fetcher: Arc<ResilientFetcher>,
        cache: Arc<TtlCache>,
        credentials: Arc<dyn CredentialProvider>,
        ttl: TtlTable,
    ) -> Self {
        Self {
            registry,
            fetcher,
            cache,
            credentials,
            ttl,
            budgets: BTreeMap::new(),
            spent: Mutex::new(HashMap::new()),
            events: tracing_sink(),
        }
    }

    /// Per-run cap on network calls per source kind. Kinds not listed are
    /// unlimited.
    pub fn with_budgets(mut self, budgets: BTreeMap<SourceKind, u32>) -> Self {
        self.budgets = budgets;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Called at the start of every run.
    pub fn reset_budgets(&self) {
        self.spent.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    /// Resolve one request. Never fails: problems come back as a degraded
    /// result carrying the adapter's empty value.
    pub async fn fetch(&self, request: &SourceRequest) -> FetchResult {
        let label = request.label();
        let adapter = match self.registry.get(request.kind) {
            Some(adapter) => adapter,
            None => {
                return self.degrade(
                    request,
                    Value::Null,
                    format!("no adapter registered for {}", request.kind),
                )
            }
        };

        let key = request.key();
        if let Some(value) = self.cache.get(key.as_str()) {
            return FetchResult::ok(label, value, true);
        }

        let api_key = match adapter.credential() {
            Some(name) => {
                let secret = self.credentials.api_key(name);
                if secret.is_empty() {
                    self.events.on_event(
                        EventKind::CredentialMissing,
                        json!({ "source": label, "credential": name }),
                    );
                    let error = OrchestrationError::CredentialMissing(name.to_string());
                    return self.degrade(request, adapter.empty(&request.params), error.to_string());
                }
                secret
            }
            None => String::new(),
        };

        if !self.take_budget(request.kind) {
            self.events.on_event(
                EventKind::BudgetExhausted,
                json!({ "source": label, "budget": self.budgets.get(&request.kind) }),
            );
            return self.degrade(
                request,
                adapter.empty(&request.params),
                format!("request budget for {} exhausted this run", request.kind),
            );
        }

        let outcome: Result<Value> = async {
            let http = adapter.request(&request.params, &api_key)?;
            let raw = self.fetcher.fetch(&http).await?;
            adapter.normalize(raw, &request.params)
        }
        .await;

        match outcome {
            Ok(data) => {
                self.cache
                    .set(key.as_str(), data.clone(), self.ttl.for_source(request.kind));
                FetchResult::ok(label, data, false)
            }
            Err(e) => self.degrade(request, adapter.empty(&request.params), e.to_string()),
        }
    }

    /// Resolve many requests concurrently. Every request settles and results
    /// come back in request order.
    pub async fn gather(&self, requests: &[SourceRequest]) -> Vec<FetchResult> {
        futures::future::join_all(requests.iter().map(|r| self.fetch(r))).await
    }

    fn take_budget(&self, kind: SourceKind) -> bool {
        let limit = match self.budgets.get(&kind) {
            Some(limit) => *limit,
            None => return true,
        };
        let mut spent = self.spent.lock().unwrap_or_else(|p| p.into_inner());
        let used = spent.entry(kind).or_insert(0);
        if *used >= limit {
            return false;
        }
        *used += 1;
        true
    }

    fn degrade(&self, request: &SourceRequest, empty: Value, error: String) -> FetchResult {
        self.events.on_event(
            EventKind::SourceDegraded,
            json!({ "source": request.label(), "key": request.key().as_str(), "error": error }),
        );
        FetchResult::degraded(request.label(), empty, error)
    }
}

//
// ================= Shared helpers =================
//

/// Parameter value or a default.
pub(crate) fn param(params: &Params, name: &str, default: &str) -> String {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Upstreams mix numeric and string encodings; "." and "null" mean missing.
pub(crate) fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub(crate) fn text(value: &Value) -> Value {
    value
        .as_str()
        .map(|s| Value::String(s.to_string()))
        .unwrap_or(Value::Null)
}

pub(crate) fn expect_object<'a>(raw: &'a Value, source: &str) -> Result<&'a serde_json::Map<String, Value>> {
    raw.as_object().ok_or_else(|| {
        OrchestrationError::parse(format!("{} reply is not a JSON object", source))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, MemoryBackend};
    use crate::credentials::StaticCredentials;
    use crate::events::RecordingEventSink;
    use crate::fetcher::RetryPolicy;
    use crate::testing::{Scripted, ScriptedTransport};
    use chrono::Utc;
    use std::time::Duration;

    struct Harness {
        service: SourceService,
        transport: Arc<ScriptedTransport>,
        clock: Arc<ManualClock>,
        events: Arc<RecordingEventSink>,
    }

    fn harness(transport: ScriptedTransport, credentials: StaticCredentials) -> Harness {
        let transport = Arc::new(transport);
        let events = Arc::new(RecordingEventSink::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = Arc::new(
            TtlCache::new(Arc::new(MemoryBackend::new()), clock.clone())
                .with_events(events.clone()),
        );
        let fetcher = Arc::new(ResilientFetcher::new(
            transport.clone(),
            RetryPolicy::default(),
            events.clone(),
        ));
        let service = SourceService::new(
            AdapterRegistry::with_defaults(),
            fetcher,
            cache,
            Arc::new(credentials),
            TtlTable::default(),
        )
        .with_events(events.clone());

        Harness {
            service,
            transport,
            clock,
            events,
        }
    }

    fn coingecko_reply() -> Scripted {
        Scripted::json(
            200,
            json!({"bitcoin": {"usd": 64000.0, "usd_24h_change": 2.5}}),
        )
    }

    #[tokio::test]
    async fn test_cached_result_skips_network_until_expiry() {
        let h = harness(
            ScriptedTransport::new().route("coingecko", vec![coingecko_reply()]),
            StaticCredentials::new(),
        );
        let request = SourceRequest::new(SourceKind::Crypto).param("ids", "bitcoin");

        let first = h.service.fetch(&request).await;
        assert!(!first.is_degraded());
        assert!(!first.from_cache);

        h.clock.advance(Duration::from_millis(30_000));
        let second = h.service.fetch(&request).await;
        assert!(second.from_cache);
        assert_eq!(second.data, first.data);
        assert_eq!(h.transport.call_count("coingecko"), 1);

        h.clock.advance(Duration::from_millis(40_000));
        let third = h.service.fetch(&request).await;
        assert!(!third.from_cache);
        assert_eq!(h.transport.call_count("coingecko"), 2);
    }

    #[tokio::test]
    async fn test_missing_credential_degrades_without_network() {
        let h = harness(ScriptedTransport::new(), StaticCredentials::new());
        let request = SourceRequest::new(SourceKind::Economic).param("series_id", "DGS10");

        let result = h.service.fetch(&request).await;

        assert!(result.is_degraded());
        assert_eq!(result.data["observations"], json!([]));
        assert!(h.transport.calls().is_empty());
        assert_eq!(h.events.count(EventKind::CredentialMissing), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gather_settles_every_request_in_order() {
        let h = harness(
            ScriptedTransport::new()
                .route("coingecko", vec![coingecko_reply()])
                .route("alternative.me", vec![Scripted::status(503)]),
            StaticCredentials::new(),
        );
        let requests = vec![
            SourceRequest::new(SourceKind::Sentiment),
            SourceRequest::new(SourceKind::Crypto).param("ids", "bitcoin"),
            SourceRequest::new(SourceKind::News),
        ];

        let results = h.service.gather(&requests).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].source, "sentiment");
        assert!(results[0].is_degraded());
        assert_eq!(results[0].data["value"], 50);
        assert!(!results[1].is_degraded());
        assert!(results[2].is_degraded());
        assert_eq!(h.transport.call_count("alternative.me"), 3);
    }

    #[tokio::test]
    async fn test_budget_caps_network_calls_but_not_cache_hits() {
        let h = harness(
            ScriptedTransport::new().route("coingecko", vec![coingecko_reply()]),
            StaticCredentials::new(),
        );
        let service = h
            .service
            .with_budgets(BTreeMap::from([(SourceKind::Crypto, 1)]));
        let btc = SourceRequest::new(SourceKind::Crypto).param("ids", "bitcoin");
        let eth = SourceRequest::new(SourceKind::Crypto).param("ids", "ethereum");

        assert!(!service.fetch(&btc).await.is_degraded());
        assert!(service.fetch(&btc).await.from_cache);

        let capped = service.fetch(&eth).await;
        assert!(capped.is_degraded());
        assert!(capped.error.unwrap_or_default().contains("budget"));

        service.reset_budgets();
        assert!(!service.fetch(&eth).await.is_degraded());
        assert_eq!(h.transport.call_count("coingecko"), 2);
    }

    #[test]
    fn test_labels_default_to_kind() {
        let plain = SourceRequest::new(SourceKind::Economic);
        let named = SourceRequest::new(SourceKind::Economic).labeled("vix");
        assert_eq!(plain.label(), "economic");
        assert_eq!(named.label(), "vix");
    }

    #[test]
    fn test_number_accepts_strings() {
        assert_eq!(number(&json!("4.25")), Some(4.25));
        assert_eq!(number(&json!(3)), Some(3.0));
        assert_eq!(number(&json!(".")), None);
        assert_eq!(number(&Value::Null), None);
    }
}
