//! Resilient HTTP fetching
//!
//! One request, bounded per attempt by a timeout, retried with exponential
//! backoff (1s, 2s, 4s, ... by default). The final error is surfaced as-is;
//! degrading to an empty value is the adapter's job, not this layer's.

pub mod transport;

pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};

use crate::config::FetchConfig;
use crate::error::OrchestrationError;
use crate::events::{EventKind, EventSink};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub timeout: Duration,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Delay between attempt `attempt` and `attempt + 1` (0-indexed).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout: Duration::from_millis(10_000),
            base_backoff: Duration::from_millis(1_000),
        }
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            retries: config.retries,
            timeout: Duration::from_millis(config.timeout_ms),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
        }
    }
}

pub struct ResilientFetcher {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    events: Arc<dyn EventSink>,
}

impl ResilientFetcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        policy: RetryPolicy,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            transport,
            policy,
            events,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch JSON using the default policy.
    pub async fn fetch(&self, request: &HttpRequest) -> Result<Value> {
        self.fetch_with(request, self.policy.retries, self.policy.timeout)
            .await
    }

    /// Fetch JSON with an explicit attempt count and per-attempt timeout.
    pub async fn fetch_with(
        &self,
        request: &HttpRequest,
        retries: u32,
        timeout: Duration,
    ) -> Result<Value> {
        let attempts = retries.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            self.events.on_event(
                EventKind::FetchAttempt,
                json!({
                    "url": request.display_url(),
                    "attempt": attempt + 1,
                    "of": attempts,
                }),
            );

            match self.attempt(request, timeout).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    self.report_failure(request, attempt + 1, &e);
                    return Err(e);
                }
                Err(e) => {
                    if attempt + 1 < attempts {
                        let delay = self.policy.backoff_for(attempt);
                        self.events.on_event(
                            EventKind::FetchRetry,
                            json!({
                                "url": request.display_url(),
                                "attempt": attempt + 1,
                                "error": e.to_string(),
                                "delay_ms": delay.as_millis() as u64,
                            }),
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let error = last_error.unwrap_or_else(|| {
            OrchestrationError::NetworkError(format!(
                "no attempt made for {}",
                request.display_url()
            ))
        });
        self.report_failure(request, attempts, &error);
        Err(error)
    }

    /// A single attempt. Dropping the in-flight future on timeout cancels it.
    async fn attempt(&self, request: &HttpRequest, timeout: Duration) -> Result<Value> {
        let response = match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(OrchestrationError::NetworkError(format!(
                    "request to {} timed out after {} ms",
                    request.display_url(),
                    timeout.as_millis()
                )))
            }
        };

        if !response.is_success() {
            return Err(OrchestrationError::NetworkError(format!(
                "HTTP {} {} from {}",
                response.status,
                response.status_text,
                request.display_url()
            )));
        }

        serde_json::from_str(&response.body).map_err(|e| {
            OrchestrationError::ParseError(format!(
                "invalid JSON from {}: {}",
                request.display_url(),
                e
            ))
        })
    }

    fn report_failure(&self, request: &HttpRequest, attempts: u32, error: &OrchestrationError) {
        self.events.on_event(
            EventKind::FetchFailed,
            json!({
                "url": request.display_url(),
                "attempts": attempts,
                "error": error.to_string(),
            }),
        );
    }
}
