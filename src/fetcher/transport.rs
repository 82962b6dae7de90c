//! HTTP transport seam
//!
//! The fetcher talks to upstreams through `HttpTransport` so retry and
//! timeout behavior can be exercised without a network.

use crate::error::OrchestrationError;
use crate::Result;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }

    /// URL without query string or credentials, safe to log.
    pub fn display_url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Production transport (connection-pooled reqwest client)
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .user_agent(concat!("alpha-loop-orchestrator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            OrchestrationError::NetworkError(format!(
                "request to {} failed: {}",
                request.display_url(),
                e
            ))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            OrchestrationError::NetworkError(format!(
                "reading body from {} failed: {}",
                request.display_url(),
                e
            ))
        })?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builders() {
        let request = HttpRequest::get("https://api.example.com/v1/items")
            .query("limit", "5")
            .header("X-Api-Key", "secret");

        assert_eq!(request.method, Method::Get);
        assert_eq!(request.query, vec![("limit".to_string(), "5".to_string())]);
        assert_eq!(request.display_url(), "https://api.example.com/v1/items");
        assert!(request.body.is_none());

        let post = HttpRequest::post_json("https://api.example.com", json!({"a": 1}));
        assert_eq!(post.method, Method::Post);
        assert_eq!(post.body, Some(json!({"a": 1})));
    }

    #[test]
    fn test_success_range() {
        let ok = HttpResponse { status: 204, status_text: "No Content".into(), body: String::new() };
        let err = HttpResponse { status: 503, status_text: "Service Unavailable".into(), body: String::new() };
        assert!(ok.is_success());
        assert!(!err.is_success());
    }
}
