//! Crypto Fear & Greed index (alternative.me)

use super::{expect_object, number, Params, SourceAdapter, SourceKind};
use crate::error::OrchestrationError;
use crate::fetcher::HttpRequest;
use crate::Result;
use serde_json::{json, Value};

pub struct SentimentAdapter {
    base_url: String,
}

impl SentimentAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for SentimentAdapter {
    fn default() -> Self {
        Self::new("https://api.alternative.me")
    }
}

impl SourceAdapter for SentimentAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Sentiment
    }

    fn request(&self, _params: &Params, _api_key: &str) -> Result<HttpRequest> {
        Ok(HttpRequest::get(format!("{}/fng/", self.base_url)).query("limit", "1"))
    }

    fn normalize(&self, raw: Value, _params: &Params) -> Result<Value> {
        let body = expect_object(&raw, "sentiment")?;
        let latest = body
            .get("data")
            .and_then(Value::as_array)
            .and_then(|d| d.first())
            .ok_or_else(|| OrchestrationError::parse("sentiment reply has no data points"))?;

        let value = latest
            .get("value")
            .and_then(number)
            .ok_or_else(|| OrchestrationError::parse("sentiment value is not numeric"))?;

        Ok(json!({
            "value": value,
            "classification": latest
                .get("value_classification")
                .and_then(Value::as_str)
                .unwrap_or("Unknown"),
        }))
    }

    fn empty(&self, _params: &Params) -> Value {
        json!({ "value": 50, "classification": "Neutral" })
    }
}
