//! FRED economic series

use super::{expect_object, number, param, text, Params, SourceAdapter, SourceKind};
use crate::fetcher::HttpRequest;
use crate::Result;
use serde_json::{json, Value};

pub struct EconomicAdapter {
    base_url: String,
}

impl EconomicAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for EconomicAdapter {
    fn default() -> Self {
        Self::new("https://api.stlouisfed.org/fred")
    }
}

impl SourceAdapter for EconomicAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Economic
    }

    fn credential(&self) -> Option<&'static str> {
        Some("FRED")
    }

    fn request(&self, params: &Params, api_key: &str) -> Result<HttpRequest> {
        Ok(HttpRequest::get(format!("{}/series/observations", self.base_url))
            .query("series_id", param(params, "series_id", "DGS10"))
            .query("limit", param(params, "limit", "30"))
            .query("sort_order", "desc")
            .query("file_type", "json")
            .query("api_key", api_key))
    }

    /// Observations come newest first; FRED marks gaps with ".".
    fn normalize(&self, raw: Value, params: &Params) -> Result<Value> {
        let body = expect_object(&raw, "economic")?;
        let observations: Vec<Value> = body
            .get("observations")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| {
                        let value = row.get("value").and_then(number)?;
                        Some(json!({ "date": text(&row["date"]), "value": value }))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let latest = observations
            .first()
            .and_then(|o| o.get("value"))
            .cloned()
            .unwrap_or(Value::Null);

        Ok(json!({
            "series_id": param(params, "series_id", "DGS10"),
            "latest": latest,
            "observations": observations,
        }))
    }

    fn empty(&self, params: &Params) -> Value {
        json!({
            "series_id": param(params, "series_id", "DGS10"),
            "latest": null,
            "observations": [],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_drops_missing_observations() {
        let raw = json!({
            "observations": [
                {"date": "2026-10-15", "value": "."},
                {"date": "2026-10-14", "value": "4.11"},
                {"date": "2026-10-13", "value": "4.08"}
            ]
        });
        let params = Params::from([("series_id".to_string(), "DGS10".to_string())]);
        let normalized = EconomicAdapter::default().normalize(raw, &params).unwrap();

        assert_eq!(normalized["latest"], 4.11);
        assert_eq!(normalized["observations"].as_array().unwrap().len(), 2);
        assert_eq!(normalized["series_id"], "DGS10");
    }

    #[test]
    fn test_api_key_goes_in_query() {
        let request = EconomicAdapter::default()
            .request(&Params::new(), "fred-key")
            .unwrap();
        assert!(request.query.contains(&("api_key".to_string(), "fred-key".to_string())));
        assert!(!request.display_url().contains("fred-key"));
    }
}
