//! Treasury auction results (fiscaldata.treasury.gov)

use super::{expect_object, number, param, text, Params, SourceAdapter, SourceKind};
use crate::fetcher::HttpRequest;
use crate::Result;
use serde_json::{json, Value};

pub struct TreasuryAdapter {
    base_url: String,
}

impl TreasuryAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for TreasuryAdapter {
    fn default() -> Self {
        Self::new("https://api.fiscaldata.treasury.gov/services/api/fiscal_service")
    }
}

impl SourceAdapter for TreasuryAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Treasury
    }

    fn request(&self, params: &Params, _api_key: &str) -> Result<HttpRequest> {
        let filter = format!(
            "security_term:eq:{},security_type:eq:{}",
            param(params, "security_term", "10-Year"),
            param(params, "security_type", "Note"),
        );
        Ok(
            HttpRequest::get(format!("{}/v1/accounting/od/auctions_query", self.base_url))
                .query("filter", filter)
                .query("sort", "-auction_date")
                .query("page[size]", "1"),
        )
    }

    fn normalize(&self, raw: Value, params: &Params) -> Result<Value> {
        let body = expect_object(&raw, "treasury")?;
        let latest = body
            .get("data")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first());

        let latest = match latest {
            Some(row) => row,
            None => return Ok(self.empty(params)),
        };

        Ok(json!({
            "security_term": param(params, "security_term", "10-Year"),
            "auction_date": text(&latest["auction_date"]),
            "bid_to_cover": latest.get("bid_to_cover_ratio").and_then(number),
            "high_yield": latest.get("high_yield").and_then(number),
        }))
    }

    fn empty(&self, params: &Params) -> Value {
        json!({
            "security_term": param(params, "security_term", "10-Year"),
            "auction_date": null,
            "bid_to_cover": null,
            "high_yield": null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_latest_auction() {
        let raw = json!({
            "data": [{
                "auction_date": "2026-10-08",
                "security_term": "10-Year",
                "bid_to_cover_ratio": "2.48",
                "high_yield": "4.125"
            }]
        });
        let normalized = TreasuryAdapter::default().normalize(raw, &Params::new()).unwrap();

        assert_eq!(normalized["bid_to_cover"], 2.48);
        assert_eq!(normalized["high_yield"], 4.125);
        assert_eq!(normalized["auction_date"], "2026-10-08");
    }

    #[test]
    fn test_request_builds_filter() {
        let params = Params::from([("security_term".to_string(), "2-Year".to_string())]);
        let request = TreasuryAdapter::default().request(&params, "").unwrap();
        assert!(request.query.contains(&(
            "filter".to_string(),
            "security_term:eq:2-Year,security_type:eq:Note".to_string()
        )));
    }
}
