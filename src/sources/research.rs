//! Research feed (Hacker News search)

use super::{expect_object, number, param, text, Params, SourceAdapter, SourceKind};
use crate::fetcher::HttpRequest;
use crate::Result;
use serde_json::{json, Value};

pub struct ResearchAdapter {
    base_url: String,
}

impl ResearchAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for ResearchAdapter {
    fn default() -> Self {
        Self::new("https://hn.algolia.com/api/v1")
    }
}

impl SourceAdapter for ResearchAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Research
    }

    fn request(&self, params: &Params, _api_key: &str) -> Result<HttpRequest> {
        Ok(HttpRequest::get(format!("{}/search", self.base_url))
            .query("query", param(params, "query", "artificial intelligence"))
            .query("tags", "story")
            .query("hitsPerPage", param(params, "hits", "20")))
    }

    fn normalize(&self, raw: Value, params: &Params) -> Result<Value> {
        let body = expect_object(&raw, "research")?;
        let items: Vec<Value> = body
            .get("hits")
            .and_then(Value::as_array)
            .map(|hits| {
                hits.iter()
                    .map(|hit| {
                        json!({
                            "title": text(&hit["title"]),
                            "url": text(&hit["url"]),
                            "points": hit.get("points").and_then(number).unwrap_or(0.0),
                            "comments": hit.get("num_comments").and_then(number).unwrap_or(0.0),
                            "created_at": text(&hit["created_at"]),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let total = body
            .get("nbHits")
            .and_then(number)
            .unwrap_or(items.len() as f64) as u64;

        Ok(json!({
            "query": param(params, "query", "artificial intelligence"),
            "total": total,
            "items": items,
        }))
    }

    fn empty(&self, params: &Params) -> Value {
        json!({
            "query": param(params, "query", "artificial intelligence"),
            "total": 0,
            "items": [],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_hits() {
        let raw = json!({
            "nbHits": 512,
            "hits": [
                {"title": "New reasoning model", "url": "https://x.test", "points": 340, "num_comments": 120},
                {"title": "Ask HN", "url": null, "points": null}
            ]
        });
        let normalized = ResearchAdapter::default().normalize(raw, &Params::new()).unwrap();

        assert_eq!(normalized["total"], 512);
        assert_eq!(normalized["items"][0]["points"], 340.0);
        assert_eq!(normalized["items"][1]["points"], 0.0);
        assert_eq!(normalized["items"][1]["url"], Value::Null);
    }
}
