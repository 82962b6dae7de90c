//! NewsAPI headlines

use super::{expect_object, number, param, text, Params, SourceAdapter, SourceKind};
use crate::fetcher::HttpRequest;
use crate::Result;
use serde_json::{json, Value};

pub struct NewsAdapter {
    base_url: String,
}

impl NewsAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for NewsAdapter {
    fn default() -> Self {
        Self::new("https://newsapi.org")
    }
}

impl SourceAdapter for NewsAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::News
    }

    fn credential(&self) -> Option<&'static str> {
        Some("NEWS_API")
    }

    fn request(&self, params: &Params, api_key: &str) -> Result<HttpRequest> {
        Ok(HttpRequest::get(format!("{}/v2/everything", self.base_url))
            .query("q", param(params, "q", "markets"))
            .query("pageSize", param(params, "page_size", "10"))
            .query("sortBy", "publishedAt")
            .query("language", "en")
            .header("X-Api-Key", api_key))
    }

    fn normalize(&self, raw: Value, _params: &Params) -> Result<Value> {
        let body = expect_object(&raw, "news")?;
        let articles: Vec<Value> = body
            .get("articles")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|a| {
                        json!({
                            "title": text(&a["title"]),
                            "source": text(&a["source"]["name"]),
                            "url": text(&a["url"]),
                            "published_at": text(&a["publishedAt"]),
                            "description": text(&a["description"]),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let total = body
            .get("totalResults")
            .and_then(number)
            .unwrap_or(articles.len() as f64) as u64;

        Ok(json!({ "total": total, "articles": articles }))
    }

    fn empty(&self, _params: &Params) -> Value {
        json!({ "total": 0, "articles": [] })
    }
}
