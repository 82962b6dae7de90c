//! CoinGecko spot prices

use super::{expect_object, number, param, Params, SourceAdapter, SourceKind};
use crate::fetcher::HttpRequest;
use crate::Result;
use serde_json::{json, Map, Value};

pub struct CryptoAdapter {
    base_url: String,
}

impl CryptoAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for CryptoAdapter {
    fn default() -> Self {
        Self::new("https://api.coingecko.com/api/v3")
    }
}

impl SourceAdapter for CryptoAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Crypto
    }

    fn request(&self, params: &Params, _api_key: &str) -> Result<HttpRequest> {
        Ok(HttpRequest::get(format!("{}/simple/price", self.base_url))
            .query("ids", param(params, "ids", "bitcoin,ethereum"))
            .query("vs_currencies", "usd")
            .query("include_24hr_change", "true"))
    }

    fn normalize(&self, raw: Value, _params: &Params) -> Result<Value> {
        let body = expect_object(&raw, "crypto")?;
        let mut assets = Map::new();
        for (id, quote) in body {
            let price = quote.get("usd").and_then(number);
            if price.is_none() {
                continue;
            }
            assets.insert(
                id.clone(),
                json!({
                    "price_usd": price,
                    "change_24h": quote.get("usd_24h_change").and_then(number),
                }),
            );
        }
        Ok(json!({ "assets": assets }))
    }

    fn empty(&self, _params: &Params) -> Value {
        json!({ "assets": {} })
    }
}
