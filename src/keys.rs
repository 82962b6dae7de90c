//! Cache key derivation
//!
//! Source keys are readable (`adapter:k=v&k=v`) so a prefix clears one
//! adapter. Model keys hash the payload, since payloads are large.

use crate::Result;
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

/// Deterministic key for one adapter request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceKey(String);

impl SourceKey {
    /// Parameters are taken from a `BTreeMap`, so ordering is normalized.
    pub fn new(adapter: &str, params: &BTreeMap<String, String>) -> Self {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
            .collect::<Vec<_>>()
            .join("&");
        SourceKey(format!("{}:{}", escape(adapter), query))
    }

    /// Prefix shared by every key of one adapter.
    pub fn adapter_prefix(adapter: &str) -> String {
        format!("{}:", escape(adapter))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Escape the separator characters so distinct requests never collide.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    out
}

/// Key for a model call: task name plus a digest of the rounded payload.
pub fn model_cache_key(task: &str, payload: &Value) -> Result<String> {
    Ok(format!("model:{}:{}", task, payload_digest(payload)?))
}

/// First 16 hex chars of SHA-256 over the canonical payload.
pub fn payload_digest(payload: &Value) -> Result<String> {
    let canonical = canonicalize(payload);
    let mut hasher = Sha256::new();

    // Stream JSON directly into hasher (no intermediate String)
    serde_json::to_writer(&mut HashWriter(&mut hasher), &canonical)?;

    let digest = hex::encode(hasher.finalize());
    Ok(digest[..16].to_string())
}

/// Rounds floats to two decimals and sorts object keys, so payloads whose
/// numbers round the same share a key. Numbers too large to round are kept
/// as they are.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .map(|f| (f * 100.0).round() / 100.0)
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| value.clone()),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            let mut out = Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Hex SHA-256 of an arbitrary string, used for file names.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_source_key_is_order_independent() {
        let a = params(&[("series_id", "DGS10"), ("limit", "30")]);
        let b = params(&[("limit", "30"), ("series_id", "DGS10")]);
        assert_eq!(SourceKey::new("economic", &a), SourceKey::new("economic", &b));
        assert_eq!(
            SourceKey::new("economic", &a).as_str(),
            "economic:limit=30&series_id=DGS10"
        );
    }

    #[test]
    fn test_source_key_escapes_separators() {
        let tricky = params(&[("q", "a&b=c")]);
        let split = params(&[("q", "a"), ("b", "c")]);
        assert_ne!(SourceKey::new("news", &tricky), SourceKey::new("news", &split));
        assert!(SourceKey::new("news", &tricky)
            .as_str()
            .starts_with(&SourceKey::adapter_prefix("news")));
    }

    #[test]
    fn test_distinct_adapters_do_not_collide() {
        let p = params(&[("query", "ai")]);
        assert_ne!(SourceKey::new("news", &p), SourceKey::new("research", &p));
    }

    #[test]
    fn test_payload_digest_rounds_numbers() {
        let a = json!({"vix": 18.004, "btc": {"price": 64000.001}});
        let b = json!({"btc": {"price": 64000.0}, "vix": 18.0});
        let c = json!({"vix": 18.2, "btc": {"price": 64000.0}});

        assert_eq!(payload_digest(&a).unwrap(), payload_digest(&b).unwrap());
        assert_ne!(payload_digest(&a).unwrap(), payload_digest(&c).unwrap());
        assert_eq!(payload_digest(&a).unwrap().len(), 16);
    }

    #[test]
    fn test_huge_floats_keep_distinct_keys() {
        // Both overflow when scaled for rounding
        let a = json!({"supply": 1.5e307});
        let b = json!({"supply": 1.7e307});

        assert_eq!(canonicalize(&a), a);
        assert_ne!(payload_digest(&a).unwrap(), payload_digest(&b).unwrap());
    }

    #[test]
    fn test_model_cache_key_includes_task() {
        let payload = json!({"x": 1});
        let key = model_cache_key("outlook", &payload).unwrap();
        assert!(key.starts_with("model:outlook:"));
        assert_eq!(key.len(), "model:outlook:".len() + 16);
        assert_ne!(key, model_cache_key("crash_analysis", &payload).unwrap());
    }
}
