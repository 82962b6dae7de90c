//! Dashboard metrics
//!
//! Turns a job's fetched sources into the `metrics` block of its artifact:
//! the normalized data per source label, an ok/error flag per label and the
//! derived scores the synthesizer reads. Only sources that fetched cleanly
//! feed a score; a score with no usable inputs is omitted.

use crate::models::{FetchResult, JobArtifact};
use crate::sources::{SourceKind, SourceRequest};
use serde_json::{json, Map, Value};

/// Characters of another dashboard's analysis passed along as context.
const CONTEXT_EXCERPT: usize = 600;

pub fn build_metrics(requests: &[SourceRequest], results: &[FetchResult]) -> Value {
    let mut sources = Map::new();
    let mut status = Map::new();
    for result in results {
        sources.insert(result.source.clone(), result.data.clone());
        let flag = if result.is_degraded() { "error" } else { "ok" };
        status.insert(result.source.clone(), json!(flag));
    }

    let inputs = Inputs::collect(requests, results);
    json!({
        "sources": sources,
        "source_status": status,
        "scores": inputs.scores(),
    })
}

/// What later waves see of an earlier dashboard.
pub fn context_entry(artifact: &JobArtifact) -> Value {
    let excerpt: String = artifact.ai_analysis.chars().take(CONTEXT_EXCERPT).collect();
    json!({
        "status": artifact.status,
        "scores": artifact.metrics.get("scores").cloned().unwrap_or_else(|| json!({})),
        "analysis": excerpt,
    })
}

/// Raw readings pulled out of the healthy sources.
#[derive(Debug, Default, PartialEq)]
struct Inputs {
    vix: Option<f64>,
    ten_year: Option<f64>,
    fed_funds: Option<f64>,
    dollar: Option<f64>,
    bid_to_cover: Option<f64>,
    btc_change: Option<f64>,
    fear_greed: Option<f64>,
    research_points: Option<Vec<f64>>,
}

impl Inputs {
    fn collect(requests: &[SourceRequest], results: &[FetchResult]) -> Self {
        let mut inputs = Inputs::default();
        for (request, result) in requests.iter().zip(results) {
            if result.is_degraded() {
                continue;
            }
            let data = &result.data;
            match request.kind {
                SourceKind::Economic => {
                    let latest = data.get("latest").and_then(Value::as_f64);
                    match data.get("series_id").and_then(Value::as_str) {
                        Some("VIXCLS") => inputs.vix = latest.or(inputs.vix),
                        Some("DGS10") => inputs.ten_year = latest.or(inputs.ten_year),
                        Some("FEDFUNDS") | Some("DFF") => {
                            inputs.fed_funds = latest.or(inputs.fed_funds)
                        }
                        Some("DTWEXBGS") => inputs.dollar = latest.or(inputs.dollar),
                        _ => {}
                    }
                }
                SourceKind::Treasury => {
                    inputs.bid_to_cover = data.get("bid_to_cover").and_then(Value::as_f64);
                    if inputs.ten_year.is_none() {
                        inputs.ten_year = data.get("high_yield").and_then(Value::as_f64);
                    }
                }
                SourceKind::Crypto => {
                    inputs.btc_change = data
                        .pointer("/assets/bitcoin/change_24h")
                        .and_then(Value::as_f64);
                }
                SourceKind::Sentiment => {
                    inputs.fear_greed = data.get("value").and_then(Value::as_f64);
                }
                SourceKind::Research => {
                    let points = data
                        .get("items")
                        .and_then(Value::as_array)
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(|item| item.get("points").and_then(Value::as_f64))
                                .collect()
                        })
                        .unwrap_or_default();
                    inputs.research_points = Some(points);
                }
                SourceKind::News => {}
            }
        }
        inputs
    }

    fn scores(&self) -> Value {
        let mut scores = Map::new();

        // 0-100, higher means more stress
        let risk = weighted(&[
            (self.vix.map(|v| ramp(v, 12.0, 40.0)), 0.6),
            (self.ten_year.map(|y| ramp(y, 3.0, 5.5)), 0.25),
            (self.bid_to_cover.map(|b| 100.0 - ramp(b, 2.0, 2.8)), 0.15),
        ]);
        if let Some(risk) = risk {
            scores.insert("risk_score".into(), json!(round1(risk)));
        }

        // 0-100, 50 is flat
        let momentum = weighted(&[
            (self.btc_change.map(|c| ramp(c, -10.0, 10.0)), 0.6),
            (self.fear_greed.map(|f| f.clamp(0.0, 100.0)), 0.4),
        ]);
        if let Some(momentum) = momentum {
            scores.insert("momentum_score".into(), json!(round1(momentum)));
        }

        // 0-10, higher means more accommodative
        let stance = weighted(&[
            (self.fed_funds.map(|f| 100.0 - ramp(f, 0.0, 6.0)), 1.0),
            (self.ten_year.map(|y| 100.0 - ramp(y, 2.0, 5.5)), 1.0),
            (self.dollar.map(|d| 100.0 - ramp(d, 100.0, 130.0)), 1.0),
        ]);
        if self.fed_funds.is_some() || self.dollar.is_some() {
            if let Some(stance) = stance {
                scores.insert("stance_strength".into(), json!(round1(stance / 10.0)));
            }
        }

        // 0-10, average community traction of the research feed
        if let Some(points) = &self.research_points {
            let average = if points.is_empty() {
                0.0
            } else {
                points.iter().sum::<f64>() / points.len() as f64
            };
            scores.insert(
                "breakthrough_score".into(),
                json!(round1((average / 30.0).min(10.0))),
            );
        }

        Value::Object(scores)
    }
}

/// Linear map of `value` from `[low, high]` onto `[0, 100]`, clamped.
fn ramp(value: f64, low: f64, high: f64) -> f64 {
    ((value - low) / (high - low) * 100.0).clamp(0.0, 100.0)
}

/// Weighted mean over the components that are present.
fn weighted(components: &[(Option<f64>, f64)]) -> Option<f64> {
    let (sum, weight) = components
        .iter()
        .filter_map(|(value, weight)| value.map(|v| (v * weight, *weight)))
        .fold((0.0, 0.0), |(s, w), (v, wt)| (s + v, w + wt));
    (weight > 0.0).then(|| sum / weight)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
