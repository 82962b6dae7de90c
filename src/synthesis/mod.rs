//! Cross-dashboard synthesis
//!
//! Pure functions over one run's artifacts: no I/O, inputs are only read.
//! The report always covers every configured domain and always carries
//! exactly one decision.

pub mod rules;

pub use rules::{
    Clause, Comparison, DecisionRule, DefaultDecision, DomainBinding, NetBuckets,
    SynthesisConfig, Threshold,
};

use crate::models::{
    AggregateReport, Decision, Direction, Domain, DomainSignal, JobArtifact, NetSignal, Signal,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Score used for a domain whose metric is missing.
const NEUTRAL_SCORE: f64 = 50.0;

/// Conflict matrix plus the domains that fell back to neutral or come from
/// a degraded artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictMatrix {
    pub cells: BTreeMap<Domain, DomainSignal>,
    pub degraded: Vec<Domain>,
}

impl ConflictMatrix {
    /// Scores of domains that actually reported, for rule evaluation.
    pub fn known_scores(&self) -> BTreeMap<Domain, f64> {
        self.cells
            .iter()
            .filter(|(_, cell)| cell.signal != Signal::Unknown)
            .map(|(domain, cell)| (*domain, cell.score))
            .collect()
    }
}

pub struct Synthesizer {
    config: SynthesisConfig,
}

impl Synthesizer {
    pub fn new(config: SynthesisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    pub fn conflict_matrix(&self, artifacts: &[JobArtifact]) -> ConflictMatrix {
        let mut cells = BTreeMap::new();
        let mut degraded = Vec::new();

        for binding in &self.config.domains {
            let artifact = artifacts.iter().find(|a| a.dashboard == binding.dashboard);
            let score = artifact.and_then(|a| metric_score(a, binding));

            let cell = match score {
                Some(score) => {
                    let signal = binding.classify(score);
                    DomainSignal {
                        signal,
                        score,
                        color: signal.color().to_string(),
                    }
                }
                None => DomainSignal {
                    signal: Signal::Unknown,
                    score: NEUTRAL_SCORE,
                    color: Signal::Unknown.color().to_string(),
                },
            };

            if score.is_none() || artifact.map_or(true, JobArtifact::is_degraded) {
                degraded.push(binding.domain);
            }
            cells.insert(binding.domain, cell);
        }

        ConflictMatrix { cells, degraded }
    }

    /// Weighted composite. Inverted domains contribute `100 - score` so every
    /// term points the same way; confidence is the share of domains whose
    /// signal leans the same way as the net signal.
    pub fn composite(&self, matrix: &ConflictMatrix) -> NetSignal {
        let net_score: f64 = self
            .config
            .domains
            .iter()
            .filter_map(|binding| {
                let cell = matrix.cells.get(&binding.domain)?;
                let weight = self.config.weights.get(&binding.domain).copied()?;
                let term = if binding.inverted && cell.signal != Signal::Unknown {
                    100.0 - cell.score
                } else {
                    cell.score
                };
                Some(term * weight)
            })
            .sum();
        let net_score = round_to(net_score, 1);

        let signal = self.config.net.classify(net_score);
        let direction = signal.direction();
        let total = matrix.cells.len();
        let agreeing = matrix
            .cells
            .values()
            .filter(|cell| cell.signal.direction() == direction && direction != Direction::Unknown)
            .count();
        let confidence = if total == 0 {
            0.0
        } else {
            round_to(agreeing as f64 / total as f64, 2)
        };

        NetSignal {
            signal,
            score: net_score,
            confidence,
            color: signal.color().to_string(),
        }
    }

    /// First matching rule, or the default decision.
    pub fn decide(&self, scores: &BTreeMap<Domain, f64>) -> Decision {
        match self
            .config
            .rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(scores))
        {
            Some((index, rule)) => Decision {
                condition: rule.condition_text(),
                action: rule.action.clone(),
                confidence: rule.confidence,
                reasoning: rule.reasoning.clone(),
                rule_index: Some(index),
            },
            None => {
                let fallback = &self.config.default_decision;
                Decision {
                    condition: fallback.condition.clone(),
                    action: fallback.action.clone(),
                    confidence: fallback.confidence,
                    reasoning: fallback.reasoning.clone(),
                    rule_index: None,
                }
            }
        }
    }

    pub fn synthesize(&self, artifacts: &[JobArtifact]) -> AggregateReport {
        self.synthesize_at(artifacts, Utc::now())
    }

    pub fn synthesize_at(&self, artifacts: &[JobArtifact], generated_at: DateTime<Utc>) -> AggregateReport {
        let matrix = self.conflict_matrix(artifacts);
        let net_signal = self.composite(&matrix);
        let decision_tree = self.decide(&matrix.known_scores());

        AggregateReport {
            generated_at,
            conflict_matrix: matrix.cells,
            net_signal,
            decision_tree,
            degraded_domains: matrix.degraded,
        }
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new(SynthesisConfig::default())
    }
}

fn metric_score(artifact: &JobArtifact, binding: &DomainBinding) -> Option<f64> {
    artifact
        .metrics
        .pointer(&binding.metric)
        .and_then(|v| v.as_f64())
        .filter(|v| v.is_finite())
        .map(|v| round_to((v * binding.scale).clamp(0.0, 100.0), 1))
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobStatus;
    use serde_json::{json, Value};

    fn artifact(dashboard: &str, scores: Value) -> JobArtifact {
        JobArtifact {
            dashboard: dashboard.to_string(),
            generated_at: Utc::now(),
            metrics: json!({ "scores": scores }),
            ai_analysis: "note".to_string(),
            data_sources: vec![],
            status: JobStatus::Completed,
            model: None,
            structured: None,
            errors: vec![],
        }
    }

    fn full_run(risk: f64, momentum: f64, stance: f64, breakthrough: f64) -> Vec<JobArtifact> {
        vec![
            artifact("the-shield", json!({ "risk_score": risk })),
            artifact("the-coin", json!({ "momentum_score": momentum })),
            artifact("the-map", json!({ "stance_strength": stance })),
            artifact("the-frontier", json!({ "breakthrough_score": breakthrough })),
        ]
    }

    #[test]
    fn test_conflict_matrix_labels_each_domain() {
        let report = Synthesizer::default().synthesize(&full_run(65.0, 75.0, 2.5, 5.0));

        let risk = &report.conflict_matrix[&Domain::Risk];
        assert_eq!(risk.signal, Signal::Defensive);
        assert_eq!(risk.color, "#dc3545");
        assert_eq!(report.conflict_matrix[&Domain::Crypto].signal, Signal::Bullish);
        assert_eq!(report.conflict_matrix[&Domain::Macro].score, 25.0);
        assert_eq!(report.conflict_matrix[&Domain::Macro].signal, Signal::Negative);
        assert_eq!(report.conflict_matrix[&Domain::Tech].signal, Signal::Neutral);
        assert!(report.degraded_domains.is_empty());
    }

    #[test]
    fn test_composite_inverts_risk() {
        // (100-20)*0.35 + 80*0.25 + 70*0.25 + 80*0.15 = 77.5
        let report = Synthesizer::default().synthesize(&full_run(20.0, 80.0, 7.0, 8.0));

        assert_eq!(report.net_signal.score, 77.5);
        assert_eq!(report.net_signal.signal, Signal::Bullish);
        // Calm risk, bullish crypto, positive macro and bullish tech all agree
        assert_eq!(report.net_signal.confidence, 1.0);
    }

    #[test]
    fn test_missing_domain_is_unknown_and_never_agrees() {
        let mut artifacts = full_run(20.0, 80.0, 7.0, 8.0);
        artifacts.retain(|a| a.dashboard != "the-frontier");

        let report = Synthesizer::default().synthesize(&artifacts);
        let tech = &report.conflict_matrix[&Domain::Tech];

        assert_eq!(tech.signal, Signal::Unknown);
        assert_eq!(tech.score, 50.0);
        assert_eq!(tech.color, "#718096");
        assert_eq!(report.degraded_domains, vec![Domain::Tech]);
        assert_eq!(report.conflict_matrix.len(), 4);
        assert_eq!(report.net_signal.confidence, 0.75);
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let synthesizer = Synthesizer::default();
        let scores = BTreeMap::from([
            (Domain::Risk, 25.0),
            (Domain::Crypto, 40.0),
            (Domain::Macro, 50.0),
        ]);

        // Both "Go Defensive" and "Reduce Equity Exposure" hold
        let decision = synthesizer.decide(&scores);
        assert_eq!(decision.action, "Go Defensive");
        assert_eq!(decision.rule_index, Some(0));
        assert_eq!(decision.condition, "Risk > 15 AND Crypto < 60 AND Macro < 60");
    }

    #[test]
    fn test_default_decision_when_nothing_matches() {
        let scores = BTreeMap::from([
            (Domain::Risk, 12.0),
            (Domain::Crypto, 50.0),
            (Domain::Macro, 50.0),
        ]);
        let decision = Synthesizer::default().decide(&scores);

        assert_eq!(decision.action, "Hold/Monitor");
        assert_eq!(decision.rule_index, None);
        assert!(decision.confidence < 0.5);
    }

    #[test]
    fn test_exactly_one_decision_for_any_scores() {
        let synthesizer = Synthesizer::default();
        for risk in (0..=100).step_by(5) {
            for crypto in (0..=100).step_by(10) {
                for macro_score in (0..=100).step_by(10) {
                    let scores = BTreeMap::from([
                        (Domain::Risk, risk as f64),
                        (Domain::Crypto, crypto as f64),
                        (Domain::Macro, macro_score as f64),
                    ]);
                    let decision = synthesizer.decide(&scores);
                    let first_match = synthesizer
                        .config()
                        .rules
                        .iter()
                        .position(|rule| rule.matches(&scores));
                    assert_eq!(decision.rule_index, first_match);
                }
            }
        }
    }

    #[test]
    fn test_inputs_are_not_mutated() {
        let artifacts = full_run(40.0, 50.0, 5.0, 5.0);
        let before = artifacts.clone();
        let synthesizer = Synthesizer::default();
        let now = Utc::now();

        let first = synthesizer.synthesize_at(&artifacts, now);
        let second = synthesizer.synthesize_at(&artifacts, now);

        assert_eq!(artifacts, before);
        assert_eq!(first, second);
    }

    #[test]
    fn test_report_wire_format() {
        let report = Synthesizer::default().synthesize(&full_run(40.0, 50.0, 5.0, 5.0));
        let value = serde_json::to_value(&report).unwrap();

        assert!(value.get("generatedAt").is_some());
        assert_eq!(value["conflict_matrix"]["risk"]["signal"], "CAUTIOUS");
        assert!(value["net_signal"]["confidence"].is_number());
        assert!(value["decision_tree"]["action"].is_string());
    }
}
