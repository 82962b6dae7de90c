//! Configurable thresholds and decision rules

use crate::error::OrchestrationError;
use crate::models::{Domain, Signal};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Comparison {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
}

impl Comparison {
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
        }
    }

    fn is_upper(&self) -> bool {
        matches!(self, Comparison::Gt | Comparison::Ge)
    }
}

//
// ================= Domain thresholds =================
//

/// `score <op> value` labels the domain `signal`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Threshold {
    pub op: Comparison,
    pub value: f64,
    pub signal: Signal,
}

/// Where a domain's score comes from and how it is labelled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainBinding {
    pub domain: Domain,
    pub dashboard: String,
    /// JSON pointer into the artifact's metrics.
    pub metric: String,
    /// Multiplier bringing the metric onto 0-100.
    #[serde(default = "unit_scale")]
    pub scale: f64,
    /// Checked in order; the first that holds wins.
    pub thresholds: Vec<Threshold>,
    pub otherwise: Signal,
    /// High scores point away from a constructive stance (risk).
    #[serde(default)]
    pub inverted: bool,
}

fn unit_scale() -> f64 {
    1.0
}

impl DomainBinding {
    pub fn classify(&self, score: f64) -> Signal {
        self.thresholds
            .iter()
            .find(|t| t.op.holds(score, t.value))
            .map(|t| t.signal)
            .unwrap_or(self.otherwise)
    }

    /// Thresholds on the same side must tighten monotonically, otherwise a
    /// later one can never fire.
    fn validate(&self) -> Result<()> {
        if self.scale <= 0.0 {
            return Err(OrchestrationError::config(format!(
                "{} binding has non-positive scale",
                self.domain
            )));
        }
        let mut last_upper: Option<f64> = None;
        let mut last_lower: Option<f64> = None;
        for threshold in &self.thresholds {
            if !(0.0..=100.0).contains(&threshold.value) {
                return Err(OrchestrationError::config(format!(
                    "{} threshold {} is outside 0-100",
                    self.domain, threshold.value
                )));
            }
            let shadowed = if threshold.op.is_upper() {
                let shadowed = last_upper.map_or(false, |prev| threshold.value >= prev);
                last_upper = Some(threshold.value);
                shadowed
            } else {
                let shadowed = last_lower.map_or(false, |prev| threshold.value <= prev);
                last_lower = Some(threshold.value);
                shadowed
            };
            if shadowed {
                return Err(OrchestrationError::config(format!(
                    "{} threshold {} {} is unreachable after an earlier one",
                    self.domain,
                    threshold.op.symbol(),
                    threshold.value
                )));
            }
        }
        if let (Some(upper), Some(lower)) = (
            self.thresholds.iter().filter(|t| t.op.is_upper()).map(|t| t.value).reduce(f64::min),
            self.thresholds.iter().filter(|t| !t.op.is_upper()).map(|t| t.value).reduce(f64::max),
        ) {
            if lower >= upper {
                return Err(OrchestrationError::config(format!(
                    "{} thresholds are inverted: lower band {} overlaps upper band {}",
                    self.domain, lower, upper
                )));
            }
        }
        Ok(())
    }
}

//
// ================= Decision rules =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clause {
    pub domain: Domain,
    pub op: Comparison,
    pub value: f64,
}

impl Clause {
    pub fn new(domain: Domain, op: Comparison, value: f64) -> Self {
        Self { domain, op, value }
    }

    /// A domain without a score never satisfies a clause.
    pub fn evaluate(&self, scores: &BTreeMap<Domain, f64>) -> bool {
        scores
            .get(&self.domain)
            .map_or(false, |score| self.op.holds(*score, self.value))
    }

    pub fn describe(&self) -> String {
        format!("{} {} {}", self.domain, self.op.symbol(), self.value)
    }
}

/// All clauses must hold for the rule to fire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRule {
    pub when: Vec<Clause>,
    pub action: String,
    pub confidence: f64,
    pub reasoning: String,
    /// Display text; derived from the clauses when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl DecisionRule {
    pub fn new(when: Vec<Clause>, action: &str, confidence: f64, reasoning: &str) -> Self {
        Self {
            when,
            action: action.to_string(),
            confidence,
            reasoning: reasoning.to_string(),
            condition: None,
        }
    }

    pub fn matches(&self, scores: &BTreeMap<Domain, f64>) -> bool {
        !self.when.is_empty() && self.when.iter().all(|clause| clause.evaluate(scores))
    }

    pub fn condition_text(&self) -> String {
        self.condition.clone().unwrap_or_else(|| {
            self.when
                .iter()
                .map(Clause::describe)
                .collect::<Vec<_>>()
                .join(" AND ")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefaultDecision {
    pub condition: String,
    pub action: String,
    pub confidence: f64,
    pub reasoning: String,
}

impl Default for DefaultDecision {
    fn default() -> Self {
        Self {
            condition: "No rule matched".to_string(),
            action: "Hold/Monitor".to_string(),
            confidence: 0.3,
            reasoning: "Signals are mixed; hold positions and wait for a clearer directional bias"
                .to_string(),
        }
    }
}

/// Net-signal buckets over the composite score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NetBuckets {
    /// At or above: BULLISH.
    pub bullish_at: f64,
    /// At or below: DEFENSIVE.
    pub defensive_at: f64,
}

impl Default for NetBuckets {
    fn default() -> Self {
        Self {
            bullish_at: 60.0,
            defensive_at: 40.0,
        }
    }
}

impl NetBuckets {
    pub fn classify(&self, score: f64) -> Signal {
        if score >= self.bullish_at {
            Signal::Bullish
        } else if score <= self.defensive_at {
            Signal::Defensive
        } else {
            Signal::Neutral
        }
    }
}

//
// ================= Synthesis configuration =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthesisConfig {
    pub domains: Vec<DomainBinding>,
    pub weights: BTreeMap<Domain, f64>,
    pub net: NetBuckets,
    pub rules: Vec<DecisionRule>,
    pub default_decision: DefaultDecision,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            domains: default_bindings(),
            weights: BTreeMap::from([
                (Domain::Risk, 0.35),
                (Domain::Crypto, 0.25),
                (Domain::Macro, 0.25),
                (Domain::Tech, 0.15),
            ]),
            net: NetBuckets::default(),
            rules: default_rules(),
            default_decision: DefaultDecision::default(),
        }
    }
}

impl SynthesisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.domains.is_empty() {
            return Err(OrchestrationError::config("synthesis needs at least one domain"));
        }
        for binding in &self.domains {
            binding.validate()?;
            if !self.weights.contains_key(&binding.domain) {
                return Err(OrchestrationError::config(format!(
                    "no weight configured for domain {}",
                    binding.domain
                )));
            }
        }
        if self.weights.values().any(|w| *w < 0.0) {
            return Err(OrchestrationError::config("domain weights must be non-negative"));
        }
        let total: f64 = self.weights.values().sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(OrchestrationError::config(format!(
                "domain weights must sum to 1, got {}",
                total
            )));
        }
        if self.net.defensive_at >= self.net.bullish_at {
            return Err(OrchestrationError::config(
                "net buckets are inverted: defensive_at must be below bullish_at",
            ));
        }
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.when.is_empty() {
                return Err(OrchestrationError::config(format!(
                    "decision rule {} ({}) has no clauses",
                    index, rule.action
                )));
            }
            if !(0.0..=1.0).contains(&rule.confidence) {
                return Err(OrchestrationError::config(format!(
                    "decision rule {} confidence must be within 0-1",
                    index
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.default_decision.confidence) {
            return Err(OrchestrationError::config(
                "default decision confidence must be within 0-1",
            ));
        }
        Ok(())
    }
}

fn threshold(op: Comparison, value: f64, signal: Signal) -> Threshold {
    Threshold { op, value, signal }
}

pub fn default_bindings() -> Vec<DomainBinding> {
    use Comparison::{Ge, Le};
    vec![
        DomainBinding {
            domain: Domain::Risk,
            dashboard: "the-shield".to_string(),
            metric: "/scores/risk_score".to_string(),
            scale: 1.0,
            thresholds: vec![
                threshold(Ge, 60.0, Signal::Defensive),
                threshold(Ge, 35.0, Signal::Cautious),
            ],
            otherwise: Signal::Calm,
            inverted: true,
        },
        DomainBinding {
            domain: Domain::Crypto,
            dashboard: "the-coin".to_string(),
            metric: "/scores/momentum_score".to_string(),
            scale: 1.0,
            thresholds: vec![
                threshold(Ge, 70.0, Signal::Bullish),
                threshold(Le, 30.0, Signal::Bearish),
            ],
            otherwise: Signal::Neutral,
            inverted: false,
        },
        DomainBinding {
            domain: Domain::Macro,
            dashboard: "the-map".to_string(),
            metric: "/scores/stance_strength".to_string(),
            scale: 10.0,
            thresholds: vec![
                threshold(Ge, 70.0, Signal::Positive),
                threshold(Le, 30.0, Signal::Negative),
            ],
            otherwise: Signal::Neutral,
            inverted: false,
        },
        DomainBinding {
            domain: Domain::Tech,
            dashboard: "the-frontier".to_string(),
            metric: "/scores/breakthrough_score".to_string(),
            scale: 10.0,
            thresholds: vec![
                threshold(Ge, 80.0, Signal::Bullish),
                threshold(Le, 30.0, Signal::Bearish),
            ],
            otherwise: Signal::Neutral,
            inverted: false,
        },
    ]
}

pub fn default_rules() -> Vec<DecisionRule> {
    use Comparison::{Gt, Lt};
    vec![
        DecisionRule::new(
            vec![
                Clause::new(Domain::Risk, Gt, 15.0),
                Clause::new(Domain::Crypto, Lt, 60.0),
                Clause::new(Domain::Macro, Lt, 60.0),
            ],
            "Go Defensive",
            0.9,
            "High risk with weak crypto and macro signals suggests defensive positioning",
        ),
        DecisionRule::new(
            vec![
                Clause::new(Domain::Risk, Lt, 10.0),
                Clause::new(Domain::Crypto, Gt, 70.0),
                Clause::new(Domain::Macro, Gt, 70.0),
            ],
            "Rotate to Growth",
            0.7,
            "Low risk with strong crypto and macro momentum suggests a growth opportunity",
        ),
        DecisionRule::new(
            vec![Clause::new(Domain::Risk, Gt, 20.0)],
            "Reduce Equity Exposure",
            0.85,
            "Elevated risk levels suggest trimming equity exposure",
        ),
        DecisionRule::new(
            vec![Clause::new(Domain::Crypto, Lt, 30.0)],
            "Watch Support Levels",
            0.75,
            "Crypto is oversold; monitor key support levels for a potential bounce",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        SynthesisConfig::default().validate().unwrap();
    }

    #[test]
    fn test_risk_bands() {
        let risk = &default_bindings()[0];
        assert_eq!(risk.classify(72.0), Signal::Defensive);
        assert_eq!(risk.classify(60.0), Signal::Defensive);
        assert_eq!(risk.classify(40.0), Signal::Cautious);
        assert_eq!(risk.classify(10.0), Signal::Calm);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut config = SynthesisConfig::default();
        config.weights.insert(Domain::Tech, 0.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shadowed_threshold_rejected() {
        let mut config = SynthesisConfig::default();
        config.domains[0].thresholds = vec![
            threshold(Comparison::Ge, 35.0, Signal::Cautious),
            threshold(Comparison::Ge, 60.0, Signal::Defensive),
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overlapping_bands_rejected() {
        let mut config = SynthesisConfig::default();
        config.domains[1].thresholds = vec![
            threshold(Comparison::Ge, 40.0, Signal::Bullish),
            threshold(Comparison::Le, 50.0, Signal::Bearish),
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rule_without_clauses_rejected() {
        let mut config = SynthesisConfig::default();
        config.rules.push(DecisionRule::new(vec![], "Anything", 0.5, "always"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_clause_on_missing_domain_is_false() {
        let clause = Clause::new(Domain::Risk, Comparison::Gt, 15.0);
        assert!(!clause.evaluate(&BTreeMap::new()));
        assert_eq!(clause.describe(), "Risk > 15");
    }

    #[test]
    fn test_rules_deserialize_from_symbols() {
        let rule: DecisionRule = serde_json::from_value(serde_json::json!({
            "when": [{"domain": "crypto", "op": "<=", "value": 25}],
            "action": "Accumulate",
            "confidence": 0.6,
            "reasoning": "Deeply oversold"
        }))
        .unwrap();
        assert_eq!(rule.when[0].op, Comparison::Le);
        assert_eq!(rule.condition_text(), "Crypto <= 25");
    }
}
