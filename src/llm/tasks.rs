//! Analysis tasks and their model chains
//!
//! Each `TaskType` carries its own prompts and sampling settings; adding a
//! task means adding a variant, and the compiler finds every match to extend.

use crate::models::{ModelCallSpec, ResponseFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    MarketAnalysis,
    CrashAnalysis,
    ResearchBriefing,
    Outlook,
}

const ANALYST_GUIDELINES: &str = "Guidelines:
- Ground every statement in the numbers provided
- Be structured and concise (under 200 words)
- Name the single most important risk
- Never invent data that is not in the payload";

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::MarketAnalysis,
        TaskType::CrashAnalysis,
        TaskType::ResearchBriefing,
        TaskType::Outlook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::MarketAnalysis => "market_analysis",
            TaskType::CrashAnalysis => "crash_analysis",
            TaskType::ResearchBriefing => "research_briefing",
            TaskType::Outlook => "outlook",
        }
    }

    pub fn system_prompt(&self) -> String {
        let role = match self {
            TaskType::MarketAnalysis => {
                "You are a markets analyst writing the daily note for a crypto and macro dashboard."
            }
            TaskType::CrashAnalysis => {
                "You are a risk officer assessing crash risk from volatility, rates and auction demand."
            }
            TaskType::ResearchBriefing => {
                "You are a technology analyst summarising research and product breakthroughs for investors."
            }
            TaskType::Outlook => {
                "You are the portfolio commander combining every desk's view into one outlook. \
                 Output strictly valid JSON."
            }
        };
        format!("{}\n\n{}", role, ANALYST_GUIDELINES)
    }

    /// User prompt embedding the serialized payload.
    pub fn build_prompt(&self, payload: &Value) -> String {
        let data = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
        match self {
            TaskType::MarketAnalysis => format!(
                "Analyse today's market data. Cover momentum, sentiment and what would change the view.\n\nDATA:\n{}",
                data
            ),
            TaskType::CrashAnalysis => format!(
                "Assess the probability of a sharp drawdown over the next two weeks. \
                 Explain which indicators drive the assessment.\n\nDATA:\n{}",
                data
            ),
            TaskType::ResearchBriefing => format!(
                "Brief an investor on the most significant developments below and their market relevance.\n\nDATA:\n{}",
                data
            ),
            TaskType::Outlook => format!(
                "Combine the desk scores and notes below into one outlook.\n\nDATA:\n{}\n\n\
                 REQUIRED JSON SCHEMA:\n\
                 {{\"stance\": \"string\", \"summary\": \"string\", \"risks\": [\"string\"], \"if_then\": \"string\"}}",
                data
            ),
        }
    }

    pub fn temperature(&self) -> f32 {
        match self {
            TaskType::MarketAnalysis => 0.4,
            TaskType::CrashAnalysis => 0.2,
            TaskType::ResearchBriefing => 0.5,
            TaskType::Outlook => 0.3,
        }
    }

    pub fn max_tokens(&self) -> u32 {
        match self {
            TaskType::MarketAnalysis | TaskType::ResearchBriefing => 600,
            TaskType::CrashAnalysis => 500,
            TaskType::Outlook => 900,
        }
    }

    pub fn expects_json(&self) -> bool {
        matches!(self, TaskType::Outlook)
    }

    pub fn call_spec(&self, payload: &Value, model: &str) -> ModelCallSpec {
        ModelCallSpec {
            prompt: self.build_prompt(payload),
            system_prompt: self.system_prompt(),
            model: model.to_string(),
            temperature: self.temperature(),
            max_tokens: self.max_tokens(),
            response_format: self.expects_json().then_some(ResponseFormat::Json),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary model plus ordered fallbacks for one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelChain {
    pub primary: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

impl ModelChain {
    pub fn new(primary: &str, fallbacks: &[&str]) -> Self {
        Self {
            primary: primary.to_string(),
            fallbacks: fallbacks.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Models in the order they are tried.
    pub fn models(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.fallbacks.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        1 + self.fallbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_embeds_payload() {
        let payload = json!({"vix": 18.4});
        let prompt = TaskType::CrashAnalysis.build_prompt(&payload);
        assert!(prompt.contains("\"vix\": 18.4"));
    }

    #[test]
    fn test_only_outlook_requests_json() {
        let spec = TaskType::Outlook.call_spec(&json!({}), "m1");
        assert_eq!(spec.response_format, Some(ResponseFormat::Json));
        assert!(TaskType::MarketAnalysis
            .call_spec(&json!({}), "m1")
            .response_format
            .is_none());
    }

    #[test]
    fn test_chain_order() {
        let chain = ModelChain::new("a", &["b", "c"]);
        assert_eq!(chain.models().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_task_names_match_serde() {
        for task in TaskType::ALL {
            assert_eq!(serde_json::to_value(task).unwrap(), task.as_str());
        }
    }
}
