//! Structured output extraction from free-form model text

use crate::error::OrchestrationError;
use crate::Result;
use serde_json::Value;

/// Parse JSON out of model output. Tried in order: the whole text, the body
/// of the first fenced code block, the span from the first `{` to the last `}`.
pub fn extract_json(content: &str) -> Result<Value> {
    let trimmed = content.trim();

    if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
        return Ok(parsed);
    }

    if let Some(body) = fenced_body(trimmed) {
        if let Ok(parsed) = serde_json::from_str::<Value>(body) {
            return Ok(parsed);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(parsed) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Ok(parsed);
            }
        }
    }

    Err(OrchestrationError::parse(format!(
        "no JSON object found in model output ({} chars)",
        content.len()
    )))
}

/// Body of the first ``` block, skipping an optional language tag.
fn fenced_body(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_three_shapes_yield_same_object() {
        let expected = json!({"stance": "defensive", "risks": ["rates", "vol"]});
        let raw = expected.to_string();
        let fenced = format!("Here you go:\n```json\n{}\n```\nDone.", raw);
        let inline = format!("My outlook is {} as of today.", raw);

        assert_eq!(extract_json(&raw).unwrap(), expected);
        assert_eq!(extract_json(&fenced).unwrap(), expected);
        assert_eq!(extract_json(&inline).unwrap(), expected);
    }

    #[test]
    fn test_untagged_fence() {
        let fenced = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json(fenced).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_no_json_is_parse_error() {
        let err = extract_json("The market looks calm today.").unwrap_err();
        assert!(matches!(err, OrchestrationError::ParseError(_)));

        let broken = extract_json("partial {\"a\": ").unwrap_err();
        assert!(matches!(broken, OrchestrationError::ParseError(_)));
    }
}
