//! OpenRouter-compatible chat completions wire format

use crate::config::ModelConfig;
use crate::error::OrchestrationError;
use crate::fetcher::HttpRequest;
use crate::models::{ModelCallSpec, ResponseFormat};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormatBody>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormatBody {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// Build the HTTP request for one model call.
pub fn chat_request(config: &ModelConfig, spec: &ModelCallSpec, api_key: &str) -> Result<HttpRequest> {
    let body = ChatRequest {
        model: &spec.model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: &spec.system_prompt,
            },
            ChatMessage {
                role: "user",
                content: &spec.prompt,
            },
        ],
        temperature: spec.temperature,
        max_tokens: spec.max_tokens,
        response_format: spec.response_format.map(|format| match format {
            ResponseFormat::Json => ResponseFormatBody {
                kind: "json_object",
            },
        }),
    };

    Ok(HttpRequest::post_json(&config.endpoint, serde_json::to_value(&body)?)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("HTTP-Referer", config.referer.as_str())
        .header("X-Title", config.title.as_str()))
}

/// Content and usage of a reply. Missing or blank content is an error so the
/// router moves to the next model.
pub fn parse_reply(body: Value) -> Result<(String, Option<Value>)> {
    let response: ChatResponse = serde_json::from_value(body)
        .map_err(|e| OrchestrationError::parse(format!("malformed chat reply: {}", e)))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| OrchestrationError::parse("model returned empty content"))?;

    Ok((content, response.usage))
}
