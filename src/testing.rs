//! Test doubles shared by the unit tests

use crate::fetcher::{HttpRequest, HttpResponse, HttpTransport};
use crate::Result;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One canned reply.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply { status: u16, body: String },
    /// Sleeps before answering 200 `{}`; pair with a short timeout.
    Hang(Duration),
    /// Transport-level failure (connection refused and the like).
    Fail(String),
}

impl Scripted {
    pub fn json(status: u16, body: Value) -> Self {
        Scripted::Reply {
            status,
            body: body.to_string(),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Scripted::Reply {
            status,
            body: body.to_string(),
        }
    }

    pub fn status(status: u16) -> Self {
        Scripted::Reply {
            status,
            body: json!({"error": "scripted failure"}).to_string(),
        }
    }

    /// Chat-completions reply carrying `content`.
    pub fn chat(content: &str) -> Self {
        Scripted::json(
            200,
            json!({
                "choices": [{"message": {"role": "assistant", "content": content}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 20}
            }),
        )
    }
}

struct Route {
    matcher: String,
    replies: VecDeque<Scripted>,
}

/// Answers requests from scripted queues. A route matches when its fragment
/// occurs in the URL or equals the `model` field of a JSON body. The last
/// reply of a queue repeats forever.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, matcher: &str, replies: Vec<Scripted>) -> Self {
        if let Ok(mut routes) = self.routes.lock() {
            routes.push(Route {
                matcher: matcher.to_string(),
                replies: replies.into(),
            });
        }
        self
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, matcher: &str) -> usize {
        self.calls()
            .iter()
            .filter(|request| matches(matcher, request))
            .count()
    }

    /// Model names seen in POST bodies, in call order.
    pub fn models_called(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|r| r.body.as_ref())
            .filter_map(|b| b.get("model").and_then(Value::as_str))
            .map(String::from)
            .collect()
    }

    fn next_reply(&self, request: &HttpRequest) -> Option<Scripted> {
        let mut routes = self.routes.lock().ok()?;
        let route = routes.iter_mut().find(|r| matches(&r.matcher, request))?;
        if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        }
    }
}

fn matches(matcher: &str, request: &HttpRequest) -> bool {
    if request.url.contains(matcher) {
        return true;
    }
    request
        .body
        .as_ref()
        .and_then(|b| b.get("model"))
        .and_then(Value::as_str)
        .map(|model| model == matcher)
        .unwrap_or(false)
}

#[async_trait::async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }

        match self.next_reply(request) {
            Some(Scripted::Reply { status, body }) => Ok(HttpResponse {
                status,
                status_text: status_text(status).to_string(),
                body,
            }),
            Some(Scripted::Hang(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(HttpResponse {
                    status: 200,
                    status_text: "OK".into(),
                    body: "{}".into(),
                })
            }
            Some(Scripted::Fail(message)) => {
                Err(crate::OrchestrationError::NetworkError(message))
            }
            None => Ok(HttpResponse {
                status: 404,
                status_text: "Not Found".into(),
                body: String::new(),
            }),
        }
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}
