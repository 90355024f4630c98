//! Hosted inference endpoint client (model-serving `invocations` route).
//!
//! One POST per attempt with `{"messages":[{"role":"user","content":...}]}`; the reply is the first
//! choice's message content. Every failure mode becomes a [`ResponderOutcome::Failure`].

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{ResponderConfig, MAX_RESPONDER_ATTEMPTS};
use crate::llm::{FailureKind, Responder, ResponderOutcome};

/// Longest slice of an error body kept in failure detail.
const MAX_DETAIL_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct InvocationRequest<'a> {
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct InvocationResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ReplyMessage>,
}

/// Only `content` is read; `role` and any extra fields are ignored.
#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for the inference endpoint. Cheap to share; the inner connection pool is reused across turns.
#[derive(Clone)]
pub struct InferenceClient {
    endpoint_url: String,
    token: Secret<String>,
    timeout: Duration,
    attempts: u32,
    backoff: Duration,
    client: reqwest::Client,
}

impl InferenceClient {
    /// Single attempt, 30 second timeout.
    pub fn new(endpoint_url: impl Into<String>, token: Secret<String>, client: reqwest::Client) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            token,
            timeout: Duration::from_secs(30),
            attempts: 1,
            backoff: Duration::from_millis(500),
            client,
        }
    }

    pub fn from_config(
        config: &ResponderConfig,
        endpoint_url: impl Into<String>,
        token: Secret<String>,
        client: reqwest::Client,
    ) -> Self {
        Self::new(endpoint_url, token, client)
            .with_timeout(config.timeout())
            .with_retry(config.attempts(), config.backoff())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attempts are clamped to `1..=MAX_RESPONDER_ATTEMPTS`; backoff doubles after each failure.
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.clamp(1, MAX_RESPONDER_ATTEMPTS);
        self.backoff = backoff;
        self
    }

    /// One round trip to the endpoint.
    async fn invoke(&self, utterance: &str) -> ResponderOutcome {
        let body = InvocationRequest {
            messages: vec![RequestMessage {
                role: "user",
                content: utterance,
            }],
        };
        let res = match self
            .client
            .post(&self.endpoint_url)
            .bearer_auth(self.token.expose_secret())
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => return ResponderOutcome::failure(classify(&e), e.to_string()),
        };

        let status = res.status();
        let bytes = match res.bytes().await {
            Ok(b) => b,
            Err(e) => return ResponderOutcome::failure(classify(&e), e.to_string()),
        };
        if status != StatusCode::OK {
            let text = String::from_utf8_lossy(&bytes);
            let snippet: String = text.chars().take(MAX_DETAIL_BODY).collect();
            return ResponderOutcome::failure(
                FailureKind::BadStatus(status.as_u16()),
                format!("{} {}", status, snippet),
            );
        }
        match parse_reply(&bytes) {
            Ok(text) => ResponderOutcome::Success { text },
            Err(detail) => ResponderOutcome::failure(FailureKind::UnparsableResponse, detail),
        }
    }
}

fn classify(e: &reqwest::Error) -> FailureKind {
    if e.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::Unreachable
    }
}

/// First choice's message content from a success body.
fn parse_reply(bytes: &[u8]) -> Result<String, String> {
    let data: InvocationResponse =
        serde_json::from_slice(bytes).map_err(|e| format!("invalid response body: {}", e))?;
    data.choices
        .into_iter()
        .next()
        .ok_or_else(|| "response has no choices".to_string())?
        .message
        .and_then(|m| m.content)
        .ok_or_else(|| "first choice has no message content".to_string())
}

#[async_trait]
impl Responder for InferenceClient {
    async fn respond(&self, utterance: &str) -> ResponderOutcome {
        let mut backoff = self.backoff;
        let mut attempt = 1;
        loop {
            match self.invoke(utterance).await {
                ResponderOutcome::Failure { kind, detail }
                    if attempt < self.attempts && kind.is_retryable() =>
                {
                    log::debug!(
                        "inference attempt {} failed ({:?}): {}; retrying in {:?}",
                        attempt,
                        kind,
                        detail,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}
