//! Reply delivery through the bot connector service.
//!
//! Replies are posted to the conversation's `serviceUrl` with a client-credentials token
//! obtained from the bot app id and password.

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::channels::activity::{ConversationReference, OutboundActivity};
use crate::config::ConnectorConfig;

/// Tokens are refreshed this long before they expire.
const REFRESH_SKEW: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("connector request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("token request failed: {0}")]
    Token(String),
    #[error("send failed: {0}")]
    Send(String),
}

/// Delivers an outbound activity into the conversation it answers.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send_activity(
        &self,
        reference: &ConversationReference,
        activity: &OutboundActivity,
    ) -> Result<(), ChannelError>;
}

#[derive(Clone)]
struct CachedToken {
    token: Secret<String>,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        self.expires_at > Instant::now() + REFRESH_SKEW
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// Bot connector client. One instance is shared by all turns.
pub struct ConnectorClient {
    app_id: Secret<String>,
    app_password: Secret<String>,
    token_url: String,
    scope: String,
    client: reqwest::Client,
    /// Per-request deadline for both the token and the send call.
    timeout: Duration,
    token: Mutex<Option<CachedToken>>,
}

impl ConnectorClient {
    pub fn new(
        config: &ConnectorConfig,
        app_id: Secret<String>,
        app_password: Secret<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            app_id,
            app_password,
            token_url: config.resolve_token_url(),
            scope: config.oauth_scope.clone(),
            client,
            timeout: config.timeout(),
            token: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn access_token(&self) -> Result<Secret<String>, ChannelError> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref().filter(|t| t.is_valid()) {
            return Ok(cached.token.clone());
        }

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.app_id.expose_secret().as_str()),
            ("client_secret", self.app_password.expose_secret().as_str()),
            ("scope", self.scope.as_str()),
        ];
        let res = self
            .client
            .post(&self.token_url)
            .timeout(self.timeout)
            .form(&form)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Token(format!("{} {}", status, body)));
        }
        let body: TokenResponse = res.json().await?;
        let ttl = body.expires_in.unwrap_or(3600).max(120);
        let cached = CachedToken {
            token: Secret::new(body.access_token),
            expires_at: Instant::now() + Duration::from_secs(ttl),
        };
        let token = cached.token.clone();
        *guard = Some(cached);
        log::debug!("connector: refreshed access token (ttl {}s)", ttl);
        Ok(token)
    }
}

/// `{serviceUrl}/v3/conversations/{id}/activities[/{replyToId}]`
pub fn activities_url(reference: &ConversationReference) -> String {
    let base = format!(
        "{}/v3/conversations/{}/activities",
        reference.service_url.trim_end_matches('/'),
        urlencoding::encode(&reference.conversation_id)
    );
    match &reference.activity_id {
        Some(id) => format!("{}/{}", base, urlencoding::encode(id)),
        None => base,
    }
}

#[async_trait]
impl ChannelSender for ConnectorClient {
    async fn send_activity(
        &self,
        reference: &ConversationReference,
        activity: &OutboundActivity,
    ) -> Result<(), ChannelError> {
        let token = self.access_token().await?;
        let url = activities_url(reference);
        let res = self
            .client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .timeout(self.timeout)
            .json(&activity.to_payload(reference))
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Send(format!("{} {}", status, body)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reference(service_url: &str) -> ConversationReference {
        ConversationReference {
            service_url: service_url.to_string(),
            channel_id: "msteams".into(),
            conversation_id: "a:conv/1".into(),
            activity_id: Some("act-1".into()),
            bot: None,
            user: None,
        }
    }

    fn client(token_url: String) -> ConnectorClient {
        let config = ConnectorConfig {
            token_url: Some(token_url),
            ..ConnectorConfig::default()
        };
        ConnectorClient::new(
            &config,
            Secret::new("app-id".into()),
            Secret::new("app-pw".into()),
            reqwest::Client::new(),
        )
    }

    #[test]
    fn activities_url_encodes_ids() {
        let mut r = reference("https://smba.example.test/amer/");
        assert_eq!(
            activities_url(&r),
            "https://smba.example.test/amer/v3/conversations/a%3Aconv%2F1/activities/act-1"
        );
        r.activity_id = None;
        assert_eq!(
            activities_url(&r),
            "https://smba.example.test/amer/v3/conversations/a%3Aconv%2F1/activities"
        );
    }

    #[tokio::test]
    async fn sends_reply_with_cached_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("client_id=app-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v3/conversations/a%3Aconv%2F1/activities/act-1"))
            .and(header("authorization", "Bearer tok-1"))
            .and(body_partial_json(serde_json::json!({ "type": "message", "text": "hello" })))
            .respond_with(ResponseTemplate::new(201))
            .expect(2)
            .mount(&server)
            .await;

        let c = client(format!("{}/token", server.uri()));
        let r = reference(&server.uri());
        c.send_activity(&r, &OutboundActivity::message("hello")).await.unwrap();
        c.send_activity(&r, &OutboundActivity::message("hello")).await.unwrap();
    }

    #[tokio::test]
    async fn hung_token_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access_token": "t" }))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;
        let c = client(format!("{}/token", server.uri())).with_timeout(Duration::from_millis(300));

        let started = Instant::now();
        let err = c
            .send_activity(&reference(&server.uri()), &OutboundActivity::message("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Request(ref e) if e.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn hung_send_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access_token": "t" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v3/conversations/a%3Aconv%2F1/activities/act-1"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;
        let c = client(format!("{}/token", server.uri())).with_timeout(Duration::from_millis(300));
        let err = c
            .send_activity(&reference(&server.uri()), &OutboundActivity::message("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Request(ref e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn token_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let c = client(format!("{}/token", server.uri()));
        let err = c
            .send_activity(&reference(&server.uri()), &OutboundActivity::message("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Token(_)));
    }

    #[tokio::test]
    async fn connector_rejection_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access_token": "t" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v3/conversations/a%3Aconv%2F1/activities/act-1"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        let c = client(format!("{}/token", server.uri()));
        let err = c
            .send_activity(&reference(&server.uri()), &OutboundActivity::message("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Send(_)));
    }
}
