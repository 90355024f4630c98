//! Inbound webhook verification.
//!
//! Checked before the body is parsed. Token signature validation belongs to the chat framework;
//! the gateway only enforces that a bearer credential is present (and matches, when configured).

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use secrecy::{ExposeSecret, Secret};

use crate::config::{GatewayAuthConfig, GatewayAuthMode};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing Authorization header")]
    Missing,
    #[error("Authorization header is not a bearer token")]
    NotBearer,
    #[error("bearer token rejected")]
    Rejected,
}

#[async_trait]
pub trait RequestVerifier: Send + Sync {
    async fn verify(&self, headers: &HeaderMap) -> Result<(), AuthError>;
}

/// Requires `Authorization: Bearer <token>`; with `expected` set the token must match exactly.
pub struct BearerVerifier {
    expected: Option<Secret<String>>,
}

impl BearerVerifier {
    pub fn new(expected: Option<String>) -> Self {
        Self {
            expected: expected
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .map(Secret::new),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::Missing)?
        .to_str()
        .map_err(|_| AuthError::NotBearer)?;
    let (scheme, token) = value.split_once(' ').ok_or(AuthError::NotBearer)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::NotBearer);
    }
    Ok(token)
}

#[async_trait]
impl RequestVerifier for BearerVerifier {
    async fn verify(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let token = bearer_token(headers)?;
        match &self.expected {
            Some(expected) if expected.expose_secret() != token => Err(AuthError::Rejected),
            _ => Ok(()),
        }
    }
}

/// Accepts everything. Only built for loopback binds (local emulator).
pub struct NoVerification;

#[async_trait]
impl RequestVerifier for NoVerification {
    async fn verify(&self, _headers: &HeaderMap) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Build the verifier for the configured auth mode.
pub fn verifier_for(auth: &GatewayAuthConfig) -> Box<dyn RequestVerifier> {
    match auth.mode {
        GatewayAuthMode::BotFramework => Box::new(BearerVerifier::new(auth.token.clone())),
        GatewayAuthMode::None => Box::new(NoVerification),
    }
}
