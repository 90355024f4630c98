//! Gateway HTTP server: webhook route, health probe, startup and graceful shutdown.

use crate::channels::{verifier_for, ChannelSender, ConnectorClient, RequestVerifier};
use crate::config::{self, Config};
use crate::gateway::turn;
use crate::llm::{InferenceClient, Responder};
use crate::secrets::RelaySecrets;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Route the chat framework posts activities to.
pub const MESSAGES_PATH: &str = "/api/messages";

/// Shared, read-only state for all turns. Cloning is cheap.
#[derive(Clone)]
pub struct GatewayState {
    pub responder: Arc<dyn Responder>,
    pub channel: Arc<dyn ChannelSender>,
    pub verifier: Arc<dyn RequestVerifier>,
    /// Port reported by the health probe.
    pub port: u16,
    /// Reply text used whenever the responder fails.
    pub error_reply: Arc<str>,
}

impl GatewayState {
    pub fn new(
        responder: Arc<dyn Responder>,
        channel: Arc<dyn ChannelSender>,
        verifier: Arc<dyn RequestVerifier>,
        port: u16,
        error_reply: &str,
    ) -> Self {
        Self {
            responder,
            channel,
            verifier,
            port,
            error_reply: Arc::from(error_reply),
        }
    }

    /// Build production state: one pooled HTTP client shared by the inference and connector clients.
    pub fn from_config(config: &Config, secrets: &RelaySecrets) -> Result<Self> {
        let endpoint = config
            .responder
            .endpoint_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .context("responder.endpointUrl is not configured")?;
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("building HTTP client")?;
        let responder = InferenceClient::from_config(
            &config.responder,
            endpoint,
            secrets.inference_token.clone(),
            client.clone(),
        );
        let channel = ConnectorClient::new(
            &config.connector,
            secrets.app_id.clone(),
            secrets.app_password.clone(),
            client,
        );
        Ok(Self::new(
            Arc::new(responder),
            Arc::new(channel),
            Arc::from(verifier_for(&config.gateway.auth)),
            config.gateway.port,
            &config.responder.error_reply,
        ))
    }
}

/// Routes: `GET /` health, `POST /api/messages` webhook.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route(MESSAGES_PATH, post(messages))
        .with_state(state)
}

/// Run the gateway; binds to config.gateway.bind:config.gateway.port and blocks until shutdown.
/// Config must already be validated and secrets fetched; a bind failure is returned as an error.
pub async fn run_gateway(config: Config, secrets: RelaySecrets) -> Result<()> {
    config::validate(&config)?;
    let state = GatewayState::from_config(&config, &secrets)?;
    let app = router(state);

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Completes on SIGINT or SIGTERM. In-flight turns finish before the server returns.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// POST /api/messages — one chat activity per call.
async fn messages(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    turn::handle(&state, &headers, &body).await
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.port,
    }))
}
