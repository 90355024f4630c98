//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.botrelay/config.json`) and environment.
//! Secrets are never stored here; see [`crate::secrets`] for the names used to look them up.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on responder attempts regardless of config.
pub const MAX_RESPONDER_ATTEMPTS: u32 = 2;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Inference endpoint settings.
    #[serde(default)]
    pub responder: ResponderConfig,

    /// Bot connector (reply delivery) settings.
    #[serde(default)]
    pub connector: ConnectorConfig,

    /// Where secrets come from and what they are called.
    #[serde(default)]
    pub secrets: SecretsConfig,
}

/// Gateway bind, port, and inbound auth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 3978). Overridden by PORT env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "localhost"). Overridden by HOST env.
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Inbound request verification.
    #[serde(default)]
    pub auth: GatewayAuthConfig,
}

/// Inbound auth: bearer token required unless mode is none (loopback only).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAuthConfig {
    #[serde(default)]
    pub mode: GatewayAuthMode,

    /// When set, the inbound bearer token must equal this value.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GatewayAuthMode {
    /// Require `Authorization: Bearer ...` on every inbound activity.
    #[default]
    BotFramework,

    /// No verification; allowed only when bind is loopback (local emulator).
    None,
}

fn default_gateway_port() -> u16 {
    3978
}

fn default_gateway_bind() -> String {
    "localhost".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            auth: GatewayAuthConfig::default(),
        }
    }
}

/// Inference endpoint: URL, timeout and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponderConfig {
    /// Full URL of the serving endpoint's invocations route.
    pub endpoint_url: Option<String>,

    /// Per-attempt request timeout in seconds (default 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per utterance (default 1, never more than 2).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff between attempts in milliseconds; doubles each retry.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Text sent to the user when the model could not be queried.
    #[serde(default = "default_error_reply")]
    pub error_reply: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    1
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_error_reply() -> String {
    "Error querying the model.".to_string()
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            error_reply: default_error_reply(),
        }
    }
}

impl ResponderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Configured attempts clamped to `1..=MAX_RESPONDER_ATTEMPTS`.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.clamp(1, MAX_RESPONDER_ATTEMPTS)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Bot connector OAuth settings used when delivering replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorConfig {
    #[serde(default = "default_oauth_tenant")]
    pub oauth_tenant: String,

    #[serde(default = "default_oauth_scope")]
    pub oauth_scope: String,

    /// Overrides the token URL derived from the tenant (tests, sovereign clouds).
    pub token_url: Option<String>,

    /// Deadline in seconds for each token and send request (default 15).
    #[serde(default = "default_connector_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_connector_timeout_secs() -> u64 {
    15
}

fn default_oauth_tenant() -> String {
    "botframework.com".to_string()
}

fn default_oauth_scope() -> String {
    "https://api.botframework.com/.default".to_string()
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            oauth_tenant: default_oauth_tenant(),
            oauth_scope: default_oauth_scope(),
            token_url: None,
            timeout_secs: default_connector_timeout_secs(),
        }
    }
}

impl ConnectorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn resolve_token_url(&self) -> String {
        self.token_url.clone().unwrap_or_else(|| {
            format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
                self.oauth_tenant
            )
        })
    }
}

/// Secret source and the names under which the three secrets are stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretsConfig {
    #[serde(default)]
    pub source: SecretSource,

    /// Path of the JSON secrets file (file source). Relative paths resolve against the config file's parent.
    pub path: Option<PathBuf>,

    #[serde(default = "default_app_id_name")]
    pub app_id_name: String,

    #[serde(default = "default_app_password_name")]
    pub app_password_name: String,

    #[serde(default = "default_inference_token_name")]
    pub inference_token_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretSource {
    #[default]
    File,
    /// Development only: BOTRELAY_SECRET_<NAME> variables.
    Env,
}

fn default_app_id_name() -> String {
    "Bot-App-Id".to_string()
}

fn default_app_password_name() -> String {
    "Bot-App-Password".to_string()
}

fn default_inference_token_name() -> String {
    "Inference-Token".to_string()
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            source: SecretSource::default(),
            path: None,
            app_id_name: default_app_id_name(),
            app_password_name: default_app_password_name(),
            inference_token_name: default_inference_token_name(),
        }
    }
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Apply HOST and PORT from the environment over the file config.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    apply_host_port(config, std::env::var("HOST").ok(), std::env::var("PORT").ok())
}

/// Apply raw HOST / PORT values; blank values are ignored and an unparsable port is an error.
pub fn apply_host_port(config: &mut Config, host: Option<String>, port: Option<String>) -> Result<()> {
    if let Some(host) = non_empty(host) {
        config.gateway.bind = host;
    }
    if let Some(port) = non_empty(port) {
        config.gateway.port = port
            .parse()
            .with_context(|| format!("parsing PORT value {:?}", port))?;
    }
    Ok(())
}

/// Command-line `--host` / `--port`; these win over both the file and the environment.
pub fn apply_cli_overrides(config: &mut Config, host: Option<String>, port: Option<u16>) {
    if let Some(h) = non_empty(host) {
        config.gateway.bind = h;
    }
    if let Some(p) = port {
        config.gateway.port = p;
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("BOTRELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".botrelay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Resolve the secrets file: `secrets.path` (relative to the config file's parent) or `secrets.json` beside the config.
pub fn resolve_secrets_path(config: &Config, config_path: &Path) -> PathBuf {
    let config_parent = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match &config.secrets.path {
        Some(p) if !p.as_os_str().is_empty() => {
            if p.is_absolute() {
                p.clone()
            } else {
                config_parent.join(p)
            }
        }
        _ => config_parent.join("secrets.json"),
    }
}

/// Load config from the given path (or BOTRELAY_CONFIG_PATH / default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Checks that must hold before the gateway serves anything.
pub fn validate(config: &Config) -> Result<()> {
    let endpoint = config
        .responder
        .endpoint_url
        .as_deref()
        .map(str::trim)
        .unwrap_or("");
    if endpoint.is_empty() {
        anyhow::bail!("responder.endpointUrl is not configured");
    }
    let bind = config.gateway.bind.trim();
    if config.gateway.auth.mode == GatewayAuthMode::None && !is_loopback_bind(bind) {
        anyhow::bail!(
            "refusing to bind gateway to {} without inbound auth (set gateway.auth.mode to \"botFramework\")",
            bind
        );
    }
    Ok(())
}

/// Write a default config file if none exists. Returns true when a file was created.
pub fn write_default_config(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating config directory {}", dir.display()))?;
    }
    let body = serde_json::to_string_pretty(&Config::default())?;
    std::fs::write(path, body)
        .with_context(|| format!("writing default config to {}", path.display()))?;
    log::info!("created default config at {}", path.display());
    Ok(true)
}
