//! Secret retrieval: bot app id, bot app password and inference bearer token.
//!
//! Secrets are fetched once at startup from a [`SecretStore`] and passed into the gateway;
//! nothing reads them from ambient state afterwards. A missing or empty secret stops startup.

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::{self, Config, SecretSource, SecretsConfig};

/// Prefix of environment variables read by [`EnvSecretStore`].
pub const ENV_SECRET_PREFIX: &str = "BOTRELAY_SECRET_";

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret {0:?} not found")]
    NotFound(String),
    #[error("secret {0:?} is empty")]
    Empty(String),
    #[error("reading secrets file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing secrets file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// External secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<Secret<String>, SecretError>;
}

/// Secrets read from a JSON object file (`{"Bot-App-Id": "...", ...}`).
pub struct FileSecretStore {
    values: HashMap<String, Secret<String>>,
}

impl FileSecretStore {
    pub async fn load(path: &Path) -> Result<Self, SecretError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SecretError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let map: HashMap<String, String> =
            serde_json::from_str(&raw).map_err(|source| SecretError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        log::debug!("loaded {} secret(s) from {}", map.len(), path.display());
        Ok(Self {
            values: map.into_iter().map(|(k, v)| (k, Secret::new(v))).collect(),
        })
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Secret<String>, SecretError> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }
}

/// Development store: `Bot-App-Id` is read from `BOTRELAY_SECRET_BOT_APP_ID`.
#[derive(Default)]
pub struct EnvSecretStore;

pub fn env_var_for(name: &str) -> String {
    let suffix: String = name
        .chars()
        .map(|c| match c {
            '-' | '.' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    format!("{}{}", ENV_SECRET_PREFIX, suffix)
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Secret<String>, SecretError> {
        std::env::var(env_var_for(name))
            .map(Secret::new)
            .map_err(|_| SecretError::NotFound(name.to_string()))
    }
}

/// The three secrets the relay needs, fetched once.
#[derive(Clone)]
pub struct RelaySecrets {
    pub app_id: Secret<String>,
    pub app_password: Secret<String>,
    pub inference_token: Secret<String>,
}

impl std::fmt::Debug for RelaySecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySecrets")
            .field("app_id", &"[REDACTED]")
            .field("app_password", &"[REDACTED]")
            .field("inference_token", &"[REDACTED]")
            .finish()
    }
}

impl RelaySecrets {
    /// Fetch all three secrets by their configured names. Any failure aborts.
    pub async fn fetch(
        store: &dyn SecretStore,
        names: &SecretsConfig,
    ) -> Result<Self, SecretError> {
        Ok(Self {
            app_id: fetch_non_empty(store, &names.app_id_name).await?,
            app_password: fetch_non_empty(store, &names.app_password_name).await?,
            inference_token: fetch_non_empty(store, &names.inference_token_name).await?,
        })
    }
}

/// Open the configured store and fetch the relay's secrets. Used once, before serving.
pub async fn load_relay_secrets(config: &Config, config_path: &Path) -> anyhow::Result<RelaySecrets> {
    let names = &config.secrets;
    let secrets = match names.source {
        SecretSource::File => {
            let path = config::resolve_secrets_path(config, config_path);
            let store = FileSecretStore::load(&path).await?;
            RelaySecrets::fetch(&store, names).await?
        }
        SecretSource::Env => {
            log::warn!("reading secrets from {}* environment variables", ENV_SECRET_PREFIX);
            RelaySecrets::fetch(&EnvSecretStore, names).await?
        }
    };
    log::info!("fetched relay secrets ({:?} store)", names.source);
    Ok(secrets)
}

async fn fetch_non_empty(store: &dyn SecretStore, name: &str) -> Result<Secret<String>, SecretError> {
    let value = store.get_secret(name).await?;
    if value.expose_secret().trim().is_empty() {
        return Err(SecretError::Empty(name.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MapStore(HashMap<String, Secret<String>>);

    #[async_trait]
    impl SecretStore for MapStore {
        async fn get_secret(&self, name: &str) -> Result<Secret<String>, SecretError> {
            self.0
                .get(name)
                .cloned()
                .ok_or_else(|| SecretError::NotFound(name.to_string()))
        }
    }

    fn store(pairs: &[(&str, &str)]) -> MapStore {
        MapStore(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), Secret::new(v.to_string())))
                .collect(),
        )
    }

    #[test]
    fn env_var_names() {
        assert_eq!(env_var_for("Bot-App-Id"), "BOTRELAY_SECRET_BOT_APP_ID");
        assert_eq!(env_var_for("Inference-Token"), "BOTRELAY_SECRET_INFERENCE_TOKEN");
    }

    #[tokio::test]
    async fn fetch_all_secrets() {
        let s = store(&[
            ("Bot-App-Id", "app"),
            ("Bot-App-Password", "pw"),
            ("Inference-Token", "tok"),
        ]);
        let secrets = RelaySecrets::fetch(&s, &SecretsConfig::default()).await.unwrap();
        assert_eq!(secrets.app_id.expose_secret(), "app");
        assert_eq!(secrets.inference_token.expose_secret(), "tok");
        assert!(!format!("{:?}", secrets).contains("pw"));
    }

    #[tokio::test]
    async fn missing_secret_fails() {
        let s = store(&[("Bot-App-Id", "app"), ("Bot-App-Password", "pw")]);
        let err = RelaySecrets::fetch(&s, &SecretsConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SecretError::NotFound(ref n) if n == "Inference-Token"));
    }

    #[tokio::test]
    async fn empty_secret_fails() {
        let s = store(&[
            ("Bot-App-Id", "app"),
            ("Bot-App-Password", "  "),
            ("Inference-Token", "tok"),
        ]);
        let err = RelaySecrets::fetch(&s, &SecretsConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SecretError::Empty(_)));
    }

    #[tokio::test]
    async fn file_store_reads_json_object() {
        let dir = std::env::temp_dir().join(format!("botrelay-secrets-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("secrets.json");
        std::fs::write(&path, r#"{"Bot-App-Id":"a","Bot-App-Password":"b","Inference-Token":"c"}"#)
            .unwrap();
        let store = FileSecretStore::load(&path).await.unwrap();
        let secrets = RelaySecrets::fetch(&store, &SecretsConfig::default())
            .await
            .unwrap();
        assert_eq!(secrets.app_password.expose_secret(), "b");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn file_store_missing_file_is_io_error() {
        let path = std::env::temp_dir().join(format!("botrelay-missing-{}.json", uuid::Uuid::new_v4()));
        assert!(matches!(
            FileSecretStore::load(&path).await,
            Err(SecretError::Io { .. })
        ));
    }
}
