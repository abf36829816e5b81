//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Identity provider configuration
    pub provider: ProviderConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Allowed CORS origins
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8888,
            cors_origins: vec![
                "http://localhost".to_string(),
                "http://localhost:3000".to_string(),
            ],
        }
    }
}

/// Identity provider (OIDC) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider base URL, e.g. `http://keycloak:8080`
    pub base_url: String,
    /// Realm name
    pub realm: String,
    /// Client id registered with the provider (supports `env:VAR_NAME`)
    pub client_id: String,
    /// Client secret (supports `env:VAR_NAME`)
    pub client_secret: String,
    /// Redirect URI for the authorization-code callback
    pub redirect_uri: String,
    /// Scopes requested during the authorization-code flow
    pub scopes: Vec<String>,
    /// Timeout applied to every outbound provider request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Whether to verify the token audience claim against `client_id`.
    /// Off by default: tokens minted by sibling clients of the same realm
    /// carry a different `aud` and would be rejected.
    pub verify_audience: bool,
    /// How long an issued login state nonce stays consumable
    #[serde(with = "humantime_serde")]
    pub state_ttl: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://keycloak:8080".to_string(),
            realm: "master".to_string(),
            client_id: "gateway-client".to_string(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:8888/auth/oidc/callback".to_string(),
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
            request_timeout: Duration::from_secs(10),
            verify_audience: false,
            state_ttl: Duration::from_secs(600),
        }
    }
}

impl ProviderConfig {
    /// Resolve the client secret (expand `env:VAR_NAME` references).
    #[must_use]
    pub fn resolve_client_secret(&self) -> String {
        resolve_env_ref(&self.client_secret)
    }

    /// Resolve the client id (expand `env:VAR_NAME` references).
    #[must_use]
    pub fn resolve_client_id(&self) -> String {
        resolve_env_ref(&self.client_id)
    }

    /// Base URL of the realm, without a trailing slash.
    #[must_use]
    pub fn realm_url(&self) -> String {
        format!("{}/realms/{}", self.base_url.trim_end_matches('/'), self.realm)
    }
}

/// Expand a `env:VAR_NAME` reference, falling back to the literal value.
fn resolve_env_ref(value: &str) -> String {
    if let Some(var_name) = value.strip_prefix("env:") {
        env::var(var_name).unwrap_or_else(|_| value.to_string())
    } else {
        value.to_string()
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (OIDC_GATEWAY_ prefix)
        figment = figment.merge(Env::prefixed("OIDC_GATEWAY_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }
}
