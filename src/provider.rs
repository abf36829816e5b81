//! Identity provider client — connectivity to the external OIDC provider.
//!
//! Wraps the provider's realm-metadata endpoint (public signing key), the
//! token endpoint (password, `authorization_code`, and `refresh_token`
//! grants), the userinfo endpoint, and the logout endpoint.
//!
//! The client is constructed once by the [`InitializationGuard`] and shared
//! read-only afterwards; the realm signing key is fetched at construction
//! time and cached for the lifetime of the handle, never per request.
//!
//! Error detail returned to callers is taken from the provider's
//! `error_description` field only — authorization codes, refresh tokens, and
//! the client secret never appear in error text.
//!
//! [`InitializationGuard`]: crate::guard::InitializationGuard

use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::{Error, Result};

/// Token set returned by the provider's token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    /// The signed access token (JWT)
    pub access_token: String,
    /// Refresh token, when the grant issues one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    /// Refresh token lifetime in seconds
    #[serde(default = "default_refresh_expires_in")]
    pub refresh_expires_in: u64,
    /// Token type, normally `Bearer`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

fn default_expires_in() -> u64 {
    300
}

fn default_refresh_expires_in() -> u64 {
    1800
}

/// Userinfo claims returned by the provider's userinfo endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    /// Subject identifier
    pub sub: String,
    /// Preferred username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    /// Email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Any further claims the provider includes
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Realm metadata document served at `{base_url}/realms/{realm}`.
#[derive(Debug, Deserialize)]
struct RealmMetadata {
    /// Realm public signing key, base64 DER without PEM armor
    public_key: String,
}

/// Error body the provider returns on a rejected grant.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Initialized connection to the identity provider.
///
/// Holds the HTTP client, the resolved configuration, and the realm's
/// public signing key (both as PEM and as a parsed [`DecodingKey`]).
pub struct IdentityProviderClient {
    http: reqwest::Client,
    config: ProviderConfig,
    client_id: String,
    client_secret: String,
    public_key_pem: String,
    decoding_key: DecodingKey,
}

impl IdentityProviderClient {
    /// Connect to the provider: build the HTTP client and fetch the realm's
    /// public signing key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProviderUnavailable`] if the provider cannot be
    /// reached, responds with an error status, or serves an unusable key.
    pub async fn connect(config: &ProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::ProviderUnavailable(e.to_string()))?;

        let realm_url = config.realm_url();
        debug!(url = %realm_url, "Fetching realm public key");

        let metadata: RealmMetadata = http
            .get(&realm_url)
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::ProviderUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("bad realm metadata: {e}")))?;

        let public_key_pem = wrap_public_key_pem(&metadata.public_key);
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| Error::ProviderUnavailable(format!("unusable realm key: {e}")))?;

        Ok(Self {
            http,
            client_id: config.resolve_client_id(),
            client_secret: config.resolve_client_secret(),
            config: config.clone(),
            public_key_pem,
            decoding_key,
        })
    }

    /// The realm's public signing key, parsed for signature verification.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// The realm's public signing key as PEM.
    #[must_use]
    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    /// Client id this handle authenticates as.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// `password` grant: authenticate an end user with username/password.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCredentials`] if the provider rejects the credentials,
    /// [`Error::ProviderUnavailable`] on connectivity or provider faults.
    pub async fn token_password(&self, username: &str, password: &str) -> Result<TokenSet> {
        let params = [
            ("grant_type", "password"),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("username", username),
            ("password", password),
        ];
        self.token_grant(&params, |_detail| Error::InvalidCredentials)
            .await
    }

    /// `authorization_code` grant: exchange a callback code for tokens.
    ///
    /// # Errors
    ///
    /// [`Error::AuthorizationExchangeFailed`] if the provider rejects the
    /// code, [`Error::ProviderUnavailable`] on connectivity or provider
    /// faults.
    pub async fn token_authorization_code(&self, code: &str) -> Result<TokenSet> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("code", code),
            ("redirect_uri", &self.config.redirect_uri),
        ];
        self.token_grant(&params, Error::AuthorizationExchangeFailed)
            .await
    }

    /// `refresh_token` grant: obtain a new token set.
    ///
    /// # Errors
    ///
    /// [`Error::RefreshFailed`] if the provider rejects the refresh token,
    /// [`Error::ProviderUnavailable`] on connectivity or provider faults.
    pub async fn token_refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("refresh_token", refresh_token),
        ];
        self.token_grant(&params, Error::RefreshFailed).await
    }

    /// Fetch userinfo claims for a bearer access token.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidToken`] if the provider rejects the token,
    /// [`Error::ProviderUnavailable`] on connectivity or provider faults.
    pub async fn userinfo(&self, access_token: &str) -> Result<UserInfo> {
        let url = format!("{}/protocol/openid-connect/userinfo", self.config.realm_url());
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            warn!(status = %status, "Userinfo request rejected");
            return Err(Error::InvalidToken);
        }
        if !status.is_success() {
            return Err(Error::ProviderUnavailable(format!("userinfo HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("bad userinfo body: {e}")))
    }

    /// Ask the provider to end the session bound to a refresh token.
    ///
    /// # Errors
    ///
    /// [`Error::LogoutFailed`] if the provider rejects the token (already
    /// invalidated sessions included), [`Error::ProviderUnavailable`] on
    /// connectivity or provider faults.
    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        let url = format!("{}/protocol/openid-connect/logout", self.config.realm_url());
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let detail = error_detail(response.text().await.ok().as_deref(), status.as_u16());
            return Err(Error::LogoutFailed(detail));
        }
        if !status.is_success() {
            return Err(Error::ProviderUnavailable(format!("logout HTTP {status}")));
        }

        Ok(())
    }

    /// Run a token-endpoint grant; `rejected` maps a provider rejection
    /// (4xx) to the operation-specific error, given the sanitized detail.
    async fn token_grant(
        &self,
        params: &[(&str, &str)],
        rejected: impl FnOnce(String) -> Error,
    ) -> Result<TokenSet> {
        let url = format!("{}/protocol/openid-connect/token", self.config.realm_url());
        let response = self
            .http
            .post(&url)
            .form(params)
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let detail = error_detail(response.text().await.ok().as_deref(), status.as_u16());
            return Err(rejected(detail));
        }
        if !status.is_success() {
            return Err(Error::ProviderUnavailable(format!(
                "token endpoint HTTP {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("bad token response: {e}")))
    }
}

/// Wrap a raw base64 public key in PEM armor; keys already armored pass
/// through unchanged.
fn wrap_public_key_pem(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("-----BEGIN PUBLIC KEY-----") {
        trimmed.to_string()
    } else {
        format!("-----BEGIN PUBLIC KEY-----\n{trimmed}\n-----END PUBLIC KEY-----")
    }
}

/// Extract a sanitized human-readable detail from a provider error body.
///
/// Only the provider's own `error_description`/`error` fields are used;
/// request parameters never flow into the result.
fn error_detail(body: Option<&str>, status: u16) -> String {
    body.and_then(|text| serde_json::from_str::<ProviderErrorBody>(text).ok())
        .and_then(|parsed| {
            parsed
                .error_description
                .filter(|d| !d.is_empty())
                .or_else(|| (!parsed.error.is_empty()).then_some(parsed.error))
        })
        .unwrap_or_else(|| format!("provider rejected the request (HTTP {status})"))
}
