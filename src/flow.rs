//! Authorization-code flow coordination.
//!
//! Drives one OAuth2 authorization-code flow instance against the provider:
//! build the login redirect URL with an anti-forgery state nonce, exchange
//! the callback code for tokens (plus userinfo), refresh, and logout.
//!
//! State nonces live in the in-process [`StateStore`] from redirect to
//! callback. Consumption is at-most-once: two concurrent callbacks carrying
//! the same nonce cannot both succeed, and a nonce older than its TTL is
//! treated as unknown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use dashmap::DashMap;
use rand::RngExt;
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use crate::config::ProviderConfig;
use crate::guard::InitializationGuard;
use crate::provider::{TokenSet, UserInfo};
use crate::{Error, Result};

/// Login redirect returned to the caller: the authorization URL and the
/// state nonce the caller must see again on callback.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRedirect {
    /// Fully-built provider authorization endpoint URL
    pub auth_url: String,
    /// The anti-forgery state nonce embedded in `auth_url`
    pub state: String,
}

/// Result of a successful authorization-code exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangedTokens {
    /// Access token for bearer authentication
    pub access_token: String,
    /// Refresh token, when issued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Refresh token lifetime in seconds
    pub refresh_expires_in: u64,
    /// Userinfo claims fetched with the fresh access token
    pub user_info: UserInfo,
}

/// Pending login state nonces, consumable at most once each.
pub struct StateStore {
    pending: DashMap<String, Instant>,
    ttl: Duration,
}

impl StateStore {
    /// Create a store whose nonces expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            ttl,
        }
    }

    /// Generate, record, and return a fresh state nonce.
    pub fn issue(&self) -> String {
        // Opportunistic cleanup; abandoned logins never pile up.
        self.pending.retain(|_, issued_at| issued_at.elapsed() < self.ttl);

        let state = generate_state();
        self.pending.insert(state.clone(), Instant::now());
        state
    }

    /// Consume a nonce. Returns `true` exactly once per issued nonce, and
    /// only within its TTL; every later or unknown consumption is `false`.
    pub fn consume(&self, state: &str) -> bool {
        self.pending
            .remove(state)
            .is_some_and(|(_, issued_at)| issued_at.elapsed() < self.ttl)
    }

    /// Number of pending (unconsumed) nonces.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Generate a random, unguessable state nonce (256 bits, base64url).
fn generate_state() -> String {
    let state_bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(state_bytes)
}

/// Coordinates login redirect, code exchange, refresh, and logout.
pub struct AuthorizationFlowCoordinator {
    guard: Arc<InitializationGuard>,
    config: ProviderConfig,
    states: StateStore,
}

impl AuthorizationFlowCoordinator {
    /// Create a coordinator that reaches the provider through `guard`.
    #[must_use]
    pub fn new(guard: Arc<InitializationGuard>, config: ProviderConfig) -> Self {
        let states = StateStore::new(config.state_ttl);
        Self {
            guard,
            config,
            states,
        }
    }

    /// The nonce store for this coordinator's flows.
    #[must_use]
    pub fn states(&self) -> &StateStore {
        &self.states
    }

    /// Begin a login: issue a state nonce and build the authorization URL.
    ///
    /// # Errors
    ///
    /// [`Error::ProviderUnavailable`] when the provider handle cannot be
    /// initialized — redirecting a user to an unreachable provider would
    /// only defer the same failure to the callback.
    pub async fn initiate(&self) -> Result<LoginRedirect> {
        self.guard.ensure_ready().await?;

        let state = self.states.issue();
        let auth_url = self.build_authorization_url(&state)?;
        debug!(pending = self.states.pending_count(), "Login initiated");

        Ok(LoginRedirect { auth_url, state })
    }

    /// Exchange a callback authorization code for tokens and userinfo.
    ///
    /// The state comparison happens before this is called (the HTTP layer
    /// consumes the nonce); a failed comparison never reaches the provider.
    ///
    /// # Errors
    ///
    /// [`Error::AuthorizationExchangeFailed`] on provider rejection,
    /// [`Error::ProviderUnavailable`] on connectivity faults.
    pub async fn exchange(&self, code: &str) -> Result<ExchangedTokens> {
        let client = self.guard.ensure_ready().await?;

        let tokens = client.token_authorization_code(code).await?;
        let user_info = client
            .userinfo(&tokens.access_token)
            .await
            .map_err(|e| match e {
                Error::ProviderUnavailable(_) => e,
                _ => Error::AuthorizationExchangeFailed(
                    "userinfo lookup rejected for the fresh token".to_string(),
                ),
            })?;

        info!(sub = %user_info.sub, "Authorization code exchanged");
        Ok(ExchangedTokens {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in: tokens.expires_in,
            refresh_expires_in: tokens.refresh_expires_in,
            user_info,
        })
    }

    /// Obtain a new token set from a refresh token.
    ///
    /// # Errors
    ///
    /// [`Error::RefreshFailed`] when the provider rejects the token
    /// (expired/revoked), [`Error::ProviderUnavailable`] on connectivity
    /// faults.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        let client = self.guard.ensure_ready().await?;
        client.token_refresh(refresh_token).await
    }

    /// End the provider session bound to a refresh token.
    ///
    /// A second logout with an already-invalidated token is a reported
    /// [`Error::LogoutFailed`], never a crash.
    ///
    /// # Errors
    ///
    /// [`Error::LogoutFailed`] on provider rejection,
    /// [`Error::ProviderUnavailable`] on connectivity faults.
    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        let client = self.guard.ensure_ready().await?;
        client.logout(refresh_token).await?;
        info!("Provider session logged out");
        Ok(())
    }

    /// Build the provider authorization endpoint URL for one login.
    fn build_authorization_url(&self, state: &str) -> Result<String> {
        let endpoint = format!("{}/protocol/openid-connect/auth", self.config.realm_url());
        let mut auth_url = Url::parse(&endpoint)
            .map_err(|e| Error::Config(format!("Invalid provider base URL: {e}")))?;

        auth_url
            .query_pairs_mut()
            .append_pair("client_id", &self.config.resolve_client_id())
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("state", state);

        Ok(auth_url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn coordinator() -> AuthorizationFlowCoordinator {
        let config = ProviderConfig::default();
        let guard = Arc::new(InitializationGuard::new(config.clone()));
        AuthorizationFlowCoordinator::new(guard, config)
    }

    // ── State nonces ───────────────────────────────────────────────────────

    #[test]
    fn state_nonces_are_unique_and_url_safe() {
        let s1 = generate_state();
        let s2 = generate_state();
        assert_ne!(s1, s2);
        for state in [&s1, &s2] {
            assert!(state.len() >= 43); // 32 bytes -> 43 base64url chars
            assert!(!state.contains('+'));
            assert!(!state.contains('/'));
            assert!(!state.contains('='));
        }
    }

    #[test]
    fn nonce_is_consumable_exactly_once() {
        let store = StateStore::new(Duration::from_secs(600));
        let state = store.issue();

        assert!(store.consume(&state));
        assert!(!store.consume(&state), "second consumption must fail");
    }

    #[test]
    fn unknown_nonce_is_rejected() {
        let store = StateStore::new(Duration::from_secs(600));
        store.issue();
        assert!(!store.consume("never-issued"));
    }

    #[test]
    fn expired_nonce_is_rejected() {
        let store = StateStore::new(Duration::ZERO);
        let state = store.issue();
        assert!(!store.consume(&state));
    }

    #[test]
    fn issue_prunes_abandoned_nonces() {
        let store = StateStore::new(Duration::ZERO);
        store.issue();
        store.issue();
        // Each issue() first drops everything already past the (zero) TTL.
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn concurrent_consumption_admits_a_single_winner() {
        let store = Arc::new(StateStore::new(Duration::from_secs(600)));
        let state = store.issue();

        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let state = state.clone();
                    scope.spawn(move || usize::from(store.consume(&state)))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(winners, 1);
    }

    // ── Authorization URL ──────────────────────────────────────────────────

    #[test]
    fn authorization_url_carries_all_oidc_parameters() {
        let flows = coordinator();
        let url = flows
            .build_authorization_url("nonce-123")
            .expect("URL builds from default config");

        let parsed = Url::parse(&url).expect("well-formed URL");
        assert_eq!(
            parsed.path(),
            "/realms/master/protocol/openid-connect/auth"
        );

        let params: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "gateway-client");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], "openid email profile");
        assert_eq!(
            params["redirect_uri"],
            "http://localhost:8888/auth/oidc/callback"
        );
        assert_eq!(params["state"], "nonce-123");
    }
}
