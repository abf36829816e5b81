//! Lazy, idempotent provider initialization.
//!
//! The gateway must come up (and stay up) even when the identity provider is
//! unreachable. The [`InitializationGuard`] defers constructing the
//! [`IdentityProviderClient`] until the first request that needs it, caches
//! the handle on success, and records the failure cause on error without ever
//! crashing the process. A later request retries a failed initialization.
//!
//! Construction is single-flight: the state lock is held across the attempt,
//! so concurrent first calls queue behind one in-flight construction and
//! observe its outcome instead of racing to build duplicate handles.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::ProviderConfig;
use crate::provider::IdentityProviderClient;
use crate::{Error, Result};

/// Initialization state of the provider connection.
enum GuardState {
    /// No construction attempt has run yet
    Uninitialized,
    /// Construction succeeded; the handle is cached for all later calls
    Ready(Arc<IdentityProviderClient>),
    /// The last construction attempt failed; retried on the next call
    Unavailable(String),
}

/// Guards lazy construction of the [`IdentityProviderClient`].
pub struct InitializationGuard {
    config: ProviderConfig,
    state: Mutex<GuardState>,
}

impl InitializationGuard {
    /// Create a guard in the `Uninitialized` state. No network activity
    /// happens until [`ensure_ready`](Self::ensure_ready) is first called.
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            state: Mutex::new(GuardState::Uninitialized),
        }
    }

    /// Return the initialized provider handle, constructing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProviderUnavailable`] when the provider cannot be
    /// reached. The failure is not memoized permanently: the next call
    /// attempts construction again.
    pub async fn ensure_ready(&self) -> Result<Arc<IdentityProviderClient>> {
        let mut state = self.state.lock().await;

        if let GuardState::Ready(handle) = &*state {
            return Ok(Arc::clone(handle));
        }

        // Uninitialized, or retrying a previous failure. The lock stays held
        // across the attempt so exactly one construction is in flight.
        match IdentityProviderClient::connect(&self.config).await {
            Ok(client) => {
                let handle = Arc::new(client);
                info!(
                    realm = %self.config.realm,
                    provider = %self.config.base_url,
                    "Identity provider client initialized"
                );
                *state = GuardState::Ready(Arc::clone(&handle));
                Ok(handle)
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(
                    provider = %self.config.base_url,
                    error = %reason,
                    "Identity provider initialization failed"
                );
                *state = GuardState::Unavailable(reason.clone());
                Err(Error::ProviderUnavailable(reason))
            }
        }
    }

    /// Whether the provider handle has been constructed.
    pub async fn is_ready(&self) -> bool {
        matches!(&*self.state.lock().await, GuardState::Ready(_))
    }

    /// The failure cause of the last attempt, if the guard is `Unavailable`.
    pub async fn unavailable_reason(&self) -> Option<String> {
        match &*self.state.lock().await {
            GuardState::Unavailable(reason) => Some(reason.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_starts_uninitialized_without_network_activity() {
        // The base URL is unroutable; constructing the guard must not touch it.
        let guard = InitializationGuard::new(ProviderConfig {
            base_url: "http://192.0.2.1:1".to_string(),
            ..ProviderConfig::default()
        });
        assert!(!guard.is_ready().await);
        assert!(guard.unavailable_reason().await.is_none());
    }

    #[tokio::test]
    async fn failed_attempt_records_cause_and_stays_retryable() {
        let config = ProviderConfig {
            // Nothing listens on this port; connect fails fast.
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout: std::time::Duration::from_millis(500),
            ..ProviderConfig::default()
        };
        let guard = InitializationGuard::new(config);

        let first = guard.ensure_ready().await;
        assert!(matches!(first, Err(Error::ProviderUnavailable(_))));
        assert!(guard.unavailable_reason().await.is_some());
        assert!(!guard.is_ready().await);

        // A second call retries rather than replaying a memoized failure.
        let second = guard.ensure_ready().await;
        assert!(matches!(second, Err(Error::ProviderUnavailable(_))));
    }
}
