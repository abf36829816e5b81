//! Bearer token verification — signature, expiry, and claims extraction.
//!
//! # Verification flow
//!
//! 1. Obtain the provider handle via the [`InitializationGuard`]
//!    (propagating `ProviderUnavailable` as-is).
//! 2. Verify the JWT signature against the realm key cached on the handle.
//! 3. Verify expiry against current time (60 s clock-skew leeway).
//! 4. Deserialize the payload into typed [`Claims`], including the
//!    scope-keyed role mapping.
//!
//! A token that fails any step yields `InvalidToken`/`ExpiredToken`; the
//! verifier never returns partially-validated claims.
//!
//! Audience verification is off by default (`provider.verify_audience`):
//! Keycloak realms routinely serve several clients whose tokens carry a
//! different `aud`, and rejecting them would break sibling-client access.
//! Deployments with a single trusted client should turn it on.
//!
//! [`InitializationGuard`]: crate::guard::InitializationGuard

use std::collections::HashMap;
use std::sync::Arc;

use jsonwebtoken::{Algorithm, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::guard::InitializationGuard;
use crate::{Error, Result};

/// Roles granted within one scope (realm client) of the token.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScopeRoles {
    /// Role names granted in this scope
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Verified, decoded token payload.
///
/// Produced only by [`TokenVerifier::verify`] after full signature and
/// expiry validation; immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier
    pub sub: String,
    /// Issuer URL
    pub iss: String,
    /// Audience (single string or array, per the OIDC spec)
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub aud: Value,
    /// Expiry (Unix timestamp); validated before claims are released
    pub exp: u64,
    /// Issued-at (Unix timestamp)
    #[serde(default)]
    pub iat: u64,
    /// Preferred username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    /// Email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Client-scoped role grants: scope name → role set
    #[serde(default)]
    pub resource_access: HashMap<String, ScopeRoles>,
    /// Realm-wide role grants (kept separate from client scopes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_access: Option<ScopeRoles>,
}

impl Claims {
    /// Roles granted in `scope`. An absent scope reads as an empty role set.
    #[must_use]
    pub fn roles_in(&self, scope: &str) -> &[String] {
        self.resource_access
            .get(scope)
            .map_or(&[], |grants| grants.roles.as_slice())
    }

    /// Best display identifier for the subject.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.preferred_username
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.sub)
    }
}

/// Validates bearer tokens against the realm's cached signing key.
pub struct TokenVerifier {
    guard: Arc<InitializationGuard>,
    verify_audience: bool,
    audience: String,
}

impl TokenVerifier {
    /// Create a verifier that obtains its signing key through `guard`.
    #[must_use]
    pub fn new(guard: Arc<InitializationGuard>, config: &ProviderConfig) -> Self {
        Self {
            guard,
            verify_audience: config.verify_audience,
            audience: config.resolve_client_id(),
        }
    }

    /// Verify a bearer token and return its claims.
    ///
    /// # Errors
    ///
    /// - [`Error::ProviderUnavailable`] if the signing key cannot be obtained
    /// - [`Error::ExpiredToken`] if the signature is valid but the token expired
    /// - [`Error::InvalidToken`] for every other defect (malformed, bad
    ///   signature, wrong audience when enforcement is on)
    pub async fn verify(&self, token: &str) -> Result<Claims> {
        let client = self.guard.ensure_ready().await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 60; // clock-skew tolerance
        if self.verify_audience {
            validation.set_audience(&[&self.audience]);
        } else {
            validation.validate_aud = false;
        }

        match jsonwebtoken::decode::<Claims>(token, client.decoding_key(), &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                debug!("Token rejected: expired");
                Err(Error::ExpiredToken)
            }
            Err(e) => {
                debug!(reason = %e, "Token rejected");
                Err(Error::InvalidToken)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_claims() -> Claims {
        serde_json::from_value(serde_json::json!({
            "sub": "user-1",
            "iss": "http://keycloak:8080/realms/master",
            "aud": "gateway-client",
            "exp": 4_102_444_800_u64,
            "iat": 1_700_000_000_u64,
            "preferred_username": "alice",
            "resource_access": {
                "gateway-client": { "roles": ["admin", "user"] },
                "other-client": { "roles": ["auditor"] }
            },
            "realm_access": { "roles": ["offline_access"] }
        }))
        .expect("valid claims document")
    }

    #[test]
    fn roles_are_read_from_the_requested_scope_only() {
        let claims = sample_claims();
        assert_eq!(claims.roles_in("gateway-client"), ["admin", "user"]);
        assert_eq!(claims.roles_in("other-client"), ["auditor"]);
    }

    #[test]
    fn absent_scope_reads_as_empty_role_set() {
        let claims = sample_claims();
        assert!(claims.roles_in("unknown-client").is_empty());
    }

    #[test]
    fn realm_roles_never_leak_into_client_scopes() {
        let claims = sample_claims();
        assert!(!claims.roles_in("gateway-client").contains(&"offline_access".to_string()));
    }

    #[test]
    fn display_name_prefers_username_over_subject() {
        let claims = sample_claims();
        assert_eq!(claims.display_name(), "alice");

        let mut anonymous = sample_claims();
        anonymous.preferred_username = None;
        anonymous.email = None;
        assert_eq!(anonymous.display_name(), "user-1");
    }

    #[test]
    fn claims_tolerate_missing_role_mappings() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "sub": "user-2",
            "iss": "http://keycloak:8080/realms/master",
            "exp": 4_102_444_800_u64
        }))
        .expect("minimal claims document");
        assert!(claims.resource_access.is_empty());
        assert!(claims.roles_in("gateway-client").is_empty());
    }
}
