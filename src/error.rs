//! Error types for the OIDC gateway
//!
//! Every failure the gateway can surface to a caller maps to exactly one
//! variant, and every variant maps to exactly one HTTP status. Provider
//! connectivity failures are recoverable (503, retried lazily on the next
//! request); authentication and authorization failures are terminal for the
//! request that carried them (401/403, caller must re-authenticate).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Result type alias for the OIDC gateway
pub type Result<T> = std::result::Result<T, Error>;

/// OIDC gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Identity provider unreachable or misconfigured (recoverable)
    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Bearer token malformed, unsigned, or signed by an untrusted key
    #[error("Invalid token")]
    InvalidToken,

    /// Bearer token signature is valid but the token has expired
    #[error("Token expired")]
    ExpiredToken,

    /// A required role is missing from the verified claims
    #[error("Role \"{0}\" is required to perform this action")]
    InsufficientRole(String),

    /// Callback state does not match any pending login, or was already consumed
    #[error("State mismatch")]
    StateMismatch,

    /// The provider rejected the authorization-code exchange
    #[error("Authorization code exchange failed: {0}")]
    AuthorizationExchangeFailed(String),

    /// The provider rejected the refresh token (expired or revoked)
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The provider rejected the logout request
    #[error("Logout failed: {0}")]
    LogoutFailed(String),

    /// Username/password rejected by the provider
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code this error is reported as.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidToken | Self::ExpiredToken | Self::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            Self::InsufficientRole(_) => StatusCode::FORBIDDEN,
            Self::StateMismatch
            | Self::AuthorizationExchangeFailed(_)
            | Self::RefreshFailed(_)
            | Self::LogoutFailed(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal faults are logged for operators but disclose nothing.
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Internal gateway error");
            return status.into_response();
        }

        let body = Json(json!({ "detail": self.to_string() }));
        if status == StatusCode::UNAUTHORIZED {
            (status, [("WWW-Authenticate", "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_unavailable_maps_to_503() {
        let err = Error::ProviderUnavailable("connection refused".to_string());
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn token_errors_map_to_401() {
        assert_eq!(Error::InvalidToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::ExpiredToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn missing_role_maps_to_403() {
        let err = Error::InsufficientRole("admin".to_string());
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            err.to_string(),
            "Role \"admin\" is required to perform this action"
        );
    }

    #[test]
    fn flow_rejections_map_to_400() {
        assert_eq!(Error::StateMismatch.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::RefreshFailed("Token is not active".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::LogoutFailed("Session not found".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn internal_faults_map_to_500() {
        assert_eq!(
            Error::Internal("boom".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::Config("bad yaml".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
