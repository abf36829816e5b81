//! Bearer authentication middleware.
//!
//! Extracts the `Authorization: Bearer` token, verifies it through the
//! [`TokenVerifier`], and injects the verified [`Claims`] (plus the raw
//! bearer value, needed for the userinfo passthrough) into request
//! extensions for downstream handlers. Requests without a valid token are
//! rejected with 401 and a `WWW-Authenticate: Bearer` header.
//!
//! [`TokenVerifier`]: crate::token::TokenVerifier
//! [`Claims`]: crate::token::Claims

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::AppState;
use crate::Error;

/// The raw bearer token of an authenticated request.
///
/// Kept alongside [`Claims`](crate::token::Claims) so handlers that call the
/// provider on the user's behalf (userinfo) can forward the original token.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Extract the bearer token from an `Authorization` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
}

/// Authentication middleware for protected routes.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();

    let Some(token) = bearer_token(request.headers()).map(str::to_owned) else {
        warn!(path = %path, "Missing Authorization header");
        return Error::InvalidToken.into_response();
    };

    match state.verifier.verify(&token).await {
        Ok(claims) => {
            debug!(path = %path, sub = %claims.sub, "Authenticated request");
            request.extensions_mut().insert(claims);
            request.extensions_mut().insert(BearerToken(token));
            next.run(request).await
        }
        Err(e) => {
            warn!(path = %path, error = %e, "Bearer verification failed");
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_accepts_both_prefix_spellings() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert("authorization", HeaderValue::from_static("bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }

    #[test]
    fn bearer_token_rejects_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);

        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
