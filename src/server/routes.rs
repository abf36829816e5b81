//! HTTP routes and handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `GET`  | `/health` | none | Health check |
//! | `POST` | `/auth/login` | none | Password grant |
//! | `GET`  | `/auth/oidc/login` | none | Begin authorization-code flow |
//! | `GET`  | `/auth/oidc/callback` | none | Exchange callback code |
//! | `POST` | `/auth/oidc/refresh` | none | Refresh a token set |
//! | `POST` | `/auth/oidc/logout` | none | End the provider session |
//! | `GET`  | `/auth/oidc/user` | bearer | Userinfo for the caller |
//! | `GET`  | `/user` | bearer | Verified claims of the caller |
//! | `GET`  | `/admin` | bearer + `admin` | Admin greeting |
//! | `GET`  | `/protected` | bearer + `admin` | Protected resource sample |

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::info;

use super::auth::{BearerToken, require_auth};
use super::{AppState, cors_layer};
use crate::config::Config;
use crate::rbac::PermissionRequirement;
use crate::token::Claims;
use crate::{Error, Result};

/// Callback query parameters from the provider redirect.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// One-time authorization code
    pub code: String,
    /// State nonce issued at login time
    #[serde(default)]
    pub state: Option<String>,
}

/// Password-grant login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// End-user username
    pub username: String,
    /// End-user password
    pub password: String,
}

/// Request body carrying a refresh token (refresh and logout).
#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    /// The refresh token to act on
    pub refresh_token: String,
}

/// Create the router
pub fn create_router(state: Arc<AppState>, config: &Config) -> Router {
    let protected = Router::new()
        .route("/auth/oidc/user", get(oidc_user_info))
        .route("/user", get(current_user))
        .route("/admin", get(admin_greeting))
        .route("/protected", get(protected_resource))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_auth,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/auth/login", post(password_login))
        .route("/auth/oidc/login", get(oidc_login))
        .route("/auth/oidc/callback", get(oidc_callback))
        .route("/auth/oidc/refresh", post(oidc_refresh))
        .route("/auth/oidc/logout", post(oidc_logout))
        .merge(protected)
        .layer(cors_layer(&config.server.cors_origins))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /health` — liveness probe; never touches the provider.
async fn health_handler() -> impl IntoResponse {
    axum::http::StatusCode::OK
}

/// `POST /auth/login` — authenticate an end user via the password grant.
async fn password_login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let client = state.guard.ensure_ready().await?;
    let tokens = client.token_password(&body.username, &body.password).await?;
    info!(username = %body.username, "Password login succeeded");
    Ok(Json(tokens))
}

/// `GET /auth/oidc/login` — begin the authorization-code flow.
async fn oidc_login(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let redirect = state.flows.initiate().await?;
    Ok(Json(redirect))
}

/// `GET /auth/oidc/callback` — consume the state nonce, then exchange the
/// code. A missing, unknown, or reused state never reaches the provider.
async fn oidc_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse> {
    let nonce = query.state.as_deref().unwrap_or_default();
    if !state.flows.states().consume(nonce) {
        return Err(Error::StateMismatch);
    }

    let tokens = state.flows.exchange(&query.code).await?;
    Ok(Json(tokens))
}

/// `GET /auth/oidc/user` — userinfo claims for the authenticated caller.
async fn oidc_user_info(
    State(state): State<Arc<AppState>>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> Result<impl IntoResponse> {
    let client = state.guard.ensure_ready().await?;
    let user_info = client.userinfo(&token).await?;
    Ok(Json(user_info))
}

/// `POST /auth/oidc/refresh` — obtain a fresh token set.
async fn oidc_refresh(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse> {
    let tokens = state.flows.refresh(&body.refresh_token).await?;
    Ok(Json(tokens))
}

/// `POST /auth/oidc/logout` — end the provider session.
async fn oidc_logout(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse> {
    state.flows.logout(&body.refresh_token).await?;
    Ok(Json(json!({ "message": "Logout successful" })))
}

/// `GET /user` — the verified claims of the authenticated caller.
async fn current_user(Extension(claims): Extension<Claims>) -> impl IntoResponse {
    Json(claims)
}

/// `GET /admin` — requires the `admin` role.
async fn admin_greeting(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    state
        .evaluator
        .authorize(&claims, &PermissionRequirement::new(["admin"]))?;
    Ok(Json(json!({
        "message": format!("Hi admin {}", claims.display_name())
    })))
}

/// `GET /protected` — sample resource requiring the `admin` role.
async fn protected_resource(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    state
        .evaluator
        .authorize(&claims, &PermissionRequirement::new(["admin"]))?;
    Ok(Json(json!({ "message": "Hi, this is protected path" })))
}
