//! OIDC Gateway Library
//!
//! Authentication/authorization gateway in front of protected API resources:
//!
//! - **Token verification**: bearer JWTs validated against the identity
//!   provider's realm signing key (signature + expiry)
//! - **RBAC**: conjunctive, scope-qualified role checks over verified claims
//! - **Authorization-code flow**: login redirect with anti-forgery state,
//!   code exchange, refresh, logout
//! - **Lazy initialization**: the provider connection is built on first use
//!   behind a single-flight guard, so a temporarily unreachable provider
//!   degrades to 503 instead of taking the gateway down

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod flow;
pub mod guard;
pub mod provider;
pub mod rbac;
pub mod server;
pub mod token;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
