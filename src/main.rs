//! OIDC Gateway - authentication/authorization gateway for protected APIs.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use oidc_gateway::{
    cli::{Cli, Command},
    config::Config,
    server, setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // CLI flags override file/env configuration
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    match cli.command {
        Some(Command::CheckConfig) => run_check_config(&config),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Print a redacted configuration summary and exit.
fn run_check_config(config: &Config) -> ExitCode {
    println!("server:   {}:{}", config.server.host, config.server.port);
    println!("provider: {}", config.provider.base_url);
    println!("realm:    {}", config.provider.realm);
    println!("client:   {}", config.provider.resolve_client_id());
    println!(
        "secret:   {}",
        if config.provider.resolve_client_secret().is_empty() {
            "(not set)"
        } else {
            "(set)"
        }
    );
    println!("redirect: {}", config.provider.redirect_uri);
    println!("audience verification: {}", config.provider.verify_audience);
    ExitCode::SUCCESS
}

/// Run the gateway server until shutdown.
async fn run_server(config: Config) -> ExitCode {
    match server::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Gateway failed: {e}");
            ExitCode::FAILURE
        }
    }
}
