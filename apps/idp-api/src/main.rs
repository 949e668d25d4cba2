//! Federated IDP API
//!
//! Serves the telematik federation endpoints of the IDP: entity statement,
//! signed JWKS, PAR, authorization and token endpoints.

mod config;
mod logging;

use config::AppConfig;
use fedidp_api_federation::{create_federation_router, FederationConfig, TrustAnchor};
use fedidp_auth::StatementSigner;
use std::net::SocketAddr;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() {
    // Load configuration (fail-fast on missing required values)
    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_addr = %config.listen_addr,
        issuer = %config.issuer,
        fedmaster = %config.fedmaster_issuer,
        require_client_cert = config.require_client_cert,
        "Starting federated IDP"
    );

    let federation_config = match federation_config(&config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load signing key: {e}");
            std::process::exit(1);
        }
    };

    let app = match create_federation_router(federation_config) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!("Failed to build federation router: {e}");
            std::process::exit(1);
        }
    };

    let addr: SocketAddr = match config.listen_addr.parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("Invalid bind address '{}': {e}", config.listen_addr);
            std::process::exit(1);
        }
    };

    info!(%addr, "Server listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to address {addr}: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

/// Build the library configuration, loading the signing key from disk.
fn federation_config(config: &AppConfig) -> Result<FederationConfig, Box<dyn std::error::Error>> {
    let pem = config.read_signing_key()?;
    let signer = StatementSigner::from_pem(
        config.signing_kid.clone(),
        &pem,
        config.signing_public_jwk.clone(),
    )?
    .with_x5c(config.signing_x5c.clone());

    Ok(FederationConfig {
        issuer: config.issuer.clone(),
        trust_anchor: TrustAnchor {
            issuer: config.fedmaster_issuer.clone(),
            fetch_endpoint: config.fedmaster_fetch_endpoint.clone(),
            public_key: config.fedmaster_public_jwk.clone(),
        },
        signer,
        scopes_supported: config.scopes_supported.clone(),
        upstream_timeout: config.upstream_timeout,
        id_token_ttl_secs: config.id_token_ttl_secs,
        require_client_cert: config.require_client_cert,
        entity_name: config.entity_name.clone(),
        contacts: config.contacts.clone(),
    })
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
