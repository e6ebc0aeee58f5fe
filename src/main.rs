use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use mimalloc::MiMalloc;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use relaygate::account::{Account, AccountPoolHandle, ProviderTag, StaticAccountSource};
use relaygate::credential::{CredentialRefresher, CredentialValidator, NoRefresh};
use relaygate::server::router::gateway_router;
use relaygate::server::state::AppState;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The server binary requires a real config file with a non-empty gateway_key.
    let cfg = relaygate::config::Config::from_toml();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    let accounts = load_accounts();
    info!(count = accounts.len(), "loaded accounts");

    let source = StaticAccountSource::new(accounts);
    let pool = AccountPoolHandle::spawn(&source).await?;
    let validator = CredentialValidator::new(no_refreshers());

    let state = AppState::new(&cfg, pool, validator);
    let app = gateway_router(state);

    let addr = SocketAddr::from((cfg.basic.listen_addr, cfg.basic.listen_port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server has shut down gracefully.");
    Ok(())
}

/// Accounts live behind an injectable source; this binary backs it with a
/// flat JSON file rather than a database (persistence is an external
/// collaborator, not something this crate owns). Path is overridable via
/// `ACCOUNTS_FILE`, defaulting to `accounts.json` next to the working dir.
fn load_accounts() -> Vec<Account> {
    let path = std::env::var("ACCOUNTS_FILE").unwrap_or_else(|_| "accounts.json".to_string());

    match std::fs::read_to_string(&path) {
        Ok(raw) => serde_json::from_str(&raw)
            .unwrap_or_else(|e| panic!("{path}: invalid account list: {e}")),
        Err(_) => {
            tracing::warn!(%path, "no accounts file found, starting with an empty pool");
            Vec::new()
        }
    }
}

/// No provider currently wires a real OAuth refresh flow into this crate
/// (device code / authorization code / browser flow are external
/// collaborators); every provider falls back to disable-on-expiry.
fn no_refreshers() -> HashMap<ProviderTag, Arc<dyn CredentialRefresher>> {
    let refresher: Arc<dyn CredentialRefresher> = Arc::new(NoRefresh);
    [
        ProviderTag::OpenAi,
        ProviderTag::Claude,
        ProviderTag::Factory,
        ProviderTag::Gemini,
        ProviderTag::GeminiAntigravity,
        ProviderTag::GeminiBusiness,
        ProviderTag::Kiro,
    ]
    .into_iter()
    .map(|tag| (tag, refresher.clone()))
    .collect()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { /* ... */ },
        _ = terminate => { /* ... */ },
    }
}
