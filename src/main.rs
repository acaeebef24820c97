//! Puppynet Faucet service
//!
//! Dispenses bounded amounts of configured test assets to wallets, at most
//! once per cooldown window per asset. Runs the HTTP API and the
//! reconciliation loop concurrently until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Instant;

use faucet::api::{self, AppState};
use faucet::assets::AssetRegistry;
use faucet::config::Config;
use faucet::cooldown::PgCooldownLedger;
use faucet::db;
use faucet::ledger::EvmLedgerClient;
use faucet::metrics;
use faucet::orchestrator::ClaimOrchestrator;
use faucet::ratelimit::WalletThrottle;
use faucet::reconcile::Reconciler;
use faucet::store::PgClaimStore;

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    // Run the async main
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("Starting Puppynet Faucet");

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        chain_id = config.ledger.chain_id,
        assets_file = %config.faucet.assets_file,
        "Configuration loaded"
    );

    // Load the asset catalog
    let registry = Arc::new(AssetRegistry::from_catalog_file(&config.faucet.assets_file)?);
    let active = registry.list_active().await;
    tracing::info!(
        active_assets = active.len(),
        symbols = ?active.iter().map(|a| a.symbol.to_string()).collect::<Vec<_>>(),
        "Asset catalog loaded"
    );

    // Connect to database
    let pool = db::create_pool(&config.database.url).await?;
    tracing::info!("Database connected");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    // Stores and ledger client
    let claims: Arc<dyn faucet::store::ClaimStore> = Arc::new(PgClaimStore::new(pool.clone()));
    let cooldowns: Arc<dyn faucet::cooldown::CooldownLedger> =
        Arc::new(PgCooldownLedger::new(pool.clone()));
    let ledger: Arc<dyn faucet::ledger::LedgerClient> =
        Arc::new(EvmLedgerClient::new(&config.ledger)?);

    let orchestrator = Arc::new(ClaimOrchestrator::new(
        registry.clone(),
        claims.clone(),
        cooldowns.clone(),
        ledger.clone(),
        config.ledger.confirm_timeout(),
        config.ledger.confirm_poll(),
    ));

    let reconciler = Reconciler::new(
        claims.clone(),
        cooldowns.clone(),
        ledger.clone(),
        config.faucet.reconcile_interval(),
        config.faucet.reconcile_lookback_hours,
    );

    let throttle = Arc::new(WalletThrottle::new(std::time::Duration::from_secs(
        config.server.wallet_min_interval_secs,
    )));

    // Create shutdown channel for the reconciler
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Setup signal handlers
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    metrics::UP.set(1.0);

    let state = AppState {
        orchestrator,
        registry,
        claims,
        throttle,
        db: pool,
        history_limit: config.faucet.history_limit,
        started_at: Instant::now(),
    };

    // Run the API server and reconciler concurrently
    tokio::select! {
        result = api::start_api_server(&config.server, state) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "API server error");
            }
        }
        result = reconciler.run(shutdown_rx) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Reconciler error");
            }
        }
    }

    tracing::info!("Puppynet Faucet stopped");
    Ok(())
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,faucet=debug,puppynet_faucet=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
