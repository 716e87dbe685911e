use clap::Parser;
use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meridian_core::adapters::{
    HttpReferenceResolver, LogDispatcher, PermissiveResolver, PostgresLedgerStore,
    PostgresWalletStore,
};
use meridian_core::cli::{Cli, Commands, DbCommands, TxCommands};
use meridian_core::config::Config;
use meridian_core::gateway::CardGatewayClient;
use meridian_core::ports::ReferenceResolver;
use meridian_core::services::{LedgerService, ReconciliationService, RefundService, Sweeper};
use meridian_core::{cli, create_app, db_pool, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Tx(TxCommands::Sweep) => cli::handle_tx_sweep(&config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db_pool(&config).await?;

    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let store = Arc::new(PostgresLedgerStore::new(pool.clone()));
    let wallet = Arc::new(PostgresWalletStore::new(pool.clone()));
    let gateway = Arc::new(CardGatewayClient::new(
        config.gateway_base_url.clone(),
        config.gateway_api_key.clone(),
    ));
    tracing::info!("Gateway client initialized with URL: {}", config.gateway_base_url);

    let resolver: Arc<dyn ReferenceResolver> = match &config.reference_service_url {
        Some(url) => Arc::new(HttpReferenceResolver::new(url.clone())),
        None => Arc::new(PermissiveResolver),
    };
    let notifier = Arc::new(LogDispatcher);

    let ledger = Arc::new(LedgerService::new(
        store.clone(),
        wallet.clone(),
        gateway.clone(),
        resolver.clone(),
        notifier.clone(),
    ));
    let reconciliation = Arc::new(ReconciliationService::new(
        store.clone(),
        wallet.clone(),
        resolver.clone(),
        notifier.clone(),
    ));
    let refunds = Arc::new(RefundService::new(
        store.clone(),
        wallet.clone(),
        gateway.clone(),
        notifier.clone(),
        config.refund_window_days,
    ));

    let sweeper = Sweeper::new(store.clone(), config.sweep_stale_after_minutes);
    let sweep_interval = Duration::from_secs(config.sweep_interval_secs);
    tokio::spawn(sweeper.run(sweep_interval));

    let state = AppState {
        config: Arc::new(config.clone()),
        ledger,
        reconciliation,
        refunds,
    };

    let app = create_app(state).layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
