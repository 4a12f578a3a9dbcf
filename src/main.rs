use dotenv::dotenv;
use posgate_backend::api::{self, AppState};
use posgate_backend::config::AppConfig;
use posgate_backend::health::HealthChecker;
use posgate_backend::logging::init_tracing_with;
use posgate_backend::payments::audit::{AuditLog, InMemoryAuditLog};
use posgate_backend::payments::callback::{CallbackStateStore, InMemoryCallbackStore};
use posgate_backend::payments::utils::PaymentHttpClient;
use posgate_backend::payments::ProviderRegistry;
use posgate_backend::services::CheckoutService;
use posgate_backend::workers::{CallbackSweeper, CallbackSweeperConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing_with(&config.logging);
    config.validate()?;

    let skip_externals = std::env::var("SKIP_EXTERNALS")
        .unwrap_or_else(|_| "false".to_string())
        .to_lowercase()
        == "true";

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        public_base_url = %config.callback.public_base_url,
        "Starting posgate backend service"
    );

    #[allow(unused_mut)]
    let mut health_checker = HealthChecker::default();

    // Audit log: Postgres when configured, otherwise process memory.
    #[allow(unused_mut)]
    let mut audit: Arc<dyn AuditLog> = Arc::new(InMemoryAuditLog::new());
    #[cfg(feature = "database")]
    {
        let mut db_pool = None;
        match (&config.database, skip_externals) {
            (Some(database), false) => {
                info!("Initializing database connection pool...");
                let pool = posgate_backend::database::init_pool_from_config(database)
                    .await
                    .map_err(|e| {
                        error!("Failed to initialize database pool: {}", e);
                        e
                    })?;
                posgate_backend::database::run_migrations(&pool).await?;
                info!(
                    max_connections = pool.options().get_max_connections(),
                    "Database connection pool initialized"
                );
                audit = Arc::new(
                    posgate_backend::database::audit_log_repository::PgAuditLog::new(pool.clone()),
                );
                db_pool = Some(pool);
            }
            _ => warn!("Audit log kept in memory; entries are lost on restart"),
        }
        health_checker = health_checker.with_database(db_pool);
    }
    #[cfg(not(feature = "database"))]
    warn!("Audit log kept in memory; entries are lost on restart");

    // Callback state: Redis when available, otherwise process memory.
    #[allow(unused_mut)]
    let mut store: Arc<dyn CallbackStateStore> =
        Arc::new(InMemoryCallbackStore::from_config(&config.callback));
    #[cfg(feature = "cache")]
    {
        if skip_externals {
            info!("Skipping Redis initialization (SKIP_EXTERNALS=true)");
        } else {
            info!("Initializing Redis connection pool...");
            let pool = posgate_backend::cache::init_cache_pool((&config.cache).into())
                .await
                .map_err(|e| {
                    error!("Failed to initialize cache pool: {}", e);
                    e
                })?;
            store = Arc::new(posgate_backend::payments::callback::RedisCallbackStore::new(
                pool.clone(),
                &config.callback,
            ));
            health_checker = health_checker.with_cache(Some(pool));
            info!("Callback state stored in Redis");
        }
    }

    let transport = Arc::new(PaymentHttpClient::new(
        config.gateway.timeout(),
        config.gateway.max_retries,
    )?);
    let registry = Arc::new(ProviderRegistry::from_config(&config.gateway, transport)?);

    let health_checker = health_checker.with_providers(
        registry
            .list_available_providers()
            .iter()
            .map(|p| p.to_string())
            .collect(),
    );

    let checkout = Arc::new(CheckoutService::new(
        registry,
        store,
        audit,
        config.callback.ttl(),
    ));

    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let sweeper_config = CallbackSweeperConfig::from(&config.callback);
    let sweeper = CallbackSweeper::new(checkout.clone(), sweeper_config);
    let sweeper_handle = tokio::spawn(sweeper.run(worker_shutdown_rx));

    let app = api::router(AppState::new(checkout, health_checker));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if tokio::time::timeout(Duration::from_secs(5), sweeper_handle)
        .await
        .is_err()
    {
        warn!("Callback sweeper did not stop within 5 seconds");
    }

    info!("Server shutdown complete");
    Ok(())
}
