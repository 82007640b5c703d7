//! Gateway
//!
//! Entry point for the auth and routing gateway.

use gateway_service::config::Config;
use gateway_service::observability::metrics::init_metrics_recorder;
use gateway_service::repositories::{
    EphemeralKeyStore, FileKeyStore, InMemoryRouteStore, KeyStore, PgRouteStore, RouteStore,
};
use gateway_service::routes::{self, AppState};
use gateway_service::services::key_manager::KeyManager;
use gateway_service::tasks::start_key_rotation;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Gateway");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        key_rotation_interval_seconds = config.key_rotation_interval_seconds,
        forward_timeout_seconds = config.forward_timeout_seconds,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    // Signing keys
    let key_store: Arc<dyn KeyStore> = match &config.jwt_key_path {
        Some(path) => Arc::new(FileKeyStore::new(path.clone())),
        None => {
            warn!("JWT_KEY_PATH not set, signing keys will not survive a restart");
            Arc::new(EphemeralKeyStore)
        }
    };
    let keys = Arc::new(KeyManager::initialize(key_store).await.map_err(|e| {
        error!("Failed to initialize signing keys: {}", e);
        e
    })?);
    keys.report_key_age();

    // Route store
    let route_store: Arc<dyn RouteStore> = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .min_connections(1)
                .acquire_timeout(Duration::from_secs(5))
                .idle_timeout(Duration::from_secs(600))
                .connect(database_url)
                .await
                .map_err(|e| {
                    error!("Failed to connect to database: {}", e);
                    e
                })?;
            sqlx::migrate!("../../migrations")
                .run(&pool)
                .await
                .map_err(|e| {
                    error!("Failed to run migrations: {}", e);
                    e
                })?;
            info!("Database connection established");
            Arc::new(PgRouteStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, route rules are held in memory");
            Arc::new(InMemoryRouteStore::new())
        }
    };

    let bind_address = config.bind_address.clone();
    let rotation_interval = Duration::from_secs(config.key_rotation_interval_seconds);
    let routes_file = config.routes_file.clone();

    let state = Arc::new(AppState::new(config, keys.clone(), route_store)?);

    if let Some(path) = routes_file {
        let json = tokio::fs::read_to_string(&path).await.map_err(|e| {
            error!("Failed to read routes file {}: {}", path.display(), e);
            e
        })?;
        let count = state.routes.seed_from_json(&json).await.map_err(|e| {
            error!("Failed to seed routes from {}: {}", path.display(), e);
            e
        })?;
        info!(count = count, "Seeded route rules");
    }

    // Background key rotation
    let cancel_token = CancellationToken::new();
    let rotation_handle = tokio::spawn(start_key_rotation(
        keys,
        rotation_interval,
        cancel_token.clone(),
    ));

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel_token.cancel();
    if let Err(e) = rotation_handle.await {
        warn!("Key rotation task did not shut down cleanly: {}", e);
    }

    info!("Gateway shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
