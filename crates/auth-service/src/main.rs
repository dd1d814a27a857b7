use auth_service::cache::{CacheStore, RedisCache};
use auth_service::clock::{Clock, SystemClock};
use auth_service::config::Config;
use auth_service::credentials::{CredentialListener, CredentialRotator};
use auth_service::db::{ConnectionManager, PgConnector, PingPolicy};
use auth_service::health::HealthMonitor;
use auth_service::lifecycle::TokenLifecycleManager;
use auth_service::observability::metrics::init_metrics_recorder;
use auth_service::routes::{self, AppState};
use auth_service::secrets::{SecretsClient, StaticSecrets, VaultClient};
use auth_service::store::{DurableStore, PgStore};
use auth_service::tasks::start_token_sweeper;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Lease assumed for static credentials; they are never rotated.
const STATIC_LEASE: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    init_tracing(config.as_ref().is_ok_and(|c| c.json_logs));

    info!("Starting Auth Service");

    let config = config.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Credentials: rotated from Vault when configured, static otherwise.
    let secrets: Arc<dyn SecretsClient> = match &config.vault {
        Some(vault) => {
            info!(role_path = %vault.role_path, "Using Vault for database credentials");
            Arc::new(VaultClient::new(vault)?)
        }
        None => {
            warn!("VAULT_ADDR not set, using static database credentials");
            Arc::new(StaticSecrets::new(
                config.database.user.clone(),
                config.database.password.clone(),
            ))
        }
    };
    let fallback_lease = config
        .vault
        .as_ref()
        .map_or(STATIC_LEASE, |vault| vault.lease_duration);
    let rotator = Arc::new(CredentialRotator::new(secrets, fallback_lease, clock.clone()));

    let credentials = rotator.initialize().await.map_err(|e| {
        error!("Failed to fetch initial database credentials: {}", e);
        e
    })?;

    info!("Connecting to database...");
    let connections = Arc::new(
        ConnectionManager::connect(
            PgConnector::new(config.database.clone()),
            &credentials,
            PingPolicy::default(),
        )
        .await?,
    );
    info!("Database connection established");

    sqlx::migrate!("../../migrations")
        .run(&connections.connection().await)
        .await
        .map_err(|e| {
            error!("Failed to run migrations: {}", e);
            e
        })?;

    let store: Arc<dyn DurableStore> = Arc::new(PgStore::new(connections.clone()));
    let cache: Arc<dyn CacheStore> =
        Arc::new(RedisCache::new(&config.redis_url)?.with_timeout(config.store_timeout));

    let health = Arc::new(
        HealthMonitor::new(cache.clone(), store.clone(), clock.clone())
            .with_cache_window(config.health_cache_window),
    );
    let lifecycle = Arc::new(
        TokenLifecycleManager::new(
            cache,
            store,
            health.clone(),
            config.tokens.clone(),
            clock,
        )
        .with_store_timeout(config.store_timeout)
        .with_bcrypt_cost(config.bcrypt_cost),
    );

    // Background loops
    let cancel_token = CancellationToken::new();
    let mut background = Vec::new();

    if config.vault.is_some() {
        let listener: Arc<dyn CredentialListener> = connections.clone();
        background.push(tokio::spawn(
            rotator.clone().start_rotation(listener, cancel_token.child_token()),
        ));
    }
    background.push(tokio::spawn(start_token_sweeper(
        lifecycle.clone(),
        config.sweep_interval,
        cancel_token.child_token(),
    )));

    let state = Arc::new(AppState { lifecycle, health });
    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Auth Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    cancel_token.cancel();
    for task in background {
        if let Err(e) = task.await {
            warn!("Background task ended abnormally: {}", e);
        }
    }

    info!("Auth Service shutdown complete");
    Ok(())
}

fn init_tracing(json_logs: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "auth_service=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Returns on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal_or_park("SIGINT", signal::ctrl_c().await).await;
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

/// Returns once the signal fired. A handler that failed to install parks
/// forever instead, so it never triggers shutdown on its own.
async fn signal_or_park(name: &str, received: std::io::Result<()>) {
    match received {
        Ok(()) => info!("Received {}, starting graceful shutdown...", name),
        Err(e) => {
            error!("Failed to listen for {}: {}", name, e);
            std::future::pending::<()>().await;
        }
    }
}
