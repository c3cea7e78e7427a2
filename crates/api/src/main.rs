use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stride_api::config::{ServerConfig, StoreBackend};
use stride_api::router::build_app_router;
use stride_api::state::AppState;
use stride_api::{background, ws};
use stride_db::{MemoryStore, PgStore, WorkflowStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stride_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        backend = ?config.store_backend,
        "Loaded server configuration"
    );

    // --- Store ---
    let store: Arc<dyn WorkflowStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .expect("DATABASE_URL must be set for the postgres backend");

            let pool = stride_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            stride_db::health_check(&pool)
                .await
                .expect("Database health check failed");

            stride_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    // --- App state (registry, bus, dispatcher, engine) ---
    let state = AppState::new(Arc::clone(&store), config.clone());
    let registry = Arc::clone(&state.registry);
    let event_bus = Arc::clone(&state.event_bus);

    // Durable event log.
    let persistence_handle = tokio::spawn(stride_events::EventPersistence::run(
        Arc::clone(&store),
        event_bus.subscribe(),
    ));

    // --- Background services ---
    let cancel = CancellationToken::new();

    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(&registry),
        config.delivery.heartbeat_interval(),
        cancel.clone(),
    );
    let liveness_handle = ws::start_liveness_monitor(
        Arc::clone(&registry),
        config.delivery.liveness_grace(),
        cancel.clone(),
    );
    let overdue_handle = tokio::spawn(background::overdue_sweep::run(
        Arc::clone(&state.engine),
        Duration::from_secs(config.workflow.overdue_sweep_secs),
        cancel.clone(),
    ));
    let unfreeze_handle = tokio::spawn(background::scheduled_unfreeze::run(
        Arc::clone(&state.engine),
        Duration::from_secs(config.workflow.scheduled_unfreeze_sweep_secs),
        cancel.clone(),
    ));
    tracing::info!("Background services started (event log, heartbeat, liveness, overdue sweep, scheduled unfreeze)");

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let grace = Duration::from_secs(config.shutdown_timeout_secs);

    cancel.cancel();
    for (name, handle) in [
        ("heartbeat", heartbeat_handle),
        ("liveness monitor", liveness_handle),
        ("overdue sweep", overdue_handle),
        ("scheduled unfreeze", unfreeze_handle),
    ] {
        if tokio::time::timeout(grace, handle).await.is_err() {
            tracing::warn!(task = name, "Background task did not stop in time");
        }
    }
    tracing::info!("Background services stopped");

    let open = registry.connection_count().await;
    tracing::info!(open, "Closing remaining notification channels");
    registry.shutdown_all().await;

    // Dropping the last sender closes the bus and ends persistence.
    drop(event_bus);
    if tokio::time::timeout(grace, persistence_handle).await.is_err() {
        tracing::warn!("Event persistence did not drain in time");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
