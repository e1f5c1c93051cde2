//! KubeFleet Control Plane Server
//!
//! An async Rust server that provides the control plane API for KubeFleet,
//! handling cluster records, cloud accounts and the background tasks that
//! provision and tear down cluster machines.

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kubefleet_control_plane::{
    config::{AppConfig, DatabaseConfig, StorageBackend},
    handlers,
    reactions::{Continuations, RetryPolicy},
    services::{AccountService, ClusterService},
    state::AppState,
    storage::{create_pool, MemoryStorage, PostgresStorage, Storage},
    workflows::{FileLogSinks, TaskEngine, TaskRepository, WorkflowCatalog, WorkflowRegistry},
};
use kubefleet_steps::StepRegistry;

/// Initialize tracing/logging.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,kubefleet_control_plane=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the application router with middleware.
fn build_router(state: AppState, account_service: AccountService) -> Router {
    // CORS configuration - allow all origins for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    handlers::router(state, account_service)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Open the configured storage backend.
async fn open_storage(config: &AppConfig) -> anyhow::Result<Arc<dyn Storage>> {
    match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, records are lost on restart");
            Ok(Arc::new(MemoryStorage::new()))
        }
        StorageBackend::Postgres => {
            let db_config = DatabaseConfig::from_env().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to load database config, using defaults");
                DatabaseConfig::default()
            });
            let pool = create_pool(&db_config).await?;
            let storage = PostgresStorage::new(pool, &db_config.schema)?;
            storage.ensure_schema().await?;
            tracing::info!(table = %storage.table(), "PostgreSQL storage ready");
            Ok(Arc::new(storage))
        }
    }
}

/// Builtin workflows plus whatever the catalog file adds.
async fn load_registries(config: &AppConfig) -> anyhow::Result<(WorkflowRegistry, StepRegistry)> {
    let mut workflows = WorkflowRegistry::builtin();
    let mut steps = StepRegistry::new();

    if let Some(ref path) = config.catalog_file {
        let catalog = WorkflowCatalog::from_file(path).await?;
        catalog.apply(&mut steps, &mut workflows);
        tracing::info!(path = %path.display(), "Workflow catalog loaded");
    }

    for kind in workflows.kinds() {
        let missing: Vec<&str> = workflows
            .steps(kind)?
            .iter()
            .map(String::as_str)
            .filter(|name| !steps.has(name))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(workflow = %kind, missing = ?missing, "Workflow has unregistered steps");
        }
    }

    Ok((workflows, steps))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting KubeFleet Control Plane"
    );

    let app_config = AppConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load app config, using defaults");
        AppConfig::default()
    });

    tracing::info!(
        server_name = %app_config.server_name,
        host = %app_config.host,
        port = app_config.port,
        storage = ?app_config.storage,
        log_dir = %app_config.log_dir.display(),
        "Configuration loaded"
    );

    let storage = open_storage(&app_config).await?;
    let (workflows, steps) = load_registries(&app_config).await?;

    let engine = TaskEngine::new(
        Arc::new(workflows),
        Arc::new(steps),
        TaskRepository::new(storage.clone()),
        Arc::new(FileLogSinks::new(app_config.log_dir.clone())),
    );
    let account_service = AccountService::new(storage.clone());
    let continuations = Continuations::new(RetryPolicy::from_config(&app_config));

    let state = AppState::new(
        app_config.clone(),
        ClusterService::new(storage),
        Arc::new(account_service.clone()),
        engine,
        continuations,
    );
    let shutdown = state.shutdown.clone();
    let engine = state.engine.clone();

    let app = build_router(state, account_service);

    let addr: SocketAddr = app_config.bind_address().parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // cancel in-flight task runs and let them record the failure
    shutdown.cancel();
    let grace = app_config.shutdown_grace();
    if tokio::time::timeout(grace, engine.drain()).await.is_err() {
        tracing::warn!(grace_secs = grace.as_secs(), "Task runs still active at shutdown");
    }
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
