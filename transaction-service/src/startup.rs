//! Application startup and lifecycle management.

use crate::config::TransactionConfig;
use crate::services::{
    get_metrics, init_metrics, CleanupManager, Database, DuplicateDetector, ImportCoordinator,
    LocalStorage, SnapshotCache,
};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: TransactionConfig,
    pub db: Arc<Database>,
    pub cache: Arc<SnapshotCache>,
    pub coordinator: Arc<ImportCoordinator>,
}

/// Health check endpoint for liveness probes: database reachability plus
/// the cache condition.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let cache_status = state.cache.status().await;
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "transaction-service",
                    "version": env!("CARGO_PKG_VERSION"),
                    "cache": cache_status,
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "transaction-service",
                    "error": e.to_string(),
                    "cache": cache_status,
                })),
            )
        }
    }
}

/// Readiness check endpoint.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Administrative hook: synchronous snapshot reload. Errors surface to
/// this caller; other readers keep the previous snapshot.
async fn cache_refresh(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let snapshot = state.cache.refresh().await?;
    Ok(Json(json!({
        "status": "refreshed",
        "row_count": snapshot.row_count,
        "loaded_at": snapshot.loaded_at,
    })))
}

/// Administrative hook: mark the snapshot stale without blocking.
async fn cache_invalidate(State(state): State<AppState>) -> impl IntoResponse {
    state.cache.invalidate();
    (StatusCode::ACCEPTED, Json(json!({ "status": "invalidated" })))
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: TransactionConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: TransactionConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(
        config: TransactionConfig,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let db = Arc::new(db);
        let store: Arc<dyn crate::services::TransactionStore> = db.clone();

        let cache = Arc::new(SnapshotCache::new(
            store.clone(),
            Duration::from_secs(config.cache.ttl_minutes * 60),
        ));

        let storage = Arc::new(
            LocalStorage::new(config.storage.artifact_root.clone())
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to open artifact storage root");
                    e
                })?,
        );

        let coordinator = Arc::new(ImportCoordinator::new(
            store.clone(),
            DuplicateDetector::new(store.clone(), config.dedup.lookback_days),
            cache.clone(),
            CleanupManager::new(storage),
            chrono::Duration::minutes(config.import.decision_timeout_minutes),
        ));

        // First load can take tens of seconds at large row counts; a warm
        // failure is not fatal, the first read retries.
        if config.cache.warm_on_startup {
            match cache.warm().await {
                Ok(snapshot) => {
                    tracing::info!(row_count = snapshot.row_count, "Snapshot cache warmed")
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Cache warm failed - first read will reload")
                }
            }
        }

        let state = AppState {
            config: config.clone(),
            db,
            cache,
            coordinator,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Transaction service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .route("/admin/cache/refresh", post(cache_refresh))
            .route("/admin/cache/invalidate", post(cache_invalidate))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(self.state);

        tracing::info!(
            service = "transaction-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await
    }
}
