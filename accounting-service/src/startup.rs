//! Application startup and lifecycle management.

use axum::{
    extract::State, http::StatusCode, middleware, response::IntoResponse, routing::get, Json,
    Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::{AccountingConfig, StorageBackend};
use crate::http::{api_router, AppState};
use crate::services::{
    get_metrics, init_metrics, AnomalyDetector, ChangeNotifier, DocumentBridge, Ledger,
    ReportEngine,
};
use crate::store::{memory::MemoryStore, postgres::PgStore, LedgerStore};

/// State for health check endpoints. `pg` is present only for the postgres
/// backend; the memory backend is healthy by construction.
#[derive(Clone)]
struct HealthState {
    pg: Option<PgStore>,
}

impl HealthState {
    async fn check(&self) -> Result<(), String> {
        match &self.pg {
            Some(pg) => pg.health_check().await.map_err(|e| e.to_string()),
            None => Ok(()),
        }
    }
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "accounting-service",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "accounting-service",
                    "error": e
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.check().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    health: HealthState,
}

impl Application {
    /// Build the application: connect storage, run migrations (postgres),
    /// bootstrap the ledger, and bind the listener.
    pub async fn build(config: AccountingConfig) -> Result<Self, AppError> {
        init_metrics();

        let (store, pg): (Arc<dyn LedgerStore>, Option<PgStore>) = match config.storage.backend {
            StorageBackend::Memory => {
                tracing::info!("Using in-memory storage backend");
                (Arc::new(MemoryStore::new()), None)
            }
            StorageBackend::Postgres => {
                let url = config.storage.url.as_deref().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL not set"))
                })?;
                let pg = PgStore::new(
                    url,
                    config.storage.max_connections,
                    config.storage.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    AppError::DatabaseError(anyhow::anyhow!("{e}"))
                })?;
                pg.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    AppError::DatabaseError(anyhow::anyhow!("{e}"))
                })?;
                (Arc::new(pg.clone()), Some(pg))
            }
        };

        let notifier = ChangeNotifier::new();
        let ledger = Ledger::new(Arc::clone(&store), notifier.clone());
        ledger.bootstrap().await.map_err(|e| {
            tracing::error!(error = %e, "Ledger bootstrap failed");
            AppError::InternalError(anyhow::anyhow!(e.to_string()))
        })?;

        let documents = DocumentBridge::new(Arc::clone(&store), ledger.clone(), notifier.clone());
        let reports = ReportEngine::new(Arc::clone(&store));
        let anomalies = AnomalyDetector::new(Arc::clone(&store));

        let state = AppState {
            config: config.clone(),
            ledger,
            documents,
            reports,
            anomalies,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Accounting service listener bound");

        Ok(Self {
            port,
            listener,
            state,
            health: HealthState { pg },
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = Router::new()
            .merge(api_router(self.state.clone()))
            .route("/health", get(health_check).with_state(self.health.clone()))
            .route("/ready", get(readiness_check).with_state(self.health.clone()))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware));

        tracing::info!(
            service = "accounting-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
