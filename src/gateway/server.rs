//! HTTP server setup and configuration.

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use reqwest::Client;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::{handlers, logs, stats};
use crate::config::{Config, KeySource};
use crate::provider::build_providers;
use crate::router::{FailoverPolicy, FailoverRouter};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<FailoverRouter>,
    pub config: Arc<Config>,
    /// Per-provider key provenance, for diagnostics (never the keys themselves).
    pub key_sources: Arc<Vec<(String, KeySource)>>,
    /// Absent when config has no `[database]` section; the stats and request
    /// log endpoints 404 in that case.
    pub db: Option<SqlitePool>,
}

/// Correlation ID assigned to every request as it enters the gateway.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

async fn assign_request_id(mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(RequestId(Uuid::new_v4()));
    next.run(request).await
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Generation
        .route("/v1/generate", post(handlers::generate))
        // Observability
        .route("/v1/stats", get(stats::stats_handler))
        .route("/v1/requests", get(logs::logs_handler))
        .route("/health", get(handlers::health))
        .route("/providers", get(handlers::list_providers))
        // State and middleware
        .with_state(state)
        .layer(middleware::from_fn(assign_request_id))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server.
pub async fn run_server(
    config: Config,
    key_sources: Vec<(String, KeySource)>,
) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();

    // No total timeout on the client: the failover loop bounds each attempt
    // itself so a per-request override can take effect.
    let http_client = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let providers = build_providers(&config.providers, &http_client);
    let policy = FailoverPolicy::from_config(&config.failover);
    let failover_router = FailoverRouter::new(providers, policy);

    let db = match &config.database {
        Some(db_config) => {
            let pool = crate::storage::init_pool(&db_config.path).await?;
            tracing::info!(path = %db_config.path, "Request logging enabled");
            Some(pool)
        }
        None => {
            tracing::info!("No [database] section in config; request logging disabled");
            None
        }
    };

    let state = AppState {
        router: Arc::new(failover_router),
        config: Arc::new(config),
        key_sources: Arc::new(key_sources),
        db,
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting backstop gateway");

    axum::serve(listener, app).await?;

    Ok(())
}
