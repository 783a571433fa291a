mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::contracts::{SeqdError, SequenceStore};

pub use handlers::{
    ApiError, AppState, CreateSequenceRequest, CreateSequenceResponse, ErrorResponse,
    ListSequencesResponse, Metrics, ReadinessResponse, SequenceResponse, SetSequenceRequest,
    StatsResponse,
};

/// Creates the API router.
pub fn create_router<S: SequenceStore + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::health_live))
        .route("/health/ready", get(handlers::health_ready::<S>))
        .route("/stats", get(handlers::get_stats::<S>))
        .route("/metrics", get(handlers::metrics::<S>))
        .route("/sequences", get(handlers::list_sequences::<S>))
        .route(
            "/sequences/:name",
            get(handlers::get_sequence::<S>)
                .post(handlers::create_sequence::<S>)
                .put(handlers::set_sequence::<S>),
        )
        .route("/sequences/:name/next", post(handlers::next_value::<S>))
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Creates a config from `SEQD_HOST` and `SEQD_PORT`.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            host: std::env::var("SEQD_HOST").unwrap_or(default.host),
            port: std::env::var("SEQD_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(default.port),
        }
    }
}

/// Starts the HTTP server.
pub async fn start_server<S, F>(
    config: ServerConfig,
    state: Arc<AppState<S>>,
    shutdown: F,
) -> Result<(), SeqdError>
where
    S: SequenceStore + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
