use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::contracts::{SequenceError, SequenceRecord, SequenceStore, StorageError};
use crate::metrics::MetricsRegistry;

/// Server-wide request counters.
#[derive(Default)]
pub struct Metrics {
    pub next_total: AtomicU64,
    pub reads_total: AtomicU64,
    pub sets_total: AtomicU64,
    pub creates_total: AtomicU64,
    pub errors_total: AtomicU64,
    pub start_time: std::sync::OnceLock<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        let m = Self::default();
        let _ = m.start_time.set(Instant::now());
        m
    }

    pub fn record_next(&self) {
        self.next_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read(&self) {
        self.reads_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_create(&self) {
        self.creates_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    fn uptime_secs(&self) -> f64 {
        self.start_time
            .get()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Application state shared across handlers.
pub struct AppState<S: SequenceStore> {
    pub store: Arc<S>,
    pub metrics: Arc<Metrics>,
    pub metrics_registry: Arc<MetricsRegistry>,
}

impl<S: SequenceStore> AppState<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            metrics: Arc::new(Metrics::new()),
            metrics_registry: Arc::new(MetricsRegistry::new()),
        }
    }

    /// Counts a failed request and converts it for the response.
    fn fail(&self, e: StorageError) -> ApiError {
        let err = ApiError::from(e);
        self.metrics.record_error();
        self.metrics_registry.api.record_error(err.code());
        err
    }
}

/// A sequence and its value.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SequenceResponse {
    pub name: String,
    pub value: u64,
}

impl From<SequenceRecord> for SequenceResponse {
    fn from(record: SequenceRecord) -> Self {
        Self {
            name: record.name,
            value: record.value,
        }
    }
}

/// Response for listing sequences.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListSequencesResponse {
    pub sequences: Vec<SequenceResponse>,
    pub count: usize,
}

/// Request body for creating a sequence.
#[derive(Debug, Default, Deserialize)]
pub struct CreateSequenceRequest {
    #[serde(default)]
    pub initial: u64,
}

/// Response for creating a sequence.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSequenceResponse {
    pub name: String,
    pub value: u64,
    pub created: bool,
}

/// Request body for setting a sequence value.
#[derive(Debug, Deserialize)]
pub struct SetSequenceRequest {
    pub value: u64,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    Storage(StorageError),
    BadRequest(String),
}

impl ApiError {
    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Storage(StorageError::InvalidInput(_)) => "INVALID_INPUT",
            ApiError::Storage(StorageError::SequenceNotFound(_)) => "SEQUENCE_NOT_FOUND",
            ApiError::Storage(StorageError::Sequence(SequenceError::Overflow)) => {
                "SEQUENCE_OVERFLOW"
            }
            ApiError::Storage(_) => "STORAGE_ERROR",
            ApiError::BadRequest(_) => "BAD_REQUEST",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Storage(StorageError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Storage(StorageError::SequenceNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Storage(StorageError::Sequence(SequenceError::Overflow)) => {
                StatusCode::CONFLICT
            }
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let code = self.code().to_string();
        let error = match self {
            ApiError::Storage(e) => {
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %e, "Sequence store failure");
                }
                e.to_string()
            }
            ApiError::BadRequest(msg) => msg,
        };

        (status, Json(ErrorResponse { error, code })).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Storage(e)
    }
}

/// Parses an optional JSON body; an empty body means `T::default()`.
fn parse_optional_body<T: Default + for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))
}

fn safe_rate(count: u64, duration_secs: f64) -> f64 {
    if duration_secs > 0.0 {
        count as f64 / duration_secs
    } else {
        0.0
    }
}

/// POST /sequences/{name}/next
/// Atomically increment a sequence and return the new value.
pub async fn next_value<S: SequenceStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(name): Path<String>,
) -> Result<Json<SequenceResponse>, ApiError> {
    let start = Instant::now();

    let value = state.store.next_value(&name).map_err(|e| state.fail(e))?;

    let latency_us = state
        .metrics_registry
        .api
        .next_latency_us
        .observe_since(start);
    state.metrics.record_next();
    state
        .metrics_registry
        .sequences
        .record_increment(&name, value);

    tracing::trace!(name = %name, value, latency_us, "Issued sequence value");

    Ok(Json(SequenceResponse { name, value }))
}

/// GET /sequences/{name}
/// Read the current value of a sequence.
pub async fn get_sequence<S: SequenceStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(name): Path<String>,
) -> Result<Json<SequenceResponse>, ApiError> {
    let start = Instant::now();

    let value = state
        .store
        .current_value(&name)
        .map_err(|e| state.fail(e))?;

    state
        .metrics_registry
        .api
        .read_latency_us
        .observe_since(start);
    state.metrics.record_read();

    Ok(Json(SequenceResponse { name, value }))
}

/// PUT /sequences/{name}
/// Overwrite the value of a sequence, creating it if needed.
pub async fn set_sequence<S: SequenceStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(name): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<SequenceResponse>, ApiError> {
    let start = Instant::now();

    let request: SetSequenceRequest = serde_json::from_slice(&body).map_err(|e| {
        state.metrics.record_error();
        state.metrics_registry.api.record_error("BAD_REQUEST");
        ApiError::BadRequest(format!("Invalid JSON: {}", e))
    })?;

    state
        .store
        .set_value(&name, request.value)
        .map_err(|e| state.fail(e))?;

    state
        .metrics_registry
        .api
        .set_latency_us
        .observe_since(start);
    state.metrics.record_set();
    state
        .metrics_registry
        .sequences
        .record_set(&name, request.value);

    Ok(Json(SequenceResponse {
        name,
        value: request.value,
    }))
}

/// POST /sequences/{name}
/// Create a sequence at an initial value. Existing sequences are left as they are.
pub async fn create_sequence<S: SequenceStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(name): Path<String>,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<CreateSequenceResponse>), ApiError> {
    let start = Instant::now();

    let request: CreateSequenceRequest = parse_optional_body(&body).inspect_err(|e| {
        state.metrics.record_error();
        state.metrics_registry.api.record_error(e.code());
    })?;

    let created = state
        .store
        .create_sequence(&name, request.initial)
        .map_err(|e| state.fail(e))?;

    // New counters report their seed, not whatever a racing increment left
    let value = if created {
        request.initial
    } else {
        state
            .store
            .current_value(&name)
            .map_err(|e| state.fail(e))?
    };

    state
        .metrics_registry
        .api
        .create_latency_us
        .observe_since(start);
    state.metrics.record_create();
    state.metrics_registry.sequences.record_value(&name, value);

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(CreateSequenceResponse {
            name,
            value,
            created,
        }),
    ))
}

/// GET /sequences
/// List every sequence with its current value.
pub async fn list_sequences<S: SequenceStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<ListSequencesResponse>, ApiError> {
    let start = Instant::now();

    let sequences: Vec<SequenceResponse> = state
        .store
        .list_sequences()
        .map_err(|e| state.fail(e))?
        .into_iter()
        .map(SequenceResponse::from)
        .collect();

    state
        .metrics_registry
        .api
        .read_latency_us
        .observe_since(start);
    state.metrics.record_read();

    Ok(Json(ListSequencesResponse {
        count: sequences.len(),
        sequences,
    }))
}

/// GET /health
/// Health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy"
    }))
}

/// GET /health/live
/// Liveness probe; always OK while the server responds.
pub async fn health_live() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Response for readiness endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub create_policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /health/ready
/// Readiness probe; verifies the sequence store answers a scan.
pub async fn health_ready<S: SequenceStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let create_policy = state.store.create_policy().to_string();

    match state.store.list_sequences() {
        Ok(_) => Ok(Json(ReadinessResponse {
            status: "ready".into(),
            create_policy,
            error: None,
        })),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready".into(),
                    create_policy,
                    error: Some(e.to_string()),
                }),
            ))
        }
    }
}

/// Response for stats endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub uptime_secs: f64,
    pub next: NextStats,
    pub reads: ReadStats,
    pub sets_total: u64,
    pub creates_total: u64,
    pub errors_total: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NextStats {
    pub total: u64,
    pub rate_per_sec: f64,
    pub avg_latency_us: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadStats {
    pub total: u64,
    pub rate_per_sec: f64,
    pub avg_latency_us: f64,
}

/// GET /stats
/// Server statistics.
pub async fn get_stats<S: SequenceStore>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    let metrics = &state.metrics;
    let uptime_secs = metrics.uptime_secs();

    let next_total = metrics.next_total.load(Ordering::Relaxed);
    let reads_total = metrics.reads_total.load(Ordering::Relaxed);
    let api = &state.metrics_registry.api;

    Json(StatsResponse {
        uptime_secs,
        next: NextStats {
            total: next_total,
            rate_per_sec: safe_rate(next_total, uptime_secs),
            avg_latency_us: api.next_latency_us.snapshot().mean(),
        },
        reads: ReadStats {
            total: reads_total,
            rate_per_sec: safe_rate(reads_total, uptime_secs),
            avg_latency_us: api.read_latency_us.snapshot().mean(),
        },
        sets_total: metrics.sets_total.load(Ordering::Relaxed),
        creates_total: metrics.creates_total.load(Ordering::Relaxed),
        errors_total: metrics.errors_total.load(Ordering::Relaxed),
    })
}

/// GET /metrics
/// Metrics in Prometheus text exposition format.
pub async fn metrics<S: SequenceStore>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    let metrics = &state.metrics;

    let mut output = format!(
        "# HELP seqd_uptime_secs Server uptime in seconds\n\
         # TYPE seqd_uptime_secs gauge\n\
         seqd_uptime_secs {:.3}\n\
         \n\
         # HELP seqd_next_total Total next-value requests served\n\
         # TYPE seqd_next_total counter\n\
         seqd_next_total {}\n\
         \n\
         # HELP seqd_reads_total Total read requests served\n\
         # TYPE seqd_reads_total counter\n\
         seqd_reads_total {}\n\
         \n\
         # HELP seqd_sets_total Total set requests served\n\
         # TYPE seqd_sets_total counter\n\
         seqd_sets_total {}\n\
         \n\
         # HELP seqd_creates_total Total create requests served\n\
         # TYPE seqd_creates_total counter\n\
         seqd_creates_total {}\n\
         \n\
         # HELP seqd_errors_total Total failed requests\n\
         # TYPE seqd_errors_total counter\n\
         seqd_errors_total {}\n\
         \n",
        metrics.uptime_secs(),
        metrics.next_total.load(Ordering::Relaxed),
        metrics.reads_total.load(Ordering::Relaxed),
        metrics.sets_total.load(Ordering::Relaxed),
        metrics.creates_total.load(Ordering::Relaxed),
        metrics.errors_total.load(Ordering::Relaxed),
    );

    output.push_str(&state.metrics_registry.format_prometheus());

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        output,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_and_statuses() {
        let cases = [
            (
                ApiError::Storage(StorageError::InvalidInput("x".into())),
                "INVALID_INPUT",
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Storage(StorageError::SequenceNotFound("x".into())),
                "SEQUENCE_NOT_FOUND",
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Storage(StorageError::Sequence(SequenceError::Overflow)),
                "SEQUENCE_OVERFLOW",
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Storage(StorageError::RocksDb("io".into())),
                "STORAGE_ERROR",
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::BadRequest("nope".into()),
                "BAD_REQUEST",
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, code, status) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.status(), status);
        }
    }

    #[test]
    fn empty_body_uses_default() {
        let request: CreateSequenceRequest = parse_optional_body(b"").unwrap();
        assert_eq!(request.initial, 0);

        let request: CreateSequenceRequest = parse_optional_body(b"  \n").unwrap();
        assert_eq!(request.initial, 0);

        let request: CreateSequenceRequest = parse_optional_body(br#"{"initial": 8}"#).unwrap();
        assert_eq!(request.initial, 8);

        assert!(parse_optional_body::<CreateSequenceRequest>(b"{").is_err());
    }

    #[test]
    fn rate_handles_zero_uptime() {
        assert_eq!(safe_rate(10, 0.0), 0.0);
        assert_eq!(safe_rate(10, 4.0), 2.5);
    }
}
