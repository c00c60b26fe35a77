//! HTTP query service.
//!
//! Routes:
//! - `GET /health` - liveness probe
//! - `GET /api/traces?from&to&count&exclusive` - range query, ascending
//! - `GET /api/traces/:id` - single record
//! - `GET /api/traces/:id/payload` - retained raw payload
//! - `GET /api/stats` - store size and ingestion counters
//! - `GET /` - redirect to `/index.html`
//! - anything else - static files from the content directory

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::error;
use traceview::event::{EventId, EventRecord};
use traceview::ingest::{IngestCounts, IngestStats};
use traceview::{TraceQuery, TraceStore, TraceviewError};

/// Shared state handed to every handler.
pub struct ApiState {
    store: Arc<dyn TraceStore>,
    ingest: Arc<IngestStats>,
}

/// The query service. Built once at startup and owned by whoever starts
/// and stops it.
pub struct QueryApi {
    state: Arc<ApiState>,
    content_dir: PathBuf,
}

impl QueryApi {
    /// Creates the service over a store and the pipeline's counters.
    pub fn new(
        store: Arc<dyn TraceStore>,
        ingest: Arc<IngestStats>,
        content_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            state: Arc::new(ApiState { store, ingest }),
            content_dir: content_dir.into(),
        }
    }

    /// Builds the router with every endpoint and the static fallback.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/", get(home))
            .route("/health", get(health_check))
            .route("/api/traces", get(list_traces))
            .route("/api/traces/:id", get(get_trace))
            .route("/api/traces/:id/payload", get(get_payload))
            .route("/api/stats", get(get_stats))
            .fallback_service(ServeDir::new(&self.content_dir))
            .layer(cors)
            .with_state(Arc::clone(&self.state))
    }

    /// Serves on `listener` until `shutdown` resolves, then finishes
    /// in-flight requests and returns.
    ///
    /// # Errors
    ///
    /// Returns the I/O error that stopped the server.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> io::Result<()> {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    /// Human-readable message.
    pub error: String,
    /// Machine-readable code.
    pub code: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            error: message.into(),
            code: code.to_string(),
        }
    }

    /// 404 with a `NOT_FOUND` code.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// 400 with a `BAD_REQUEST` code.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }
}

impl From<TraceviewError> for ApiError {
    fn from(err: TraceviewError) -> Self {
        match err {
            TraceviewError::Query(e) => Self::bad_request(e.to_string()),
            TraceviewError::Store(e) => {
                error!(error = %e, "store failure while serving query");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", e.to_string())
            }
            other => {
                error!(error = %other, "unexpected error while serving query");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Raw range query parameters. Validation happens in [`TraceQuery`].
#[derive(Debug, Default, Deserialize)]
pub struct TraceParams {
    from: Option<String>,
    to: Option<String>,
    count: Option<String>,
    exclusive: Option<String>,
}

/// Response body of `/api/stats`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    /// Records currently stored.
    pub records: usize,
    /// Ingestion counters.
    pub ingest: IngestCounts,
}

async fn health_check() -> &'static str {
    "OK"
}

async fn home() -> Redirect {
    Redirect::to("/index.html")
}

async fn list_traces(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<TraceParams>,
) -> Result<Json<Vec<Arc<EventRecord>>>, ApiError> {
    let query = TraceQuery::from_params(
        params.from.as_deref(),
        params.to.as_deref(),
        params.count.as_deref(),
        Utc::now(),
    )?
    .with_exclusive_param(params.exclusive.as_deref())?;

    let records = state
        .store
        .list_by_time_range(query.count, query.from, query.to, query.exclusive)?;
    Ok(Json(records))
}

fn parse_id(raw: &str) -> Result<EventId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("invalid trace id '{raw}'")))
}

async fn get_trace(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Arc<EventRecord>>, ApiError> {
    let id = parse_id(&id)?;
    state
        .store
        .get_by_id(&id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("trace '{id}' not found")))
}

async fn get_payload(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<String, ApiError> {
    let id = parse_id(&id)?;
    state
        .store
        .original_payload(&id)?
        .map(|payload| payload.to_string())
        .ok_or_else(|| ApiError::not_found(format!("no payload retained for trace '{id}'")))
}

async fn get_stats(State(state): State<Arc<ApiState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        records: state.store.len(),
        ingest: state.ingest.snapshot(),
    })
}
