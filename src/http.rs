//! HTTP server implementation.
//!
//! Read API over discovered applications, scan control, and a Server-Sent
//! Events stream relaying publisher events to browsers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::{IntervalStream, ReceiverStream};

use crate::error::DiscoveryError;
use crate::etl::activity::{ApplicationStats, TrendingApplication};
use crate::etl::engine_db::{ApplicationQuery, EngineDb, EngineStats};
use crate::etl::model::{Application, ApplicationStatus, Category, Contract, ScanProgress};
use crate::etl::orchestrator::DiscoveryOrchestrator;
use crate::etl::publisher::{EventName, ProgressPublisher, ScanEvent};

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 500;
const DEFAULT_TRENDING: u32 = 10;
const DEFAULT_ACTIVITY_DAYS: u32 = 30;

/// Shortest SSE heartbeat interval; shorter settings are raised to it.
pub const MIN_HEARTBEAT: Duration = Duration::from_millis(100);

/// HTTP server state.
#[derive(Clone)]
pub struct HttpState {
    pub version: String,
    pub startup_time: i64,
    pub db: Arc<EngineDb>,
    pub orchestrator: Arc<DiscoveryOrchestrator>,
    pub publisher: Arc<ProgressPublisher>,
    /// Interval between SSE heartbeat events.
    pub heartbeat: Duration,
}

impl HttpState {
    pub fn new(
        db: Arc<EngineDb>,
        orchestrator: Arc<DiscoveryOrchestrator>,
        publisher: Arc<ProgressPublisher>,
    ) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            startup_time: chrono::Utc::now().timestamp(),
            db,
            orchestrator,
            publisher,
            heartbeat: Duration::from_secs(30),
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat.max(MIN_HEARTBEAT);
        self
    }
}

/// JSON error body with a status derived from the error kind.
pub struct ApiError(DiscoveryError);

impl<E: Into<DiscoveryError>> From<E> for ApiError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DiscoveryError::AlreadyRunning => StatusCode::CONFLICT,
            DiscoveryError::LookupNotFound(_) => StatusCode::NOT_FOUND,
            DiscoveryError::Validation(_) => StatusCode::BAD_REQUEST,
            DiscoveryError::TransientRemote(_) | DiscoveryError::PartialFailure { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(target: "scout::http", error = %self.0, "Request failed");
        }
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Health check response.
#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: i64,
}

/// Health check endpoint.
async fn health_handler(State(state): State<Arc<HttpState>>) -> Json<HealthResponse> {
    let now = chrono::Utc::now().timestamp();
    let uptime = now - state.startup_time;

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_seconds: uptime,
    })
}

async fn stats_handler(State(state): State<Arc<HttpState>>) -> ApiResult<EngineStats> {
    Ok(Json(state.db.get_stats().await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListParams {
    fn into_query(self) -> Result<ApplicationQuery, DiscoveryError> {
        let category = self
            .category
            .map(|c| c.to_ascii_uppercase().parse::<Category>())
            .transpose()
            .map_err(|e| DiscoveryError::Validation(e.to_string()))?;
        let status = self
            .status
            .map(|s| s.to_ascii_uppercase().parse::<ApplicationStatus>())
            .transpose()
            .map_err(|e| DiscoveryError::Validation(e.to_string()))?;

        Ok(ApplicationQuery {
            category,
            status,
            limit: self.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
            offset: self.offset.unwrap_or(0),
        })
    }
}

async fn list_applications_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Vec<Application>> {
    let query = params.into_query()?;
    Ok(Json(state.db.list_applications(&query).await?))
}

#[derive(Debug, Deserialize)]
pub struct TrendingParams {
    pub limit: Option<u32>,
}

async fn trending_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<TrendingParams>,
) -> ApiResult<Vec<TrendingApplication>> {
    let limit = params.limit.unwrap_or(DEFAULT_TRENDING).min(MAX_PAGE_SIZE);
    Ok(Json(state.orchestrator.activity().trending(limit).await?))
}

/// An application with its contracts and observed event signatures.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApplicationDetail {
    #[serde(flatten)]
    pub application: Application,
    pub contracts: Vec<Contract>,
    pub topics: Vec<String>,
}

async fn get_application(state: &HttpState, id: &str) -> Result<Application, DiscoveryError> {
    state
        .db
        .get_application(id)
        .await?
        .ok_or_else(|| DiscoveryError::LookupNotFound(format!("application {id}")))
}

async fn application_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
) -> ApiResult<ApplicationDetail> {
    let application = get_application(&state, &id).await?;
    let contracts = state.db.contracts_for_application(&id).await?;
    let topics = state.db.application_topics(&id).await?;

    Ok(Json(ApplicationDetail {
        application,
        contracts,
        topics,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ActivityParams {
    pub days: Option<u32>,
}

async fn activity_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
    Query(params): Query<ActivityParams>,
) -> ApiResult<ApplicationStats> {
    get_application(&state, &id).await?;
    let days = params.days.unwrap_or(DEFAULT_ACTIVITY_DAYS).clamp(1, 365);
    Ok(Json(
        state
            .orchestrator
            .activity()
            .application_stats(&id, days)
            .await?,
    ))
}

async fn contract_handler(
    State(state): State<Arc<HttpState>>,
    Path(address): Path<String>,
) -> ApiResult<Contract> {
    let address = scout_common::normalize_address(&address)?;
    state
        .db
        .get_contract(&address)
        .await?
        .map(Json)
        .ok_or_else(|| DiscoveryError::LookupNotFound(format!("contract {address}")).into())
}

async fn start_handler(State(state): State<Arc<HttpState>>) -> Result<Response, ApiError> {
    // Detached: callers follow the scan through /discovery/progress and /discovery/events.
    state.orchestrator.start()?;
    let progress = state.orchestrator.get_progress();
    Ok((StatusCode::ACCEPTED, Json(progress)).into_response())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    pub stopped: bool,
}

async fn stop_handler(State(state): State<Arc<HttpState>>) -> Json<StopResponse> {
    Json(StopResponse {
        stopped: state.orchestrator.stop(),
    })
}

async fn progress_handler(State(state): State<Arc<HttpState>>) -> Json<ScanProgress> {
    Json(state.orchestrator.get_progress())
}

fn sse_event(event: &ScanEvent) -> Result<Event, axum::Error> {
    let payload = event.payload().map_err(axum::Error::new)?;
    Event::default().event(event.name().as_str()).json_data(payload)
}

fn heartbeat_event() -> Result<Event, axum::Error> {
    Event::default()
        .event("heartbeat")
        .json_data(serde_json::json!({ "timestamp": chrono::Utc::now().timestamp_millis() }))
}

/// Streams every publisher event, starting with the current progress.
///
/// The subscription is released when the client disconnects and the stream
/// is dropped.
async fn events_handler(
    State(state): State<Arc<HttpState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let subscription = state.publisher.subscribe(&EventName::ALL);
    let guard = state.publisher.guard(subscription.id.clone());
    tracing::debug!(target: "scout::http", subscriber = %subscription.id, "SSE client connected");

    let initial = ScanEvent::Progress(state.orchestrator.get_progress());
    let events = ReceiverStream::new(subscription.events).map(move |event| {
        let _guard = &guard;
        sse_event(&event)
    });

    // interval_at panics on a zero period
    let period = state.heartbeat.max(MIN_HEARTBEAT);
    let heartbeats = IntervalStream::new(tokio::time::interval_at(
        tokio::time::Instant::now() + period,
        period,
    ))
        .map(|_| heartbeat_event());

    let stream = stream::once(async move { sse_event(&initial) })
        .chain(stream::select(events, heartbeats));

    Sse::new(stream)
}

/// Create the HTTP router with the read API, scan control and event stream.
pub fn create_http_router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/applications", get(list_applications_handler))
        .route("/applications/trending", get(trending_handler))
        .route("/applications/:id", get(application_handler))
        .route("/applications/:id/activity", get(activity_handler))
        .route("/contracts/:address", get(contract_handler))
        .route("/discovery/start", post(start_handler))
        .route("/discovery/stop", post(stop_handler))
        .route("/discovery/progress", get(progress_handler))
        .route("/discovery/events", get(events_handler))
        .with_state(Arc::new(state))
}
