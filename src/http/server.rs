//! HTTP API Server for streamtree
//!
//! Serves the TREE views of streams, fragmentations and buckets, plus the
//! operator endpoints that register streams, ingest events and start builds.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, RawQuery, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    config::ServerConfig,
    core::{EventStream, Fragmentation},
    registry::{BuildMetadata, BuildRegistry},
    serving::{CreateFragmentation, DataService, OperatorService, PageRequest, RegisterStream, Reply},
    storage::Storage,
    Error,
};

const JSON_LD: &str = "application/ld+json";

/// Query parameters accepted by the data routes
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub since: Option<String>,
}

/// Response after ingesting a payload
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub stream: String,
    pub events: usize,
}

/// Response after pruning finished builds
#[derive(Debug, Serialize, Deserialize)]
pub struct PruneResponse {
    pub pruned: usize,
}

/// Generic success response
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Shared application state
pub struct AppState {
    pub data: DataService,
    pub operator: OperatorService,
}

/// Custom error type for API errors
pub struct ApiError(Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::StreamNotFound(_) | Error::FragmentationNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidRequest(_) | Error::InvalidCursor(_) | Error::Rdf(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Conflict(_) | Error::BuildRejected(_) => StatusCode::CONFLICT,
            Error::Storage(_) | Error::Config(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse { error: self.0.to_string() });
        (status, body).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Redirect(location) => {
                (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
            }
            Reply::Document(body) => ([(header::CONTENT_TYPE, JSON_LD)], Json(body)).into_response(),
        }
    }
}

fn page_request(params: PageParams, raw_query: Option<String>) -> PageRequest {
    PageRequest { since: params.since, raw_query }
}

/// Create the HTTP server with all routes
pub fn create_server(storage: Arc<dyn Storage>, builds: BuildRegistry, config: &ServerConfig) -> Router {
    let state = Arc::new(AppState {
        data: DataService::new(Arc::clone(&storage), config),
        operator: OperatorService::new(storage, builds, config.progress_interval),
    });

    // Configure CORS
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/data/:stream", get(get_collection))
        .route("/data/:stream/:fragmentation", get(get_fragmentation))
        .route("/data/:stream/:fragmentation/:bucket", get(get_fragment))
        .route("/streams", post(register_stream))
        .route("/streams/:stream/events", post(ingest_events))
        .route(
            "/streams/:stream/fragmentations",
            get(list_fragmentations).post(create_fragmentation),
        )
        .route("/streams/:stream/fragmentations/:fragmentation", delete(retire_fragmentation))
        .route("/builds", get(list_builds).delete(prune_builds))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(SuccessResponse { message: "streamtree is running".to_string() })
}

/// GET /data/:stream - One page of the raw event collection
async fn get_collection(
    State(state): State<Arc<AppState>>,
    Path(stream): Path<String>,
    Query(params): Query<PageParams>,
    RawQuery(raw_query): RawQuery,
) -> Result<Reply, ApiError> {
    let request = page_request(params, raw_query);
    Ok(state.data.collection(&stream, &request).await?)
}

/// GET /data/:stream/:fragmentation - Bucket index of a fragmentation
async fn get_fragmentation(
    State(state): State<Arc<AppState>>,
    Path((stream, fragmentation)): Path<(String, String)>,
    Query(params): Query<PageParams>,
    RawQuery(raw_query): RawQuery,
) -> Result<Reply, ApiError> {
    let request = page_request(params, raw_query);
    Ok(state.data.fragmentation_index(&stream, &fragmentation, &request).await?)
}

/// GET /data/:stream/:fragmentation/:bucket - Events of one bucket
async fn get_fragment(
    State(state): State<Arc<AppState>>,
    Path((stream, fragmentation, bucket)): Path<(String, String, String)>,
    Query(params): Query<PageParams>,
    RawQuery(raw_query): RawQuery,
) -> Result<Reply, ApiError> {
    let request = page_request(params, raw_query);
    Ok(state.data.fragment(&stream, &fragmentation, &bucket, &request).await?)
}

/// POST /streams - Register or rename a stream
async fn register_stream(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterStream>,
) -> Result<(StatusCode, Json<EventStream>), ApiError> {
    let stream = state.operator.register_stream(payload).await?;
    Ok((StatusCode::CREATED, Json(stream)))
}

/// POST /streams/:stream/events - Ingest an N-Quads payload
async fn ingest_events(
    State(state): State<Arc<AppState>>,
    Path(stream): Path<String>,
    body: String,
) -> Result<Json<IngestResponse>, ApiError> {
    let events = state.operator.ingest(&stream, &body).await?;
    Ok(Json(IngestResponse { stream, events }))
}

/// POST /streams/:stream/fragmentations - Define a fragmentation and start its build
async fn create_fragmentation(
    State(state): State<Arc<AppState>>,
    Path(stream): Path<String>,
    Json(payload): Json<CreateFragmentation>,
) -> Result<(StatusCode, Json<Fragmentation>), ApiError> {
    let fragmentation = state.operator.create_fragmentation(&stream, payload).await?;
    Ok((StatusCode::ACCEPTED, Json(fragmentation)))
}

/// GET /streams/:stream/fragmentations - Every fragmentation of a stream, any status
async fn list_fragmentations(
    State(state): State<Arc<AppState>>,
    Path(stream): Path<String>,
) -> Result<Json<Vec<Fragmentation>>, ApiError> {
    Ok(Json(state.operator.list_fragmentations(&stream).await?))
}

/// DELETE /streams/:stream/fragmentations/:fragmentation - Retire a fragmentation
async fn retire_fragmentation(
    State(state): State<Arc<AppState>>,
    Path((stream, fragmentation)): Path<(String, String)>,
) -> Result<Json<Fragmentation>, ApiError> {
    Ok(Json(state.operator.retire_fragmentation(&stream, &fragmentation).await?))
}

/// GET /builds - Status and progress of every build
async fn list_builds(State(state): State<Arc<AppState>>) -> Json<Vec<BuildMetadata>> {
    Json(state.operator.builds().list())
}

/// DELETE /builds - Forget every finished build
async fn prune_builds(State(state): State<Arc<AppState>>) -> Json<PruneResponse> {
    Json(PruneResponse { pruned: state.operator.builds().prune_finished() })
}

/// Start the HTTP server on an already bound listener until `shutdown` resolves
pub async fn start_server(
    listener: tokio::net::TcpListener,
    storage: Arc<dyn Storage>,
    builds: BuildRegistry,
    config: &ServerConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = create_server(storage, builds, config);

    info!(address = %listener.local_addr()?, base_url = %config.public_base_url(), "streamtree listening");
    info!("  GET    /data/:stream                              - Stream collection page");
    info!("  GET    /data/:stream/:fragmentation               - Fragmentation bucket index");
    info!("  GET    /data/:stream/:fragmentation/:bucket       - Bucket events");
    info!("  POST   /streams                                   - Register or rename a stream");
    info!("  POST   /streams/:stream/events                    - Ingest N-Quads");
    info!("  GET    /streams/:stream/fragmentations            - List fragmentations");
    info!("  POST   /streams/:stream/fragmentations            - Create fragmentation and build it");
    info!("  DELETE /streams/:stream/fragmentations/:name      - Retire a fragmentation");
    info!("  GET    /builds                                    - Build status");
    info!("  DELETE /builds                                    - Forget finished builds");

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await
}
