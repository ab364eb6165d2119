// crates/sticky-assign-http/src/server.rs
// ============================================================================
// Module: Sticky Assign HTTP Server
// Description: axum router, handlers, and server lifecycle.
// Purpose: Serve sticky assignments over bounded JSON HTTP.
// Dependencies: axum, sticky-assign-{config, core, store-sqlite}, tokio
// ============================================================================

//! ## Overview
//! [`StickyAssignServer`] owns the validated configuration and the assignment
//! service. Each request that touches the store runs the synchronous service
//! on tokio's blocking pool with a deadline derived from
//! `server.request_timeout_ms`.
//!
//! Error kinds map to status codes: validation is `400`, unprocessable is
//! `422`, infrastructure is `500`. Infrastructure details are logged and the
//! response carries a generic message.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use sticky_assign_config::StickyAssignConfig;
use sticky_assign_core::AssignError;
use sticky_assign_core::AssignmentService;
use sticky_assign_core::AssignmentSource;
use sticky_assign_core::AssignmentStore;
use sticky_assign_core::ErrorKind;
use sticky_assign_core::ExperimentId;
use sticky_assign_core::RequestDeadline;
use sticky_assign_core::SharedAssignmentStore;
use sticky_assign_core::Variant;
use sticky_assign_store_sqlite::SqliteAssignmentStore;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::telemetry::AssignMetricEvent;
use crate::telemetry::AssignMetrics;
use crate::telemetry::AssignOutcome;
use crate::telemetry::AssignRoute;
use crate::telemetry::NoopMetrics;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server lifecycle errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration rejected.
    #[error("config error: {0}")]
    Config(String),
    /// Store or runtime initialization failed.
    #[error("init error: {0}")]
    Init(String),
    /// Listener or connection failure.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Sticky assignment HTTP server.
pub struct StickyAssignServer {
    /// Validated configuration.
    config: StickyAssignConfig,
    /// Assignment service shared by handlers.
    service: AssignmentService,
    /// Metrics sink.
    metrics: Arc<dyn AssignMetrics>,
}

impl StickyAssignServer {
    /// Validates configuration and opens the `SQLite` assignment store.
    ///
    /// Opening the store touches the filesystem; async callers should run
    /// this on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration is invalid or the store
    /// cannot be opened.
    pub fn from_config(config: StickyAssignConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let store = SqliteAssignmentStore::new(config.store.to_sqlite_config())
            .map_err(|err| ServerError::Init(err.to_string()))?;
        Ok(Self::assemble(config, SharedAssignmentStore::from_store(store)))
    }

    /// Builds a server over an already opened store.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration is invalid.
    pub fn with_store(
        config: StickyAssignConfig,
        store: SharedAssignmentStore,
    ) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        Ok(Self::assemble(config, store))
    }

    /// Builds a server from validated configuration.
    fn assemble(config: StickyAssignConfig, store: SharedAssignmentStore) -> Self {
        Self {
            config,
            service: AssignmentService::new(store),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Replaces the metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn AssignMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Builds the axum router.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = Arc::new(ServerState {
            service: self.service.clone(),
            max_body_bytes: self.config.server.max_body_bytes,
            max_identifier_bytes: self.config.server.max_identifier_bytes,
            request_timeout: self.config.server.request_timeout(),
            metrics: Arc::clone(&self.metrics),
        });
        Router::new()
            .route("/health", get(handle_health))
            .route("/ready", get(handle_ready))
            .route("/assign", post(handle_assign))
            .route("/experiments/{experiment_id}/variants", get(handle_variants))
            .route("/experiments/{experiment_id}/assignments/{user_id}", get(handle_lookup))
            .fallback(handle_not_found)
            .with_state(state)
    }

    /// Binds `server.bind` and serves until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr =
            self.config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| ServerError::Transport(format!("http bind failed: {err}")))?;
        self.serve_listener(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when serving fails.
    pub async fn serve_listener<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener
            .local_addr()
            .map_err(|err| ServerError::Transport(format!("http listener failed: {err}")))?;
        tracing::info!(addr = %local_addr, "http server listening");
        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| ServerError::Transport(format!("http server failed: {err}")))?;
        tracing::info!("http server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// Handler state shared across requests.
struct ServerState {
    /// Assignment service.
    service: AssignmentService,
    /// Maximum request body size in bytes.
    max_body_bytes: usize,
    /// Maximum trimmed identifier size in bytes.
    max_identifier_bytes: usize,
    /// Per-request deadline.
    request_timeout: Duration,
    /// Metrics sink.
    metrics: Arc<dyn AssignMetrics>,
}

impl ServerState {
    /// Parses and bounds an assign request body.
    fn parse_assign_request(&self, bytes: &Bytes) -> Result<AssignRequest, ApiError> {
        if bytes.len() > self.max_body_bytes {
            return Err(ApiError::payload_too_large(self.max_body_bytes));
        }
        let request: AssignRequest = serde_json::from_slice(bytes)
            .map_err(|err| ApiError::bad_request(format!("invalid request body: {err}")))?;
        self.check_identifier("experimentId", &request.experiment_id)?;
        self.check_identifier("userId", &request.user_id)?;
        Ok(request)
    }

    /// Rejects identifiers longer than the configured limit after trimming.
    fn check_identifier(&self, field: &str, value: &str) -> Result<(), ApiError> {
        if value.trim().len() > self.max_identifier_bytes {
            return Err(ApiError::bad_request(format!(
                "{field} exceeds {} bytes",
                self.max_identifier_bytes
            )));
        }
        Ok(())
    }

    /// Records metrics and renders a JSON response.
    fn finish<T: Serialize>(
        &self,
        route: AssignRoute,
        started: Instant,
        status: StatusCode,
        source: Option<AssignmentSource>,
        body: &T,
    ) -> Response {
        self.record(route, started, status, source, None);
        (status, Json(body)).into_response()
    }

    /// Records metrics and renders an error response.
    fn fail(&self, route: AssignRoute, started: Instant, error: ApiError) -> Response {
        self.record(route, started, error.status, None, Some(error.error_kind));
        (
            error.status,
            Json(ErrorBody {
                error: error.message,
            }),
        )
            .into_response()
    }

    /// Emits request and latency metrics.
    fn record(
        &self,
        route: AssignRoute,
        started: Instant,
        status: StatusCode,
        source: Option<AssignmentSource>,
        error_kind: Option<&'static str>,
    ) {
        let event = AssignMetricEvent {
            route,
            outcome: AssignOutcome::from_status(status),
            status: status.as_u16(),
            error_kind,
            source,
        };
        self.metrics.record_request(event.clone());
        self.metrics.record_latency(event, started.elapsed());
    }
}

/// Runs a service call on the blocking pool under the request deadline.
async fn run_service<T, F>(
    state: &Arc<ServerState>,
    route: AssignRoute,
    experiment_id: &str,
    user_id: &str,
    call: F,
) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AssignmentService, &RequestDeadline) -> Result<T, AssignError> + Send + 'static,
{
    let deadline = RequestDeadline::after(state.request_timeout);
    let worker = Arc::clone(state);
    match tokio::task::spawn_blocking(move || call(&worker.service, &deadline)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ApiError::from_assign(&err, route, experiment_id, user_id)),
        Err(err) => {
            tracing::error!(route = route.as_str(), error = %err, "request task failed");
            Err(ApiError::internal())
        }
    }
}

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// `POST /assign` request body.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct AssignRequest {
    /// Experiment identifier.
    experiment_id: String,
    /// User identifier.
    user_id: String,
}

/// Variant listing body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VariantsBody {
    /// Normalized experiment identifier.
    experiment_id: ExperimentId,
    /// Variants in creation order.
    variants: Vec<Variant>,
}

/// Health and readiness body.
#[derive(Debug, Serialize)]
struct StatusBody {
    /// Status label.
    status: &'static str,
}

/// Error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Error message.
    error: String,
}

/// Handler failure with its status and metric label.
#[derive(Debug)]
struct ApiError {
    /// Response status.
    status: StatusCode,
    /// Client-facing message.
    message: String,
    /// Metric label for the failure.
    error_kind: &'static str,
}

impl ApiError {
    /// Malformed or out-of-bounds request.
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            error_kind: ErrorKind::Validation.as_str(),
        }
    }

    /// Body above the configured limit.
    fn payload_too_large(limit: usize) -> Self {
        Self {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: format!("request body exceeds {limit} bytes"),
            error_kind: "payload_too_large",
        }
    }

    /// Missing resource.
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            error_kind: "not_found",
        }
    }

    /// Generic infrastructure failure.
    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal error".to_string(),
            error_kind: ErrorKind::Infrastructure.as_str(),
        }
    }

    /// Maps a service error; infrastructure details are logged, not returned.
    fn from_assign(err: &AssignError, route: AssignRoute, experiment_id: &str, user_id: &str) -> Self {
        let kind = err.kind();
        if kind == ErrorKind::Infrastructure {
            tracing::error!(
                route = route.as_str(),
                experiment_id = %experiment_id,
                user_id = %user_id,
                error = %err,
                "assignment request failed"
            );
            return Self::internal();
        }
        Self {
            status: status_for_kind(kind),
            message: err.to_string(),
            error_kind: kind.as_str(),
        }
    }
}

/// Maps an error kind to its HTTP status.
const fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `GET /health`.
async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(StatusBody {
            status: "ok",
        }),
    )
        .into_response()
}

/// `GET /ready`: checks the store read and writer paths.
async fn handle_ready(State(state): State<Arc<ServerState>>) -> Response {
    let started = Instant::now();
    let store = state.service.store().clone();
    let ready = match tokio::task::spawn_blocking(move || store.readiness()).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "readiness check failed");
            false
        }
        Err(err) => {
            tracing::error!(error = %err, "readiness task failed");
            false
        }
    };
    let (status, label) =
        if ready { (StatusCode::OK, "ready") } else { (StatusCode::SERVICE_UNAVAILABLE, "unavailable") };
    state.finish(
        AssignRoute::Ready,
        started,
        status,
        None,
        &StatusBody {
            status: label,
        },
    )
}

/// `POST /assign`: returns the sticky assignment, creating it if needed.
async fn handle_assign(State(state): State<Arc<ServerState>>, bytes: Bytes) -> Response {
    let route = AssignRoute::Assign;
    let started = Instant::now();
    let request = match state.parse_assign_request(&bytes) {
        Ok(request) => request,
        Err(error) => return state.fail(route, started, error),
    };
    let experiment_id = request.experiment_id.clone();
    let user_id = request.user_id.clone();
    let result = run_service(
        &state,
        route,
        &request.experiment_id,
        &request.user_id,
        move |service, deadline| service.assign(deadline, &experiment_id, &user_id),
    )
    .await;
    match result {
        Ok(decision) => state.finish(
            route,
            started,
            StatusCode::OK,
            Some(decision.source),
            &decision.assignment,
        ),
        Err(error) => state.fail(route, started, error),
    }
}

/// `GET /experiments/{experiment_id}/variants`.
async fn handle_variants(
    State(state): State<Arc<ServerState>>,
    Path(experiment_id): Path<String>,
) -> Response {
    let route = AssignRoute::Variants;
    let started = Instant::now();
    if let Err(error) = state.check_identifier("experimentId", &experiment_id) {
        return state.fail(route, started, error);
    }
    let requested = experiment_id.clone();
    let result = run_service(&state, route, &experiment_id, "", move |service, deadline| {
        service.variants(deadline, &requested)
    })
    .await;
    match result {
        Ok((experiment_id, variants)) => state.finish(
            route,
            started,
            StatusCode::OK,
            None,
            &VariantsBody {
                experiment_id,
                variants,
            },
        ),
        Err(error) => state.fail(route, started, error),
    }
}

/// `GET /experiments/{experiment_id}/assignments/{user_id}`; never creates.
async fn handle_lookup(
    State(state): State<Arc<ServerState>>,
    Path((experiment_id, user_id)): Path<(String, String)>,
) -> Response {
    let route = AssignRoute::Lookup;
    let started = Instant::now();
    if let Err(error) = state
        .check_identifier("experimentId", &experiment_id)
        .and_then(|()| state.check_identifier("userId", &user_id))
    {
        return state.fail(route, started, error);
    }
    let (requested_experiment, requested_user) = (experiment_id.clone(), user_id.clone());
    let result = run_service(&state, route, &experiment_id, &user_id, move |service, deadline| {
        service.lookup(deadline, &requested_experiment, &requested_user)
    })
    .await;
    match result {
        Ok(Some(assignment)) => state.finish(route, started, StatusCode::OK, None, &assignment),
        Ok(None) => state.fail(route, started, ApiError::not_found("assignment not found")),
        Err(error) => state.fail(route, started, error),
    }
}

/// Fallback for unknown paths.
async fn handle_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "not found".to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
