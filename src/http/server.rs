//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, limits, timeout, request ID)
//! - Resolve includes in posted markup and translate the result into a response
//! - Serve until Ctrl+C or a shutdown broadcast
//!
//! # Routes
//! - `POST /verify`: resolve the includes in the request body
//! - `GET /health`: liveness
//! - `GET /cache/stats`: fragment cache statistics as JSON

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::error::TransclusionError;
use crate::http::request::{MakeRequestUuidV4, RequestIdExt, X_REQUEST_ID};
use crate::observability::metrics;
use crate::transclusion::Transcluder;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub transcluder: Arc<Transcluder>,
    /// Upper bound for the page's `Cache-Control` max-age.
    pub page_max_age_secs: u64,
}

/// HTTP server hosting the transclusion engine.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
    transcluder: Arc<Transcluder>,
}

impl HttpServer {
    /// Create a server with an HTTP-backed engine built from `config`.
    pub fn new(config: AppConfig) -> Result<Self, TransclusionError> {
        let transcluder = Arc::new(Transcluder::new(config.transclusion.clone())?);
        Ok(Self::with_transcluder(config, transcluder))
    }

    /// Create a server around an existing engine.
    pub fn with_transcluder(config: AppConfig, transcluder: Arc<Transcluder>) -> Self {
        let state = AppState {
            transcluder: transcluder.clone(),
            page_max_age_secs: config.server.page_max_age_secs,
        };
        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            transcluder,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &AppConfig, state: AppState) -> Router {
        let x_request_id = HeaderName::from_static(X_REQUEST_ID);
        // room above the markup ceiling so oversize bodies reach the engine and get its 413
        let body_limit = config.transclusion.max_markup_bytes.saturating_mul(2);

        Router::new()
            .route("/verify", post(verify_handler))
            .route("/health", get(health_handler))
            .route("/cache/stats", get(cache_stats_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuidV4))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(x_request_id))
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.server.request_timeout_secs,
                    ))),
            )
    }

    /// The router, for serving elsewhere or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn transcluder(&self) -> &Arc<Transcluder> {
        &self.transcluder
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener until
    /// Ctrl+C or a message on `shutdown`.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = shutdown_requested(shutdown) => {}
                }
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Resolve the includes in the posted markup.
async fn verify_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let started = Instant::now();
    let request_id = headers.request_id().unwrap_or("unknown").to_string();

    let result = match state.transcluder.resolve_includes(&body, &headers).await {
        Ok(result) => result,
        Err(e @ TransclusionError::SizeLimitExceeded { .. }) => {
            tracing::warn!(request_id = %request_id, error = %e, "Rejected markup");
            metrics::record_request("POST", StatusCode::PAYLOAD_TOO_LARGE.as_u16(), started);
            return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response();
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Transclusion failed");
            metrics::record_request("POST", StatusCode::INTERNAL_SERVER_ERROR.as_u16(), started);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Transclusion failed").into_response();
        }
    };

    let status = result.status_code_override().unwrap_or(StatusCode::OK);
    let mut response_headers = result.response_headers_to_pass().clone();

    let cache_control = result.calculate_cache_control_header_value(Some(state.page_max_age_secs));
    if let Ok(value) = HeaderValue::from_str(&cache_control) {
        response_headers.insert(header::CACHE_CONTROL, value);
    }
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    if !result.cache_vary_headers().is_empty() {
        let vary = result
            .cache_vary_headers()
            .iter()
            .map(HeaderName::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        if let Ok(value) = HeaderValue::from_str(&vary) {
            response_headers.insert(header::VARY, value);
        }
    }

    tracing::debug!(
        request_id = %request_id,
        status = status.as_u16(),
        includes = result.processed_include_count(),
        cache_control = %cache_control,
        "Markup resolved"
    );
    metrics::record_request("POST", status.as_u16(), started);
    (status, response_headers, result.into_content()).into_response()
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn cache_stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.transcluder.cache().snapshot())
}

/// Wait for Ctrl+C. Pends forever if the handler cannot be installed.
async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}

/// Wait for a shutdown broadcast. A dropped coordinator never fires.
async fn shutdown_requested(mut shutdown: broadcast::Receiver<()>) {
    match shutdown.recv().await {
        Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        _ => tracing::info!("Shutdown requested"),
    }
}
