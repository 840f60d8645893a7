//! HTTP API over [`FeedService`].
//!
//! ## Endpoints
//!
//! - `GET /api/image-search?lat&lng[&start][&end]`: ranked feed page
//! - `GET /api/report-image?id&reason`: hide an image and notify operators
//! - `GET /api/get-regions`: every watched region center

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use han_collectors::{Coordinate, Image};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServerConfig;
use crate::error::{HanError, Result};
use crate::service::FeedService;

#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    lat: Option<String>,
    lng: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReportParams {
    id: Option<String>,
    reason: Option<String>,
}

/// Feed page body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ImageSearchResponse {
    pub images: Vec<Image>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

struct ApiError(StatusCode, String);

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, message.into())
    }
}

impl From<HanError> for ApiError {
    fn from(e: HanError) -> Self {
        match e {
            HanError::Validation(msg) => Self(StatusCode::BAD_REQUEST, msg),
            other => {
                tracing::error!(error = %other, "request failed");
                Self(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorResponse { error: self.1 })).into_response()
    }
}

/// Running API listener. The serve task is aborted on drop.
pub struct ApiServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

/// Router with every API route and a permissive CORS layer.
pub fn router(service: Arc<FeedService>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/image-search", get(handle_image_search))
        .route("/api/report-image", get(handle_report_image))
        .route("/api/get-regions", get(handle_get_regions))
        .layer(cors)
        .with_state(service)
}

impl ApiServer {
    /// Bind to `{config.host}:{config.port}` (port `0` picks a free port)
    /// and serve in a background task.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind.
    pub async fn start(service: Arc<FeedService>, config: &ServerConfig) -> Result<Self> {
        let app = router(service);

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| HanError::Config(format!("API server bind to {bind_addr} failed: {e}")))?;
        let addr = listener.local_addr()?;

        tracing::info!("API listening on http://{addr}/api");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("API server error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn parse_degrees(raw: Option<&str>, limit: f64) -> Option<f64> {
    raw?.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.abs() <= limit)
}

/// Window bounds: anything missing, unparseable or negative means "unset".
fn parse_bound(raw: Option<&str>) -> Option<usize> {
    raw?.trim().parse::<i64>().ok().and_then(|v| usize::try_from(v).ok())
}

async fn handle_image_search(
    State(service): State<Arc<FeedService>>,
    Query(params): Query<SearchParams>,
) -> std::result::Result<Json<ImageSearchResponse>, ApiError> {
    let lat = parse_degrees(params.lat.as_deref(), 90.0).ok_or_else(|| ApiError::bad_request("Invalid latitude"))?;
    let lng = parse_degrees(params.lng.as_deref(), 180.0).ok_or_else(|| ApiError::bad_request("Invalid longitude"))?;
    let start = parse_bound(params.start.as_deref());
    let end = parse_bound(params.end.as_deref());

    let images = service.image_search(Coordinate::new(lat, lng), start, end).await?;
    tracing::debug!(lat, lng, ?start, ?end, count = images.len(), "image search served");
    Ok(Json(ImageSearchResponse { images }))
}

async fn handle_report_image(
    State(service): State<Arc<FeedService>>,
    Query(params): Query<ReportParams>,
) -> std::result::Result<StatusCode, ApiError> {
    let id = params
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing image id"))?;
    let reason = params.reason.unwrap_or_default();
    service.report_image(&id, &reason).await?;
    Ok(StatusCode::OK)
}

async fn handle_get_regions(
    State(service): State<Arc<FeedService>>,
) -> std::result::Result<Json<Vec<Coordinate>>, ApiError> {
    Ok(Json(service.regions()?))
}
