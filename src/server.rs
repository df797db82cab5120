use axum::{
    extract::Query,
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use chrono::Utc;
use hyper::Server;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

use crate::apis::{business_connectors, rfp_connectors};
use crate::app::{BusinessPullUseCase, RfpPullUseCase};
use crate::config::Settings;
use crate::domain::{BusinessPullRequest, RfpPullRequest};
use crate::error::{DataForgeError, Result};
use crate::infra::CsvExportAdapter;
use crate::pipeline::ingestion::Ingestor;
use crate::pipeline::processing::enrich::CensusGeocoder;
use crate::pipeline::BusinessPipeline;
use crate::storage::{InMemoryPreviewStore, PreviewStore};

const DEFAULT_PAGE_SIZE: usize = 25;

/// Everything the HTTP handlers and CLI commands share.
pub struct AppState {
    pub settings: Settings,
    pub business: BusinessPullUseCase,
    pub rfp: RfpPullUseCase,
    pub preview: Arc<dyn PreviewStore>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire connectors, exporter, preview store and pipeline from settings.
    pub async fn from_settings(settings: Settings, metrics: Option<PrometheusHandle>) -> Result<Self> {
        // the blocking client must be built off the async runtime
        let geocoder = tokio::task::spawn_blocking(CensusGeocoder::new)
            .await?
            .map_err(|e| DataForgeError::Config(e.to_string()))?;
        let pipeline = BusinessPipeline::new().with_geocoder(Arc::new(geocoder));

        let exporter = Arc::new(CsvExportAdapter::new(settings.export_dir.clone()));
        let preview: Arc<dyn PreviewStore> = Arc::new(InMemoryPreviewStore::new(settings.preview_capacity));

        let business = BusinessPullUseCase::new(
            Ingestor::new(business_connectors(&settings)?),
            pipeline,
            exporter.clone(),
            preview.clone(),
        );
        let rfp = RfpPullUseCase::new(Ingestor::new(rfp_connectors(&settings)?), exporter, preview.clone());

        Ok(Self {
            settings,
            business,
            rfp,
            preview,
            metrics,
        })
    }
}

/// Error body `{"ok": false, "message": ...}`; caller mistakes are 400.
pub struct ApiError(DataForgeError);

impl From<DataForgeError> for ApiError {
    fn from(e: DataForgeError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_caller_error() {
            StatusCode::BAD_REQUEST
        } else {
            error!(error = %self.0, "Request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = Json(serde_json::json!({
            "ok": false,
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    #[serde(default = "first_page")]
    page: usize,
    #[serde(default = "default_page_size")]
    page_size: usize,
}

fn first_page() -> usize {
    1
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({
        "ok": true,
        "ts": Utc::now(),
    }))
}

async fn pull_business(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<BusinessPullRequest>,
) -> std::result::Result<Response, ApiError> {
    let criteria = request.validate(state.settings.enable_geocoder_default)?;
    let response = state.business.execute(&criteria).await?;
    Ok(Json(response).into_response())
}

async fn pull_rfps(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<RfpPullRequest>,
) -> std::result::Result<Response, ApiError> {
    let criteria = request.validate()?;
    let response = state.rfp.execute(&criteria).await?;
    Ok(Json(response).into_response())
}

async fn preview_business(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<PreviewParams>,
) -> std::result::Result<Response, ApiError> {
    let page = state.preview.business_page(params.page, params.page_size).await?;
    Ok(Json(page).into_response())
}

async fn preview_rfps(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<PreviewParams>,
) -> std::result::Result<Response, ApiError> {
    let page = state.preview.rfp_page(params.page, params.page_size).await?;
    Ok(Json(page).into_response())
}

async fn render_metrics(Extension(state): Extension<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring malformed CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(parsed))
}

/// Create the HTTP router with all routes
pub fn create_server(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.settings.cors_allow_origins);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/pull/business", post(pull_business))
        .route("/pull/rfps", post(pull_rfps))
        .route("/preview/business", get(preview_business))
        .route("/preview/rfps", get(preview_rfps))
        .route("/metrics", get(render_metrics))
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the configured port
pub async fn start_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let port = state.settings.server_port;
    let app = create_server(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "HTTP server listening");

    println!("🚀 DataForge API running on http://localhost:{port}");
    println!("💚 Health check: http://localhost:{port}/healthz");
    println!("📈 Metrics:      http://localhost:{port}/metrics");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn test_state(dir: &TempDir) -> Arc<AppState> {
        let settings = Settings {
            export_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        Arc::new(AppState::from_settings(settings, None).await.unwrap())
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let dir = TempDir::new().unwrap();
        let app = create_server(test_state(&dir).await);
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["ok"], true);
    }

    #[tokio::test]
    async fn test_invalid_state_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let app = create_server(test_state(&dir).await);
        let request = Request::builder()
            .method("POST")
            .uri("/pull/business")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"states":["ZZ"]}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["ok"], false);
        assert!(body["message"].as_str().unwrap().contains("ZZ"));
    }

    #[tokio::test]
    async fn test_preview_bounds() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;

        let ok = create_server(state.clone())
            .oneshot(Request::builder().uri("/preview/rfps").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let body = body_json(ok).await;
        assert_eq!(body["page_size"], 25);
        assert_eq!(body["total"], 0);

        let too_big = create_server(state)
            .oneshot(
                Request::builder()
                    .uri("/preview/business?page=1&page_size=500")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(too_big.status(), StatusCode::BAD_REQUEST);
    }
}
