use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use image::ImageFormat;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::compositor::{RenderRequest, ShadingMapCompositor};
use crate::error::MockupError;
use crate::mask;
use crate::mask_source::MaskSource;

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_seconds: u64,
    requests_served: u64,
    requests_failed: u64,
    mask_service: bool,
    compositor: CompositorStatus,
}

#[derive(Serialize)]
struct CompositorStatus {
    max_dimension: u32,
    mask_threshold: u8,
    blur_radius: u32,
    final_opacity: f32,
}

pub struct AppState {
    compositor: ShadingMapCompositor,
    mask_source: Option<Arc<dyn MaskSource>>,
    start_time: Instant,
    requests_served: Mutex<u64>,
    requests_failed: Mutex<u64>,
}

impl AppState {
    pub fn new(compositor: ShadingMapCompositor, mask_source: Option<Arc<dyn MaskSource>>) -> Self {
        Self {
            compositor,
            mask_source,
            start_time: Instant::now(),
            requests_served: Mutex::new(0),
            requests_failed: Mutex::new(0),
        }
    }
}

/// Fields of a `/generate` upload. Everything is optional here; what is
/// actually required is decided by [`generate_mockup`].
#[derive(Debug, Default)]
pub struct MockupForm {
    pub original: Option<Vec<u8>>,
    pub pattern: Option<Vec<u8>>,
    /// `data:image/<type>;base64,` URL, as sent by a browser canvas.
    pub mask: Option<String>,
    /// Segmentation target for the mask service.
    pub prompt: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    Mockup(MockupError),
    Multipart(String),
    Internal(anyhow::Error),
}

impl From<MockupError> for ApiError {
    fn from(e: MockupError) -> Self {
        ApiError::Mockup(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Mockup(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Mockup(MockupError::MaskService(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Mockup(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Mockup(e) => e.to_string(),
            ApiError::Multipart(msg) => format!("Malformed upload: {}", msg),
            ApiError::Internal(e) => format!("Internal error: {}", e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message() }));
        (self.status(), body).into_response()
    }
}

pub fn router(state: Arc<AppState>, body_limit: usize) -> Router {
    Router::new()
        .route("/generate", post(generate_handler))
        .route("/status", get(status_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Serve the mockup API until `cancel` fires.
pub async fn serve_http(
    state: Arc<AppState>,
    bind: &str,
    port: u16,
    body_limit: usize,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(state, body_limit);
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind, port)).await?;
    tracing::info!("Mockup API: http://localhost:{}/generate", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}

async fn read_form(mut multipart: Multipart) -> Result<MockupForm, ApiError> {
    let bad = |e: axum::extract::multipart::MultipartError| ApiError::Multipart(e.body_text());
    let mut form = MockupForm::default();
    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "original" => form.original = Some(field.bytes().await.map_err(bad)?.to_vec()),
            "pattern" => form.pattern = Some(field.bytes().await.map_err(bad)?.to_vec()),
            "mask" => form.mask = Some(field.text().await.map_err(bad)?),
            "prompt" => form.prompt = Some(field.text().await.map_err(bad)?),
            other => tracing::debug!("Ignoring upload field '{}'", other),
        }
    }
    Ok(form)
}

/// Resolve the mask, then run the compositor on the blocking pool.
pub async fn generate_mockup(state: &AppState, form: MockupForm) -> Result<Vec<u8>, ApiError> {
    let MockupForm {
        original,
        pattern,
        mask,
        prompt,
    } = form;

    let (mask_bytes, from_service) = match (mask.filter(|m| !m.trim().is_empty()), &state.mask_source) {
        (Some(data_url), _) => (mask::decode_data_url(&data_url)?, false),
        (None, Some(source)) => {
            // Both uploads must be present before paying for a segmentation
            let photo = original.as_deref().ok_or(MockupError::MissingField("original"))?;
            if pattern.is_none() {
                return Err(MockupError::MissingField("pattern").into());
            }
            let prompt = prompt.as_deref().filter(|p| !p.trim().is_empty());
            (source.resolve(photo, prompt).await?, true)
        }
        (None, None) => {
            return Err(MockupError::MissingMask(
                "no mask uploaded and no mask service configured".to_string(),
            )
            .into())
        }
    };
    let original = original.ok_or(MockupError::MissingField("original"))?;
    let pattern = pattern.ok_or(MockupError::MissingField("pattern"))?;

    let compositor = state.compositor.clone();
    let rendered = tokio::task::spawn_blocking(move || {
        compositor.render(&RenderRequest {
            original: &original,
            pattern: &pattern,
            mask: Some(&mask_bytes),
            format: ImageFormat::Png,
        })
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("compositor task failed: {}", e)))?;

    // A generated mask that fails to decode is an upstream fault
    let rendered = rendered.map_err(|e| match e {
        MockupError::MissingMask(msg) if from_service => {
            MockupError::MaskService(format!("mask service returned an unreadable image: {}", msg))
        }
        other => other,
    })?;
    Ok(rendered)
}

async fn generate_handler(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    let started = Instant::now();
    let outcome = match read_form(multipart).await {
        Ok(form) => generate_mockup(&state, form).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(png) => {
            *state.requests_served.lock().unwrap() += 1;
            tracing::info!(
                "Generated mockup ({} bytes) in {:?}",
                png.len(),
                started.elapsed()
            );
            ([(header::CONTENT_TYPE, "image/png")], png).into_response()
        }
        Err(e) => {
            *state.requests_failed.lock().unwrap() += 1;
            if e.status() == StatusCode::BAD_REQUEST {
                tracing::warn!("Rejected mockup request: {}", e.message());
            } else {
                tracing::error!("Mockup request failed: {}", e.message());
            }
            e.into_response()
        }
    }
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let config = state.compositor.config();
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        requests_served: *state.requests_served.lock().unwrap(),
        requests_failed: *state.requests_failed.lock().unwrap(),
        mask_service: state.mask_source.is_some(),
        compositor: CompositorStatus {
            max_dimension: config.max_dimension,
            mask_threshold: config.mask.threshold,
            blur_radius: config.mask.blur_radius,
            final_opacity: config.final_opacity,
        },
    })
}
