use crate::AppState;
use crate::api::ApiError;
use crate::api::attachment::attachment_response;
use crate::params::{HealthResponse, read_convert_form};
use axum::body::Body;
use axum::extract::{Extension, Multipart};
use axum::http::{Response, StatusCode};
use axum::response::{IntoResponse, Json};
use tracing::{debug, info};

pub async fn health(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let config = state.pipeline.config();
    (
        StatusCode::OK,
        Json(HealthResponse {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            max_files: config.max_files,
            max_upload_mb: state.max_upload_bytes / (1024 * 1024),
            allowed_extensions: config.allowed_extensions.clone(),
            quality: config.quality,
        }),
    )
}

/// `POST /convert`: convert every uploaded JPEG/PNG to WebP and send back a
/// single image or a ZIP of all of them.
#[axum::debug_handler]
pub async fn convert_images(
    Extension(state): Extension<AppState>,
    multipart: Multipart,
) -> Result<Response<Body>, ApiError> {
    let request = read_convert_form(multipart).await?;
    let files = request.items.len();

    debug!(files, "Conversion waiting for permit");
    let _permit = state.permits.clone().acquire_owned().await?;

    let pipeline = state.pipeline.clone();
    let payload = tokio::task::spawn_blocking(move || pipeline.convert(request)).await??;

    let artifact = payload.artifact();
    info!(
        files,
        name = %artifact.name,
        media_type = %artifact.media_type,
        bytes = artifact.len,
        "Sending converted artifact"
    );

    attachment_response(payload).await
}
