use axum::extract::Multipart;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::pipeline::{ConversionRequest, ResizeSpec};

pub const FILES_FIELD: &str = "files";

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub name: String,
    pub version: String,
    pub max_files: usize,
    pub max_upload_mb: usize,
    pub allowed_extensions: Vec<String>,
    pub quality: u8,
}

/// Read the `/convert` multipart form into a typed request.
///
/// Fields: `files` (repeated), `base_name`, `file_index`, `max_width`,
/// `max_height`, `maintain_aspect_ratio`. Anything else is ignored.
pub async fn read_convert_form(mut multipart: Multipart) -> Result<ConversionRequest, ApiError> {
    let mut request = ConversionRequest::default();
    let mut resize = ResizeSpec::default();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        match name.as_str() {
            FILES_FIELD => {
                let filename = field.file_name().unwrap_or_default().to_owned();
                let bytes = field.bytes().await?;
                debug!(%filename, bytes = bytes.len(), "Received upload");
                request.push(filename, bytes);
            }
            "base_name" => request.base_name = field.text().await?,
            "file_index" => {
                let raw = field.text().await?;
                request.index_override = parse_file_index(&raw);
                if request.index_override.is_none() && !raw.trim().is_empty() {
                    warn!(file_index = %raw, "Ignoring non-numeric file_index");
                }
            }
            "max_width" => resize.max_width = parse_dimension(&field.text().await?),
            "max_height" => resize.max_height = parse_dimension(&field.text().await?),
            "maintain_aspect_ratio" => resize.keep_aspect_ratio = parse_flag(&field.text().await?),
            other => debug!(field = other, "Ignoring unknown form field"),
        }
    }

    Ok(request.with_resize(resize))
}

/// `file_index` as a 1-based index. Fractions are truncated, values below 1
/// become 1, anything non-numeric is treated as absent.
pub fn parse_file_index(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let value = raw.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(value.trunc().clamp(1.0, u32::MAX as f64) as u32)
}

/// A resize bound; zero, negative or non-numeric values mean "unbounded".
pub fn parse_dimension(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|&v| v > 0)
}

pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "on" | "yes"
    )
}
