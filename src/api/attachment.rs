use axum::body::Body;
use axum::http::{Response, StatusCode, header};
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::io::ReaderStream;

use crate::api::ApiError;
use crate::pipeline::{RequestScratch, ResponsePayload};

/// File body that keeps the request scratch directory alive until the body is
/// finished or dropped, whichever happens first.
struct ArtifactStream {
    inner: ReaderStream<tokio::fs::File>,
    _scratch: RequestScratch,
}

impl Stream for ArtifactStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Stream the payload to the client as a download.
pub async fn attachment_response(payload: ResponsePayload) -> Result<Response<Body>, ApiError> {
    let (artifact, scratch) = payload.into_parts();
    let file = tokio::fs::File::open(&artifact.path)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to open {}: {e}", artifact.name)))?;

    let stream = ArtifactStream {
        inner: ReaderStream::new(file),
        _scratch: scratch,
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, artifact.media_type.as_str())
        .header(header::CONTENT_LENGTH, artifact.len)
        .header(header::CONTENT_DISPOSITION, content_disposition(&artifact.name))
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Internal(format!("failed to build response: {e}")))
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 UTF-8 name.
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if fallback == filename {
        format!("attachment; filename=\"{filename}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            encode_ext_value(filename)
        )
    }
}

fn encode_ext_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
