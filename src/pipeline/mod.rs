//! Upload-to-output conversion: validation, per-file WebP encoding,
//! packaging and scratch storage cleanup for one request.

pub mod archive;
pub mod codec;
pub mod sanitize;
pub mod scratch;

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

pub use archive::ZipBundle;
pub use codec::{CodecError, ImageCodec, ResizeSpec, WebpCodec};
pub use sanitize::{DEFAULT_BASE_NAME, is_allowed_file, sanitize_base_name};
pub use scratch::RequestScratch;

const ZIP_SCRATCH_NAME: &str = "bundle.zip";

/// Limits and encoder settings, fixed for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub max_files: usize,
    /// Lowercase, without the leading dot
    pub allowed_extensions: Vec<String>,
    pub quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_files: 25,
            allowed_extensions: vec!["jpg".into(), "jpeg".into(), "png".into()],
            quality: 90,
        }
    }
}

#[derive(Clone, Debug)]
pub struct UploadItem {
    /// As sent by the client, may be empty
    pub filename: String,
    pub bytes: Bytes,
    /// 1-based submission position
    pub position: usize,
}

#[derive(Clone, Debug, Default)]
pub struct ConversionRequest {
    pub items: Vec<UploadItem>,
    pub base_name: String,
    pub index_override: Option<u32>,
    pub resize: ResizeSpec,
}

impl ConversionRequest {
    pub fn new(base_name: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            ..Default::default()
        }
    }

    /// Append an upload, numbering it after the ones already present.
    pub fn push(&mut self, filename: impl Into<String>, bytes: impl Into<Bytes>) {
        let position = self.items.len() + 1;
        self.items.push(UploadItem {
            filename: filename.into(),
            bytes: bytes.into(),
            position,
        });
    }

    pub fn with_index_override(mut self, index: Option<u32>) -> Self {
        self.index_override = index;
        self
    }

    pub fn with_resize(mut self, resize: ResizeSpec) -> Self {
        self.resize = resize;
        self
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no file provided")]
    NoFileProvided,

    #[error("too many files: {count} exceeds the maximum of {max}")]
    TooManyFiles { count: usize, max: usize },

    #[error("none of the uploaded files could be converted")]
    NoValidFiles,

    #[error("failed to convert {filename}: {source}")]
    Codec {
        filename: String,
        #[source]
        source: CodecError,
    },

    #[error("scratch storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl PipelineError {
    /// Stable key reported to clients for request validation failures.
    pub fn message_key(&self) -> Option<&'static str> {
        match self {
            PipelineError::NoFileProvided => Some("no_file"),
            PipelineError::TooManyFiles { .. } => Some("too_many_files"),
            PipelineError::NoValidFiles => Some("no_valid_files"),
            _ => None,
        }
    }

    /// Short description without paths or OS details.
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::Codec { filename, .. } => format!("failed to convert {filename}"),
            PipelineError::Io(_) => "temporary storage failure".to_string(),
            PipelineError::Archive(_) => "failed to build archive".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    EmptyFilename,
    DisallowedExtension,
}

#[derive(Debug)]
pub enum ItemOutcome {
    Converted(ConvertedImage),
    Skipped(SkipReason),
    Failed(PipelineError),
}

/// One encoded upload inside the scratch directory, not yet named.
#[derive(Debug)]
pub struct ConvertedImage {
    position: usize,
    path: PathBuf,
    len: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertedArtifact {
    pub name: String,
    pub media_type: String,
    pub path: PathBuf,
    pub len: u64,
}

impl ConvertedArtifact {
    fn new(name: String, path: PathBuf, len: u64) -> Self {
        let media_type = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .to_string();
        Self {
            name,
            media_type,
            path,
            len,
        }
    }
}

/// The artifact to send, together with the storage backing it.
///
/// Dropping the payload releases every file written for the request.
#[derive(Debug)]
pub struct ResponsePayload {
    artifact: ConvertedArtifact,
    scratch: RequestScratch,
}

impl ResponsePayload {
    pub fn artifact(&self) -> &ConvertedArtifact {
        &self.artifact
    }

    pub fn is_archive(&self) -> bool {
        self.artifact.media_type == "application/zip"
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    pub fn into_parts(self) -> (ConvertedArtifact, RequestScratch) {
        (self.artifact, self.scratch)
    }
}

#[derive(Clone)]
pub struct ConvertPipeline {
    config: PipelineConfig,
    codec: Arc<dyn ImageCodec>,
    scratch_root: PathBuf,
}

impl ConvertPipeline {
    pub fn new(config: PipelineConfig, scratch_root: impl Into<PathBuf>) -> Self {
        let codec = Arc::new(WebpCodec::new(config.quality));
        Self::with_codec(config, scratch_root, codec)
    }

    pub fn with_codec(
        config: PipelineConfig,
        scratch_root: impl Into<PathBuf>,
        codec: Arc<dyn ImageCodec>,
    ) -> Self {
        Self {
            config,
            codec,
            scratch_root: scratch_root.into(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn convert(&self, request: ConversionRequest) -> Result<ResponsePayload, PipelineError> {
        self.validate(&request)?;

        let base_name = sanitize_base_name(&request.base_name);
        info!(%base_name, files = request.items.len(), "Converting batch");

        let accepted = request
            .items
            .iter()
            .filter(|item| match self.skip_reason(item) {
                Some(reason) => {
                    debug!(filename = %item.filename, position = item.position, ?reason, "Skipping upload");
                    false
                }
                None => true,
            })
            .collect::<Vec<_>>();

        if accepted.is_empty() {
            return Err(PipelineError::NoValidFiles);
        }

        // Dropped on every early return below, taking all written files with it
        let scratch = RequestScratch::create(&self.scratch_root)?;

        let mut converted = Vec::with_capacity(accepted.len());
        for item in accepted {
            match self.process_item(item, &request.resize, &scratch) {
                ItemOutcome::Converted(image) => converted.push(image),
                ItemOutcome::Skipped(reason) => {
                    debug!(filename = %item.filename, position = item.position, ?reason, "Skipping upload");
                }
                ItemOutcome::Failed(error) => {
                    error!(filename = %item.filename, position = item.position, %error, "Conversion failed");
                    return Err(error);
                }
            }
        }

        if converted.is_empty() {
            return Err(PipelineError::NoValidFiles);
        }

        // An explicit index only names a lone survivor
        let index_override = request.index_override.filter(|_| converted.len() == 1);
        let mut artifacts = converted
            .into_iter()
            .map(|image| {
                let index = index_override.map_or(image.position, |index| index as usize);
                ConvertedArtifact::new(format!("{base_name}_{index}.webp"), image.path, image.len)
            })
            .collect::<Vec<_>>();

        let artifact = if artifacts.len() == 1 {
            artifacts.remove(0)
        } else {
            self.bundle(&base_name, &artifacts, &scratch)?
        };

        info!(name = %artifact.name, bytes = artifact.len, "Batch converted");
        Ok(ResponsePayload { artifact, scratch })
    }

    fn validate(&self, request: &ConversionRequest) -> Result<(), PipelineError> {
        let count = request.items.len();
        if count == 0 {
            return Err(PipelineError::NoFileProvided);
        }
        if count > self.config.max_files {
            return Err(PipelineError::TooManyFiles {
                count,
                max: self.config.max_files,
            });
        }
        Ok(())
    }

    /// Why an upload is not converted at all, checked before any storage is used.
    pub fn skip_reason(&self, item: &UploadItem) -> Option<SkipReason> {
        if item.filename.is_empty() {
            Some(SkipReason::EmptyFilename)
        } else if !is_allowed_file(&item.filename, &self.config.allowed_extensions) {
            Some(SkipReason::DisallowedExtension)
        } else {
            None
        }
    }

    pub fn process_item(
        &self,
        item: &UploadItem,
        resize: &ResizeSpec,
        scratch: &RequestScratch,
    ) -> ItemOutcome {
        if let Some(reason) = self.skip_reason(item) {
            return ItemOutcome::Skipped(reason);
        }

        let encoded = match self.codec.to_webp(&item.bytes, resize) {
            Ok(encoded) => encoded,
            Err(source) => {
                return ItemOutcome::Failed(PipelineError::Codec {
                    filename: item.filename.clone(),
                    source,
                });
            }
        };

        let path = scratch.file_path(&format!("{}.webp", item.position));
        if let Err(error) = std::fs::write(&path, &encoded) {
            return ItemOutcome::Failed(error.into());
        }

        debug!(filename = %item.filename, position = item.position, bytes = encoded.len(), "Upload converted");
        ItemOutcome::Converted(ConvertedImage {
            position: item.position,
            path,
            len: encoded.len() as u64,
        })
    }

    fn bundle(
        &self,
        base_name: &str,
        artifacts: &[ConvertedArtifact],
        scratch: &RequestScratch,
    ) -> Result<ConvertedArtifact, PipelineError> {
        let zip_path = scratch.file_path(ZIP_SCRATCH_NAME);
        let mut bundle = ZipBundle::create(&zip_path)?;
        for artifact in artifacts {
            bundle.add_entry(&artifact.name, &artifact.path)?;
        }
        let entries = bundle.entries();
        let len = bundle.finalize()?;

        debug!(entries, bytes = len, "Archive written");
        Ok(ConvertedArtifact::new(
            format!("{base_name}_webp.zip"),
            zip_path,
            len,
        ))
    }
}
