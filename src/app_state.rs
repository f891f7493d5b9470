use crate::Config;
use crate::pipeline::ConvertPipeline;
use crate::pipeline::scratch::SCRATCH_PREFIX;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

const TEMP_DIR: &str = "temp";

async fn init_workspace(workspace: &Path) -> std::io::Result<PathBuf> {
    let temp_dir = workspace.join(TEMP_DIR);
    tokio::fs::create_dir_all(&temp_dir).await?;
    Ok(temp_dir)
}

/// Remove scratch directories left behind by a previous process that did not
/// shut down cleanly. Only directories carrying the scratch prefix are touched.
async fn sweep_stale_scratch(temp_dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(temp_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let is_scratch = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(SCRATCH_PREFIX));
        if !is_scratch || !entry.file_type().await?.is_dir() {
            continue;
        }

        let path = entry.path();
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => removed += 1,
            Err(error) => warn!(?path, %error, "Failed to remove stale scratch directory"),
        }
    }
    Ok(removed)
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ConvertPipeline>,
    pub permits: Arc<Semaphore>,
    pub max_upload_bytes: usize,

    pub temp_dir: PathBuf,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let temp_dir = init_workspace(Path::new(&config.workspace)).await?;
        let removed = sweep_stale_scratch(&temp_dir).await?;
        if removed > 0 {
            info!(removed, ?temp_dir, "Removed stale scratch entries");
        }

        let pipeline = ConvertPipeline::new(config.pipeline_config(), temp_dir.clone());
        info!(
            permits = config.permits,
            max_files = config.max_files,
            max_upload_mb = config.max_upload_mb,
            quality = config.quality,
            "Conversion pipeline ready"
        );

        Ok(Self {
            pipeline: Arc::new(pipeline),
            permits: Arc::new(Semaphore::new(config.permits)),
            max_upload_bytes: config.max_upload_bytes(),
            temp_dir,
        })
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.as_path()
    }
}
