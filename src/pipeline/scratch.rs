use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

pub(crate) const SCRATCH_PREFIX: &str = "convert-";

/// Temporary directory owned by a single conversion request.
///
/// Every artifact of the request lives inside it. The directory and its
/// contents are removed exactly once, when the value is dropped. Removal
/// failures are logged and otherwise ignored.
#[derive(Debug)]
pub struct RequestScratch {
    dir: Option<TempDir>,
}

impl RequestScratch {
    pub fn create(root: &Path) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(root)?;
        debug!(path = ?dir.path(), "Scratch directory created");
        Ok(Self { dir: Some(dir) })
    }

    pub fn path(&self) -> &Path {
        self.dir
            .as_ref()
            .map(TempDir::path)
            .unwrap_or_else(|| Path::new(""))
    }

    /// Path for a file inside the scratch directory. `name` must be generated
    /// by the caller, never taken from user input.
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }
}

impl Drop for RequestScratch {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => debug!(?path, "Scratch directory released"),
            Err(error) => warn!(?path, %error, "Failed to release scratch directory"),
        }
    }
}
