use std::fs::File;
use std::path::Path;
use zip::result::ZipResult;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Deflate-compressed ZIP written straight to disk, one entry per artifact.
pub struct ZipBundle {
    writer: ZipWriter<File>,
    options: SimpleFileOptions,
    entries: usize,
}

impl ZipBundle {
    pub fn create(path: &Path) -> ZipResult<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: ZipWriter::new(file),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
            entries: 0,
        })
    }

    /// Copy the file at `source` into the archive under `name`.
    pub fn add_entry(&mut self, name: &str, source: &Path) -> ZipResult<()> {
        self.writer.start_file(name, self.options)?;
        let mut input = File::open(source)?;
        std::io::copy(&mut input, &mut self.writer)?;
        self.entries += 1;
        Ok(())
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Write the central directory and return the archive size in bytes.
    pub fn finalize(self) -> ZipResult<u64> {
        let file = self.writer.finish()?;
        Ok(file.metadata()?.len())
    }
}
