//! Concurrent offset writer for temp download files.

use anyhow::{Context, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Writer for a temp download file. Safe to clone and use from multiple worker
/// threads; each `write_at` is independent (pwrite-style).
#[derive(Debug, Clone)]
pub struct StorageWriter {
    file: Arc<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl StorageWriter {
    pub(crate) fn from_parts(file: File, temp_path: PathBuf, final_path: PathBuf) -> Self {
        Self {
            file: Arc::new(file),
            temp_path,
            final_path,
        }
    }

    /// Write `data` at `offset`. Does not change the file's logical cursor; safe for concurrent use.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    /// Positional write via `seek_write`; does not share a cursor between clones.
    #[cfg(windows)]
    pub fn write_at(&self, offset: u64, mut data: &[u8]) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        let mut offset = offset;
        while !data.is_empty() {
            let n = self.file.seek_write(data, offset)?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "short write"));
            }
            data = &data[n..];
            offset += n as u64;
        }
        Ok(())
    }

    /// Path to the current temp file.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Path the temp file is renamed to on `finalize`.
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Sync file data to disk and atomically rename the temp file to the final path.
    /// Fails if the final path is on a different filesystem.
    pub fn finalize(self) -> Result<()> {
        self.file.sync_all().context("storage sync failed")?;
        drop(self.file);

        std::fs::rename(&self.temp_path, &self.final_path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                self.temp_path.display(),
                self.final_path.display()
            )
        })?;
        Ok(())
    }

    /// Remove the temp file (canceled or failed download). A missing file is not an error.
    pub fn discard(self) -> Result<()> {
        drop(self.file);
        match std::fs::remove_file(&self.temp_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("failed to remove {}", self.temp_path.display())),
        }
    }
}
