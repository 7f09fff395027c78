//! Builder for creating and preallocating temp download files.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};

use super::writer::StorageWriter;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Builder for a new temp download file. Call `preallocate` then `build` to get
/// a `StorageWriter` that supports concurrent `write_at` from worker threads.
pub struct StorageWriterBuilder {
    file: File,
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl StorageWriterBuilder {
    /// Create a new temp file at `temp_path` (e.g. `destination.part`) that will
    /// later be renamed to `final_path`. Overwrites if the temp path already exists.
    pub fn create(temp_path: &Path, final_path: &Path) -> Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp_path)
            .with_context(|| format!("failed to create temp file: {}", temp_path.display()))?;
        Ok(StorageWriterBuilder {
            file,
            temp_path: temp_path.to_path_buf(),
            final_path: final_path.to_path_buf(),
        })
    }

    /// Preallocate `size` bytes. On Unix `posix_fallocate` reserves real blocks,
    /// so a full disk fails here instead of mid-download; other errors (e.g. a
    /// filesystem without fallocate) fall back to a sparse `set_len`.
    pub fn preallocate(&mut self, size: u64) -> Result<()> {
        #[cfg(unix)]
        {
            if size > 0 {
                let fd = self.file.as_raw_fd();
                let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
                if fallocated(r, size)? {
                    return Ok(());
                }
            }
        }
        self.file
            .set_len(size)
            .with_context(|| format!("failed to preallocate {} bytes", size))?;
        Ok(())
    }

    /// Finish building and return a writer that can be shared for concurrent writes.
    pub fn build(self) -> StorageWriter {
        StorageWriter::from_parts(self.file, self.temp_path, self.final_path)
    }
}

/// Interpret a `posix_fallocate` return code: `Ok(true)` allocated, `Ok(false)`
/// fall back to `set_len`, `Err` when the disk has no room.
#[cfg(unix)]
fn fallocated(r: libc::c_int, size: u64) -> Result<bool> {
    match r {
        0 => Ok(true),
        libc::ENOSPC => Err(std::io::Error::from_raw_os_error(r))
            .with_context(|| format!("no space to preallocate {} bytes", size)),
        _ => {
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
            Ok(false)
        }
    }
}
