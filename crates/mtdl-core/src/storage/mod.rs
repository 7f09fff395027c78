//! Disk I/O and file lifecycle.
//!
//! Creates and preallocates temp files at admission (fallocate on Unix when
//! available, else set_len), supports concurrent offset writes from worker
//! threads (pwrite), and either finalizes (sync + rename from `.part` to the
//! final name) or discards the temp file when a download ends.

mod builder;
mod writer;

use anyhow::Result;
use std::path::{Path, PathBuf};

pub use builder::StorageWriterBuilder;
pub use writer::StorageWriter;

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `file.iso` → `file.iso.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Creates `<final_path>.part`, preallocates it to `size` bytes and returns a
/// shareable writer. Must run before any worker for the download starts.
pub fn prepare(final_path: &Path, size: u64) -> Result<StorageWriter> {
    let temp = temp_path(final_path);
    let mut builder = StorageWriterBuilder::create(&temp, final_path)?;
    if let Err(e) = builder.preallocate(size) {
        let _ = std::fs::remove_file(&temp);
        return Err(e);
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn temp_path_appends_part() {
        let p = temp_path(Path::new("file.iso"));
        assert_eq!(p.to_string_lossy(), "file.iso.part");
        let p2 = temp_path(Path::new("/tmp/archive.zip"));
        assert_eq!(p2.to_string_lossy(), "/tmp/archive.zip.part");
    }

    #[test]
    fn prepare_write_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("output.bin");
        let tp = temp_path(&final_path);

        let writer = prepare(&final_path, 100).unwrap();
        assert_eq!(std::fs::metadata(&tp).unwrap().len(), 100);

        writer.write_at(0, b"hello").unwrap();
        writer.write_at(50, b"world").unwrap();
        writer.write_at(95, b"xy").unwrap();
        writer.finalize().unwrap();

        assert!(!tp.exists());
        assert!(final_path.exists());
        let mut f = std::fs::File::open(&final_path).unwrap();
        let mut buf = vec![0u8; 100];
        f.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[0..5], b"hello");
        assert_eq!(&buf[50..55], b"world");
        assert_eq!(&buf[95..97], b"xy");
    }

    #[test]
    fn write_at_from_clones() {
        let dir = tempfile::tempdir().unwrap();
        let final_p = dir.path().join("out.bin");
        let writer = prepare(&final_p, 20).unwrap();
        let w2 = writer.clone();
        let handle = std::thread::spawn(move || w2.write_at(10, b"bbbb").unwrap());
        writer.write_at(0, b"aaaa").unwrap();
        writer.write_at(4, b"cccc").unwrap();
        handle.join().unwrap();
        writer.finalize().unwrap();
        let buf = std::fs::read(&final_p).unwrap();
        assert_eq!(buf.len(), 20);
        assert_eq!(&buf[0..4], b"aaaa");
        assert_eq!(&buf[4..8], b"cccc");
        assert_eq!(&buf[10..14], b"bbbb");
    }

    #[test]
    fn prepare_zero_length() {
        let dir = tempfile::tempdir().unwrap();
        let final_p = dir.path().join("empty.bin");
        let writer = prepare(&final_p, 0).unwrap();
        writer.finalize().unwrap();
        assert_eq!(std::fs::metadata(&final_p).unwrap().len(), 0);
    }

    #[test]
    fn discard_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let final_p = dir.path().join("gone.bin");
        let writer = prepare(&final_p, 10).unwrap();
        let tp = writer.temp_path().to_path_buf();
        assert!(tp.exists());
        writer.discard().unwrap();
        assert!(!tp.exists());
        assert!(!final_p.exists());
    }

    #[test]
    fn prepare_fails_in_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let final_p = dir.path().join("no-such-dir").join("x.bin");
        assert!(prepare(&final_p, 10).is_err());
    }
}
