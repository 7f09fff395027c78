//! Download directory resolution.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::MtdlConfig;
use crate::storage::TEMP_SUFFIX;

/// Directory downloads are written into, created if absent.
///
/// Order: configured `download.download_path`, `$XDG_DOWNLOAD_DIR`,
/// `$HOME/Downloads`, then the current directory.
pub fn download_directory(cfg: &MtdlConfig) -> Result<PathBuf> {
    let dir = resolve(
        cfg.download.download_path.as_deref(),
        std::env::var_os("XDG_DOWNLOAD_DIR"),
        std::env::var_os("HOME"),
    )?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("cannot create download directory {}", dir.display()))?;
    Ok(dir)
}

fn resolve(
    configured: Option<&Path>,
    xdg_download: Option<OsString>,
    home: Option<OsString>,
) -> Result<PathBuf> {
    if let Some(p) = configured.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(p.to_path_buf());
    }
    if let Some(p) = xdg_download.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(p));
    }
    if let Some(home) = home.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(home).join("Downloads"));
    }
    std::env::current_dir().context("no download directory and no current directory")
}

/// Final and temp paths for a file named `name` inside `dir`.
pub fn destination(dir: &Path, name: &str) -> (PathBuf, PathBuf) {
    let final_path = dir.join(name);
    let temp_path = dir.join(format!("{}{}", name, TEMP_SUFFIX));
    (final_path, temp_path)
}

/// First final path for `name` in `dir` that is neither on disk (final or
/// temp) nor in `taken`. Collisions get a `-N` suffix before the extension.
pub fn unique_destination(dir: &Path, name: &str, taken: &[PathBuf]) -> PathBuf {
    let base = Path::new(name);
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let ext = base.extension().map(|e| e.to_string_lossy().into_owned());

    let mut n = 0u32;
    loop {
        let candidate = match (n, &ext) {
            (0, _) => name.to_string(),
            (_, Some(ext)) => format!("{}-{}.{}", stem, n, ext),
            (_, None) => format!("{}-{}", stem, n),
        };
        let (final_path, temp_path) = destination(dir, &candidate);
        if !taken.contains(&final_path) && !final_path.exists() && !temp_path.exists() {
            return final_path;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_path_wins() {
        let got = resolve(
            Some(Path::new("/data/dl")),
            Some("/xdg".into()),
            Some("/home/u".into()),
        )
        .unwrap();
        assert_eq!(got, PathBuf::from("/data/dl"));
    }

    #[test]
    fn xdg_then_home() {
        let got = resolve(None, Some("/xdg/dl".into()), Some("/home/u".into())).unwrap();
        assert_eq!(got, PathBuf::from("/xdg/dl"));
        let got = resolve(None, Some("".into()), Some("/home/u".into())).unwrap();
        assert_eq!(got, PathBuf::from("/home/u/Downloads"));
    }

    #[test]
    fn falls_back_to_current_dir() {
        let got = resolve(None, None, None).unwrap();
        assert_eq!(got, std::env::current_dir().unwrap());
    }

    #[test]
    fn creates_configured_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = MtdlConfig::default();
        cfg.download.download_path = Some(tmp.path().join("nested").join("dl"));
        let dir = download_directory(&cfg).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn unique_destination_skips_existing_and_taken() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        assert_eq!(unique_destination(dir, "a.iso", &[]), dir.join("a.iso"));

        std::fs::write(dir.join("a.iso"), b"x").unwrap();
        std::fs::write(dir.join("a-1.iso.part"), b"").unwrap();
        let taken = vec![dir.join("a-2.iso")];
        assert_eq!(unique_destination(dir, "a.iso", &taken), dir.join("a-3.iso"));

        std::fs::write(dir.join("README"), b"").unwrap();
        assert_eq!(unique_destination(dir, "README", &[]), dir.join("README-1"));
    }

    #[test]
    fn destination_uses_part_suffix() {
        let (final_path, temp_path) = destination(Path::new("/d"), "a.iso");
        assert_eq!(final_path, PathBuf::from("/d/a.iso"));
        assert_eq!(temp_path, PathBuf::from("/d/a.iso.part"));
    }
}
