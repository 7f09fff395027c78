//! URL validation and local filename derivation.

mod path;
mod sanitize;

pub use path::last_path_segment;
pub use sanitize::sanitize_filename;

use url::Url;

/// Name used when the URL path gives nothing usable.
pub const DEFAULT_FILENAME: &str = "download.bin";

#[derive(Debug, thiserror::Error)]
pub enum UrlError {
    #[error("invalid URL: {0}")]
    Parse(#[from] url::ParseError),
    #[error("unsupported scheme {0:?} (only http and https)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
}

/// Parse `raw` and check that it is something the range fetcher can talk to.
pub fn validate_url(raw: &str) -> Result<Url, UrlError> {
    let url = Url::parse(raw.trim())?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::UnsupportedScheme(other.to_string())),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }
    Ok(url)
}

/// Local filename for `url`: its sanitized last path segment, or
/// [`DEFAULT_FILENAME`].
///
/// - `https://example.com/pub/debian-12.iso` → `debian-12.iso`
/// - `https://example.com/` → `download.bin`
pub fn derive_filename(url: &str) -> String {
    last_path_segment(url)
        .map(|raw| sanitize_filename(&raw))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(validate_url("http://example.com/a.bin").is_ok());
        let url = validate_url("  https://example.com:8443/x?y=1 ").unwrap();
        assert_eq!(url.port(), Some(8443));
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(matches!(
            validate_url("ftp://example.com/a"),
            Err(UrlError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(
            validate_url("file:///etc/passwd"),
            Err(UrlError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(validate_url("not a url"), Err(UrlError::Parse(_))));
        assert!(validate_url("").is_err());
    }

    #[test]
    fn filename_from_path() {
        assert_eq!(
            derive_filename("https://cdn.example.com/pub/debian-12.iso"),
            "debian-12.iso"
        );
        assert_eq!(
            derive_filename("https://example.com/file.zip?token=abc#frag"),
            "file.zip"
        );
    }

    #[test]
    fn filename_falls_back_to_default() {
        assert_eq!(derive_filename("https://example.com/"), DEFAULT_FILENAME);
        assert_eq!(derive_filename("https://example.com"), DEFAULT_FILENAME);
        assert_eq!(derive_filename("https://example.com/.."), DEFAULT_FILENAME);
        assert_eq!(derive_filename("::::"), DEFAULT_FILENAME);
    }

    #[test]
    fn filename_is_sanitized() {
        assert_eq!(
            derive_filename("https://example.com/dir/my%20file.tar.gz"),
            "my file.tar.gz"
        );
        assert_eq!(derive_filename("https://example.com/a/..hidden"), "hidden");
    }
}
