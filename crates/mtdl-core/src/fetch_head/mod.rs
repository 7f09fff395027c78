//! Length probing before admission.
//!
//! Uses the curl crate (libcurl) to learn a resource's total length and whether
//! it serves byte ranges. A `HEAD` is tried first; servers that reject `HEAD`
//! (405/501) are asked for `Range: bytes=0-0` with a `GET` instead, and the
//! total is read from `Content-Range`. The body of that fallback is never
//! downloaded: the write callback stops the transfer at the first byte.

mod parse;

pub(crate) use parse::{header_value, parse_content_range_bounds, parse_status_line};

use std::str;
use std::time::Duration;

use crate::config::NetworkConfig;
use parse::HeaderInfo;

/// Length and range support of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    /// Total size in bytes.
    pub length: u64,
    /// True if ranged GETs are served (`Accept-Ranges: bytes`, or a 206 to the fallback probe).
    pub accept_ranges: bool,
}

/// Why the length of a resource could not be determined.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe request failed: {0}")]
    Transport(#[from] curl::Error),
    #[error("server answered HTTP {0}")]
    Status(u32),
    #[error("server did not report a content length")]
    MissingLength,
}

/// Probe `url` with the timeouts from `net`. Follows redirects.
pub fn probe(url: &str, net: &NetworkConfig) -> Result<ProbeResult, ProbeError> {
    let head = request_headers(url, net, false)?;
    match head.status {
        Some(405) | Some(501) => {
            tracing::debug!(url, "HEAD rejected, probing with ranged GET");
            let ranged = request_headers(url, net, true)?;
            interpret_ranged(&ranged)
        }
        _ => interpret_head(&head),
    }
}

fn interpret_head(info: &HeaderInfo) -> Result<ProbeResult, ProbeError> {
    check_status(info)?;
    let length = info.content_length.ok_or(ProbeError::MissingLength)?;
    Ok(ProbeResult {
        length,
        accept_ranges: info.accept_ranges,
    })
}

fn interpret_ranged(info: &HeaderInfo) -> Result<ProbeResult, ProbeError> {
    check_status(info)?;
    if info.status == Some(206) {
        let length = info.range_total.ok_or(ProbeError::MissingLength)?;
        return Ok(ProbeResult {
            length,
            accept_ranges: true,
        });
    }
    // Range ignored: a plain 200 carries the whole length.
    let length = info.content_length.ok_or(ProbeError::MissingLength)?;
    Ok(ProbeResult {
        length,
        accept_ranges: false,
    })
}

fn check_status(info: &HeaderInfo) -> Result<(), ProbeError> {
    match info.status {
        Some(code) if (200..300).contains(&code) => Ok(()),
        Some(code) => Err(ProbeError::Status(code)),
        None => Err(ProbeError::MissingLength),
    }
}

/// Issue a HEAD (or a `bytes=0-0` GET when `ranged`) and collect the response headers.
fn request_headers(url: &str, net: &NetworkConfig, ranged: bool) -> Result<HeaderInfo, ProbeError> {
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.connect_timeout(Duration::from_secs(net.connect_timeout_secs))?;
    easy.timeout(Duration::from_secs(net.probe_timeout_secs))?;
    if ranged {
        easy.get(true)?;
        easy.range("0-0")?;
    } else {
        easy.nobody(true)?;
    }

    let result = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.push(s.trim_end().to_string());
            }
            true
        })?;
        // Headers are all we need; stop before any body lands.
        transfer.write_function(|_| Ok(0))?;
        transfer.perform()
    };

    match result {
        Ok(()) => {}
        Err(e) if e.is_write_error() => {}
        Err(e) => return Err(ProbeError::Transport(e)),
    }

    let mut info = parse::parse_headers(&headers);
    if info.status.is_none() {
        let code = easy.response_code()?;
        if code != 0 {
            info.status = Some(code);
        }
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(status: u32) -> HeaderInfo {
        HeaderInfo {
            status: Some(status),
            ..HeaderInfo::default()
        }
    }

    #[test]
    fn head_needs_length() {
        let mut h = info(200);
        assert!(matches!(interpret_head(&h), Err(ProbeError::MissingLength)));
        h.content_length = Some(10);
        h.accept_ranges = true;
        assert_eq!(
            interpret_head(&h).unwrap(),
            ProbeResult {
                length: 10,
                accept_ranges: true
            }
        );
    }

    #[test]
    fn head_error_status() {
        let mut h = info(404);
        h.content_length = Some(10);
        assert!(matches!(interpret_head(&h), Err(ProbeError::Status(404))));
    }

    #[test]
    fn ranged_fallback_206_uses_content_range() {
        let mut h = info(206);
        h.content_length = Some(1);
        h.range_total = Some(777);
        assert_eq!(
            interpret_ranged(&h).unwrap(),
            ProbeResult {
                length: 777,
                accept_ranges: true
            }
        );
    }

    #[test]
    fn ranged_fallback_200_means_no_ranges() {
        let mut h = info(200);
        h.content_length = Some(42);
        assert_eq!(
            interpret_ranged(&h).unwrap(),
            ProbeResult {
                length: 42,
                accept_ranges: false
            }
        );
    }
}
