//! Parse HTTP response header lines collected by the probe.

/// Headers that matter for admission, from the final response of a redirect chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct HeaderInfo {
    pub status: Option<u32>,
    pub content_length: Option<u64>,
    pub accept_ranges: bool,
    /// Total from `Content-Range: bytes a-b/<total>`.
    pub range_total: Option<u64>,
}

/// Status code from a line like `HTTP/1.1 206 Partial Content` or `HTTP/2 200`.
pub(crate) fn parse_status_line(line: &str) -> Option<u32> {
    let mut parts = line.split_whitespace();
    let proto = parts.next()?;
    if !proto.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

/// Total length from a `Content-Range` value (`bytes 0-0/1234`, `bytes */1234`).
/// An unknown total (`*`) gives `None`.
pub(crate) fn parse_content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// First and last byte from a `Content-Range` value (`bytes 100-199/1000`).
pub(crate) fn parse_content_range_bounds(value: &str) -> Option<(u64, u64)> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, _) = rest.split_once('/')?;
    let (first, last) = range.split_once('-')?;
    Some((first.trim().parse().ok()?, last.trim().parse().ok()?))
}

/// Value of the `name` header if `line` is one.
pub(crate) fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let (n, v) = line.split_once(':')?;
    n.trim().eq_ignore_ascii_case(name).then(|| v.trim())
}

/// Parse collected header lines. Each status line starts a new response, so
/// only the last response of a redirect chain is reported.
pub(crate) fn parse_headers(lines: &[String]) -> HeaderInfo {
    let mut info = HeaderInfo::default();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(code) = parse_status_line(line) {
            info = HeaderInfo {
                status: Some(code),
                ..HeaderInfo::default()
            };
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            info.content_length = value.parse().ok();
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            info.accept_ranges = value
                .split(',')
                .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"));
        } else if name.eq_ignore_ascii_case("content-range") {
            info.range_total = parse_content_range_total(value);
        }
    }

    info
}
