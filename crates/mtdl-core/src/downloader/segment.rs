//! One HTTP GET (ranged or whole) streamed into a sink.

use std::cell::Cell;
use std::str;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::NetworkConfig;
use crate::fetch_head::{header_value, parse_content_range_bounds, parse_status_line};
use crate::retry::SegmentError;
use crate::segmenter::Segment;
use crate::transport::BodySink;

/// What stopped the transfer from inside a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Sink,
    RangeIgnored(u32),
    RangeMismatch(Segment, Option<(u64, u64)>),
    Status(u32),
}

/// A 206 body belongs at `seg` only if it starts at `seg.start` and ends within it.
fn range_matches(seg: Segment, got: Option<(u64, u64)>) -> bool {
    matches!(got, Some((first, last)) if first == seg.start && last <= seg.end && first <= last)
}

/// GET `url` (with `Range` when `range` is set) and feed the body to `sink`.
///
/// The status line and `Content-Range` are checked before the first body byte
/// reaches the sink, so a server that ignores or shifts the range never writes
/// at the wrong offsets.
pub(crate) fn fetch_range(
    url: &str,
    range: Option<Segment>,
    net: &NetworkConfig,
    buffer_bytes: usize,
    abort: &AtomicBool,
    sink: &mut BodySink<'_>,
) -> Result<(), SegmentError> {
    let status: Cell<Option<u32>> = Cell::new(None);
    let content_range: Cell<Option<(u64, u64)>> = Cell::new(None);
    let stop: Cell<Option<Stop>> = Cell::new(None);

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(SegmentError::Curl)?;
    easy.follow_location(true).map_err(SegmentError::Curl)?;
    easy.connect_timeout(Duration::from_secs(net.connect_timeout_secs))
        .map_err(SegmentError::Curl)?;
    // Abort if throughput stays below the limit; the hard timeout is a last resort.
    easy.low_speed_limit(net.low_speed_limit_bytes)
        .map_err(SegmentError::Curl)?;
    easy.low_speed_time(Duration::from_secs(net.low_speed_time_secs))
        .map_err(SegmentError::Curl)?;
    easy.timeout(Duration::from_secs(net.transfer_timeout_secs))
        .map_err(SegmentError::Curl)?;
    easy.buffer_size(buffer_bytes).map_err(SegmentError::Curl)?;
    easy.progress(true).map_err(SegmentError::Curl)?;
    if let Some(seg) = range {
        easy.range(&seg.byte_range()).map_err(SegmentError::Curl)?;
    }

    let result = {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                let Ok(line) = str::from_utf8(data) else {
                    return true;
                };
                if let Some(code) = parse_status_line(line) {
                    // New response (redirect hop); forget the previous one's headers.
                    status.set(Some(code));
                    content_range.set(None);
                } else if let Some(value) = header_value(line, "content-range") {
                    content_range.set(parse_content_range_bounds(value));
                }
                true
            })
            .map_err(SegmentError::Curl)?;
        transfer
            .write_function(|data| {
                let code = status.get().unwrap_or(0);
                if !(200..300).contains(&code) {
                    stop.set(Some(Stop::Status(code)));
                    return Ok(0);
                }
                if let Some(seg) = range {
                    if code != 206 {
                        stop.set(Some(Stop::RangeIgnored(code)));
                        return Ok(0);
                    }
                    if !range_matches(seg, content_range.get()) {
                        stop.set(Some(Stop::RangeMismatch(seg, content_range.get())));
                        return Ok(0);
                    }
                }
                if abort.load(Ordering::Relaxed) || !sink(data) {
                    stop.set(Some(Stop::Sink));
                    return Ok(0);
                }
                Ok(data.len())
            })
            .map_err(SegmentError::Curl)?;
        transfer
            .progress_function(|_, _, _, _| !abort.load(Ordering::Relaxed))
            .map_err(SegmentError::Curl)?;
        transfer.perform()
    };

    if let Err(e) = result {
        return Err(match stop.get() {
            Some(Stop::Sink) => SegmentError::Interrupted,
            Some(Stop::RangeIgnored(code)) => SegmentError::RangeIgnored { status: code },
            Some(Stop::RangeMismatch(seg, got)) => mismatch(seg, got),
            Some(Stop::Status(code)) => SegmentError::Http(code),
            None if e.is_aborted_by_callback() => SegmentError::Interrupted,
            None => SegmentError::Curl(e),
        });
    }

    let code = easy.response_code().map_err(SegmentError::Curl)?;
    if !(200..300).contains(&code) {
        return Err(SegmentError::Http(code));
    }
    if let Some(seg) = range {
        if code != 206 {
            return Err(SegmentError::RangeIgnored { status: code });
        }
        if !range_matches(seg, content_range.get()) {
            return Err(mismatch(seg, content_range.get()));
        }
    }
    Ok(())
}

fn mismatch(seg: Segment, got: Option<(u64, u64)>) -> SegmentError {
    SegmentError::RangeMismatch {
        start: seg.start,
        end: seg.end,
        got,
    }
}
