//! Which failures are worth another attempt.

use super::error::SegmentError;

/// Retry class of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transience {
    /// Timeouts, resets, early close, 5xx.
    Transient,
    /// 429 and 503: retried with a longer pause.
    Throttled,
    Fatal,
}

fn http_status(code: u32) -> Transience {
    match code {
        429 | 503 => Transience::Throttled,
        500..=599 => Transience::Transient,
        _ => Transience::Fatal,
    }
}

fn curl_error(e: &curl::Error) -> Transience {
    let network = e.is_operation_timedout()
        || e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file();
    if network {
        Transience::Transient
    } else {
        Transience::Fatal
    }
}

impl SegmentError {
    pub fn transience(&self) -> Transience {
        match self {
            SegmentError::Curl(e) => curl_error(e),
            SegmentError::Http(code) => http_status(*code),
            SegmentError::PartialTransfer { .. } => Transience::Transient,
            SegmentError::RangeIgnored { .. }
            | SegmentError::RangeMismatch { .. }
            | SegmentError::Storage(_)
            | SegmentError::Interrupted => Transience::Fatal,
        }
    }
}
