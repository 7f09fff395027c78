/// Why one range fetch attempt did not deliver its bytes.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    #[error("{0}")]
    Curl(#[source] curl::Error),
    /// Non-2xx answer.
    #[error("HTTP {0}")]
    Http(u32),
    /// A ranged request got a 2xx other than 206; the body is not our range.
    #[error("server ignored Range request (HTTP {status})")]
    RangeIgnored { status: u32 },
    /// A 206 whose `Content-Range` does not start at the requested byte or
    /// runs past the requested end.
    #[error("requested bytes {start}-{end}, server sent {}", describe_range(.got))]
    RangeMismatch {
        start: u64,
        end: u64,
        got: Option<(u64, u64)>,
    },
    /// The response ended before the range did.
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    #[error("storage: {0}")]
    Storage(#[source] std::io::Error),
    /// The body sink or the abort flag stopped the transfer.
    #[error("transfer interrupted")]
    Interrupted,
}

fn describe_range(got: &Option<(u64, u64)>) -> String {
    match got {
        Some((first, last)) => format!("bytes {}-{}", first, last),
        None => "no Content-Range".to_string(),
    }
}
