//! Network seam between the engine and HTTP.
//!
//! The scheduler only needs two operations, a length probe and a streaming
//! fetch, so both sit behind [`Transport`]. [`CurlTransport`] is the libcurl
//! implementation used in production; tests substitute in-memory transports.

use std::sync::atomic::AtomicBool;

use crate::config::NetworkConfig;
use crate::fetch_head::{self, ProbeError, ProbeResult};
use crate::retry::SegmentError;
use crate::segmenter::Segment;

/// Default receive chunk size handed to libcurl.
pub const DEFAULT_BUFFER_BYTES: usize = 16 * 1024;

/// Receives body chunks in order. Returning `false` stops the transfer and
/// makes `fetch` return [`SegmentError::Interrupted`].
pub type BodySink<'a> = dyn FnMut(&[u8]) -> bool + 'a;

/// Probe and fetch operations used by the control loop and workers.
pub trait Transport: Send + Sync {
    /// Determine total length and range support for `url`.
    fn probe(&self, url: &str) -> Result<ProbeResult, ProbeError>;

    /// Stream `url` into `sink`. With `Some(range)` the request carries
    /// `Range: bytes=<start>-<end>` and anything but `206` is an error; with
    /// `None` the whole resource is requested. Implementations stop promptly
    /// once `abort` is set.
    fn fetch(
        &self,
        url: &str,
        range: Option<Segment>,
        abort: &AtomicBool,
        sink: &mut BodySink<'_>,
    ) -> Result<(), SegmentError>;
}

/// libcurl-backed transport.
#[derive(Debug, Clone)]
pub struct CurlTransport {
    network: NetworkConfig,
    buffer_bytes: usize,
}

impl CurlTransport {
    pub fn new(network: NetworkConfig, buffer_bytes: Option<usize>) -> Self {
        Self {
            network,
            buffer_bytes: buffer_bytes.unwrap_or(DEFAULT_BUFFER_BYTES),
        }
    }
}

impl Default for CurlTransport {
    fn default() -> Self {
        Self::new(NetworkConfig::default(), None)
    }
}

impl Transport for CurlTransport {
    fn probe(&self, url: &str) -> Result<ProbeResult, ProbeError> {
        fetch_head::probe(url, &self.network)
    }

    fn fetch(
        &self,
        url: &str,
        range: Option<Segment>,
        abort: &AtomicBool,
        sink: &mut BodySink<'_>,
    ) -> Result<(), SegmentError> {
        crate::downloader::fetch_range(url, range, &self.network, self.buffer_bytes, abort, sink)
    }
}
