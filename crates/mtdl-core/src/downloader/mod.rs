//! Range-fetch worker body.
//!
//! A worker owns one task: it fetches the task's byte range, writes each chunk
//! at its absolute offset in the pre-allocated temp file, and bumps a shared
//! counter the completion tracker reads. Transient failures are retried with
//! backoff for the bytes not yet written only. Cancellation is cooperative:
//! the abort flag is checked in the transport callbacks and while backing off.

mod segment;

pub(crate) use segment::fetch_range;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::retry::{run_with_retry, RetryPolicy, SegmentError};
use crate::segmenter::Segment;
use crate::storage::StorageWriter;
use crate::transport::Transport;

/// How a task's bytes are requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// `Range: bytes=<start>-<end>`, expects 206.
    Ranged,
    /// Plain GET for the whole resource (server does not serve ranges).
    Whole,
}

/// Terminal result of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Completed,
    Failed(String),
    Canceled,
}

/// Everything a worker needs for one task.
pub struct RangeJob<'a> {
    pub url: &'a str,
    pub segment: Segment,
    pub mode: FetchMode,
    pub storage: &'a StorageWriter,
    /// Bytes of `segment` written so far; read concurrently for progress.
    pub transferred: &'a AtomicU64,
    pub abort: &'a AtomicBool,
}

/// Runs one task to completion, failure, or cancellation.
pub fn run_worker(transport: &dyn Transport, policy: &RetryPolicy, job: &RangeJob<'_>) -> WorkerOutcome {
    tracing::debug!(
        url = job.url,
        start = job.segment.start,
        end = job.segment.end,
        "worker started"
    );

    let result = run_with_retry(policy, job.abort, |attempt| {
        if job.abort.load(Ordering::Relaxed) {
            return Err(SegmentError::Interrupted);
        }
        if attempt > 1 {
            tracing::debug!(url = job.url, start = job.segment.start, attempt, "resuming range");
        }
        fetch_once(transport, job)
    });

    match result {
        Ok(()) => {
            tracing::debug!(url = job.url, start = job.segment.start, "worker completed");
            WorkerOutcome::Completed
        }
        Err(_) if job.abort.load(Ordering::Relaxed) => WorkerOutcome::Canceled,
        Err(e) => {
            tracing::warn!(
                url = job.url,
                start = job.segment.start,
                end = job.segment.end,
                "worker failed: {}",
                e
            );
            WorkerOutcome::Failed(format!(
                "bytes {}-{}: {}",
                job.segment.start, job.segment.end, e
            ))
        }
    }
}

/// One attempt. Ranged tasks request only what is still missing; a `Whole`
/// task cannot resume, so it starts over from the first byte.
fn fetch_once(transport: &dyn Transport, job: &RangeJob<'_>) -> Result<(), SegmentError> {
    let request = match job.mode {
        FetchMode::Ranged => {
            let done = job.transferred.load(Ordering::Relaxed);
            match job.segment.remainder(done) {
                Some(rest) => rest,
                None => return Ok(()),
            }
        }
        FetchMode::Whole => {
            job.transferred.store(0, Ordering::Relaxed);
            job.segment
        }
    };

    let mut offset = request.start;
    let mut write_error: Option<std::io::Error> = None;
    let range = match job.mode {
        FetchMode::Ranged => Some(request),
        FetchMode::Whole => None,
    };

    let result = transport.fetch(job.url, range, job.abort, &mut |chunk: &[u8]| {
        // Never write past the end of the task, whatever the server sends.
        let room = (request.end + 1).saturating_sub(offset);
        let take = (chunk.len() as u64).min(room) as usize;
        if take > 0 {
            if let Err(e) = job.storage.write_at(offset, &chunk[..take]) {
                write_error = Some(e);
                return false;
            }
            offset += take as u64;
            job.transferred.fetch_add(take as u64, Ordering::Relaxed);
        }
        take == chunk.len()
    });

    if let Some(e) = write_error {
        return Err(SegmentError::Storage(e));
    }
    let received = offset - request.start;
    if received == request.len() {
        return Ok(());
    }
    result?;
    Err(SegmentError::PartialTransfer {
        expected: request.len(),
        received,
    })
}
