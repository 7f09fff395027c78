//! Public record types of the engine and the internal task item.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::downloader::FetchMode;
use crate::segmenter::Segment;

/// Observable state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Queued,
    /// Admitted; percent of the total length written so far (0..=100).
    Active { progress_percent: u8 },
    Finished,
    Failed,
    Canceled,
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadStatus::Queued => write!(f, "queued"),
            DownloadStatus::Active { progress_percent } => write!(f, "active({}%)", progress_percent),
            DownloadStatus::Finished => write!(f, "finished"),
            DownloadStatus::Failed => write!(f, "failed"),
            DownloadStatus::Canceled => write!(f, "canceled"),
        }
    }
}

/// Final state recorded in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Finished,
    Failed,
    Canceled,
}

impl From<TerminalStatus> for DownloadStatus {
    fn from(s: TerminalStatus) -> Self {
        match s {
            TerminalStatus::Finished => DownloadStatus::Finished,
            TerminalStatus::Failed => DownloadStatus::Failed,
            TerminalStatus::Canceled => DownloadStatus::Canceled,
        }
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        DownloadStatus::from(*self).fmt(f)
    }
}

/// Archive entry for a resource that reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
    pub url: String,
    pub status: TerminalStatus,
    /// Why the download failed; `None` for finished and canceled downloads.
    pub reason: Option<String>,
    /// Where the file was saved; only set for finished downloads.
    pub path: Option<PathBuf>,
}

/// Result of [`Engine::cancel`](super::Engine::cancel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The resource was queued or active and is now canceled.
    Accepted,
    /// The URL was never submitted.
    NotFound,
    /// The resource is already finalizing or terminal; its outcome stands.
    TooLate,
}

/// Counts of the engine's collections at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineSnapshot {
    /// Entries in the submission queue, including ones being probed.
    pub queued: usize,
    /// Queue entries currently being probed (each holds an admission slot).
    pub probing: usize,
    /// Downloads in the in-flight set.
    pub active: usize,
    /// Tasks waiting for a worker slot.
    pub tasks: usize,
    /// Workers not yet reaped.
    pub workers: usize,
    /// Archive length.
    pub completed: usize,
}

/// One unit of work on the task queue.
#[derive(Debug, Clone)]
pub(crate) struct Task {
    pub url: Arc<str>,
    pub segment: Segment,
    pub mode: FetchMode,
}
