//! Download admission engine.
//!
//! [`Engine`] owns the shared state and the control-loop thread. Callers
//! submit URLs; the loop probes them, partitions admitted downloads into
//! byte-range tasks, runs the tasks on worker threads, and archives each
//! download exactly once as finished, failed or canceled. Two limits apply:
//! `max_downloads` admitted (or probing) downloads and `max_threads` workers.

mod admit;
mod control_loop;
mod dispatch;
mod error;
mod model;
mod progress;
mod reap;
mod state;

pub use error::{CapacityExceeded, SubmitError};
pub use model::{CancelOutcome, CompletionRecord, DownloadStatus, EngineSnapshot, TerminalStatus};
pub use progress::ProgressStats;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::{MtdlConfig, DEFAULT_MAX_DOWNLOADS, DEFAULT_SPLIT_NUM};
use crate::retry::RetryPolicy;
use crate::transport::{CurlTransport, Transport};
use crate::{paths, url_model};
use control_loop::LoopContext;
use state::SharedState;

/// Limits and policies the engine runs with.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_downloads: usize,
    pub max_threads: usize,
    pub split_num: usize,
    /// Directory finished files are written to.
    pub download_dir: PathBuf,
    /// Backoff for worker retries and between failed probes.
    pub retry: RetryPolicy,
    /// Failed probes before a queued download is marked failed.
    pub max_probe_attempts: u32,
}

impl EngineConfig {
    /// Built-in defaults writing into `download_dir`.
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            max_downloads: DEFAULT_MAX_DOWNLOADS,
            max_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            split_num: DEFAULT_SPLIT_NUM,
            download_dir: download_dir.into(),
            retry: RetryPolicy::default(),
            max_probe_attempts: 3,
        }
    }

    /// Limits from the config file; resolves (and creates) the download directory.
    pub fn from_config(cfg: &MtdlConfig) -> Result<Self> {
        cfg.validate()?;
        let retry = cfg.retry_or_default();
        Ok(Self {
            max_downloads: cfg.download.max_downloads,
            max_threads: cfg.download.max_threads,
            split_num: cfg.download.split_num,
            download_dir: paths::download_directory(cfg)?,
            retry: RetryPolicy::from(&retry),
            max_probe_attempts: retry.max_probe_attempts.max(1),
        })
    }
}

/// Handle to a running engine. Dropping it shuts the engine down.
pub struct Engine {
    state: Arc<SharedState>,
    control: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Start the control loop with the given transport.
    pub fn start(config: EngineConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let state = Arc::new(SharedState::new(config.max_downloads, config.max_threads));
        let ctx = LoopContext {
            state: Arc::clone(&state),
            transport,
            config,
        };
        let control = thread::Builder::new()
            .name("mtdl-control".to_string())
            .spawn(move || control_loop::run(ctx))
            .context("failed to spawn control loop")?;
        Ok(Self {
            state,
            control: Mutex::new(Some(control)),
        })
    }

    /// Start an engine over libcurl configured from `cfg`.
    pub fn from_config(cfg: &MtdlConfig) -> Result<Self> {
        let config = EngineConfig::from_config(cfg)?;
        let transport = CurlTransport::new(cfg.network_or_default(), cfg.download.buffer_bytes);
        Self::start(config, Arc::new(transport))
    }

    /// Queue `url` for download. Only http(s) URLs are accepted, and each URL
    /// at most once per engine.
    pub fn submit(&self, url: &str) -> Result<(), SubmitError> {
        url_model::validate_url(url)?;
        self.state.submit(Arc::from(url.trim()))
    }

    /// Cancel a queued or active download.
    pub fn cancel(&self, url: &str) -> CancelOutcome {
        let (outcome, cleanup) = self.state.cancel(url.trim());
        if let Some(storage) = cleanup {
            reap::discard_quietly(storage);
        }
        outcome
    }

    /// Current state of `url`; `None` if it was never submitted.
    pub fn status(&self, url: &str) -> Option<DownloadStatus> {
        self.state.status(url.trim())
    }

    /// Byte progress of an active download.
    pub fn progress(&self, url: &str) -> Option<ProgressStats> {
        self.state.progress(url.trim())
    }

    /// Archive records in the order downloads reached a terminal state.
    pub fn list_completed(&self) -> Vec<CompletionRecord> {
        self.state.list_completed()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.state.snapshot()
    }

    /// Block until no download is queued or active and every worker has been
    /// reaped. Returns false if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.state.wait_idle(timeout)
    }

    /// Cancel everything, wait for workers to stop, and join the control loop.
    /// Idempotent.
    pub fn shutdown(&self) {
        for storage in self.state.begin_shutdown() {
            reap::discard_quietly(storage);
        }
        let handle = self
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("control loop panicked");
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
