//! Shared engine state.
//!
//! The submission queue, in-flight set, task queue, worker set and archive all
//! live in one [`Queues`] behind a single mutex. Every mutation is a method on
//! [`SharedState`], so no caller can touch a collection without the lock. Each
//! method is a short critical section without I/O; probes, file operations and
//! thread spawning are done by the control loop between calls. State changes
//! are logged after the guard is dropped.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::error::{CapacityExceeded, SubmitError};
use super::model::{
    CancelOutcome, CompletionRecord, DownloadStatus, EngineSnapshot, Task, TerminalStatus,
};
use super::progress::{percent, ProgressStats};
use crate::downloader::{FetchMode, WorkerOutcome};
use crate::retry::RetryPolicy;
use crate::segmenter::Segment;
use crate::storage::StorageWriter;

/// A submitted resource waiting for admission.
#[derive(Debug)]
pub(crate) struct QueuedEntry {
    pub url: Arc<str>,
    /// Failed probes so far.
    pub probe_attempts: u32,
    /// Earliest instant the next probe may start (backoff after a failure).
    pub not_before: Option<Instant>,
    /// Being probed by the control loop; holds an admission slot.
    pub probing: bool,
}

impl QueuedEntry {
    fn new(url: Arc<str>) -> Self {
        Self {
            url,
            probe_attempts: 0,
            not_before: None,
            probing: false,
        }
    }

    fn ready(&self, now: Instant) -> bool {
        !self.probing && self.not_before.map_or(true, |t| t <= now)
    }
}

/// An admitted download in the in-flight set.
#[derive(Debug)]
pub(crate) struct ActiveDownload {
    pub length: u64,
    pub storage: StorageWriter,
    /// Raised on cancel or failure; every worker of this download watches it.
    pub abort: Arc<AtomicBool>,
    /// Bytes transferred by workers already reaped.
    pub reaped_bytes: u64,
    pub live_workers: usize,
    /// Progress reached the length; the file is being synced and renamed.
    pub finalizing: bool,
    pub started: Instant,
}

/// A worker thread in the pool. `outcome` is `None` while the worker is live.
#[derive(Debug)]
pub(crate) struct WorkerSlot {
    pub url: Arc<str>,
    pub segment: Segment,
    pub transferred: Arc<AtomicU64>,
    pub outcome: Option<WorkerOutcome>,
    pub handle: Option<JoinHandle<()>>,
}

/// Work handed from [`SharedState::next_dispatch`] to a new worker thread.
pub(crate) struct Dispatch {
    pub id: u64,
    pub task: Task,
    pub storage: StorageWriter,
    pub abort: Arc<AtomicBool>,
    pub transferred: Arc<AtomicU64>,
}

/// What a reap pass left for the control loop to do outside the lock.
#[derive(Default)]
pub(crate) struct Reaped {
    pub handles: Vec<JoinHandle<()>>,
    /// Downloads whose progress reached their length, now finalizing.
    pub finalize: Vec<(Arc<str>, StorageWriter)>,
    /// Temp files of downloads that failed.
    pub discard: Vec<StorageWriter>,
}

/// A state transition, logged once the lock has been released.
#[derive(Debug)]
enum Event {
    Submitted { url: Arc<str>, queued: usize },
    QueuedCanceled { url: Arc<str>, probing: bool },
    Terminated {
        url: Arc<str>,
        status: TerminalStatus,
        reason: Option<String>,
        dropped_tasks: usize,
    },
    Finished { url: Arc<str>, path: PathBuf },
    FinalizeFailed { url: Arc<str>, reason: String },
    ProbeGaveUp { url: Arc<str>, reason: String },
    ProbeRetry {
        url: Arc<str>,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    AdmissionFailed { url: Arc<str>, reason: String },
    Admitted {
        url: Arc<str>,
        length: u64,
        tasks: usize,
        ranged: bool,
    },
    WorkerReaped {
        url: Arc<str>,
        worker: u64,
        segment: Segment,
        bytes: u64,
        outcome: Option<WorkerOutcome>,
    },
    Finalizing { url: Arc<str>, length: u64 },
    ShuttingDown { workers: usize },
}

impl Event {
    fn log(self) {
        match self {
            Event::Submitted { url, queued } => tracing::debug!(url = %url, queued, "submitted"),
            Event::QueuedCanceled { url, probing } => {
                tracing::info!(url = %url, probing, "queued download canceled")
            }
            Event::Terminated {
                url,
                status: TerminalStatus::Failed,
                reason,
                dropped_tasks,
            } => tracing::error!(
                url = %url,
                dropped_tasks,
                "download failed: {}",
                reason.as_deref().unwrap_or("unknown error")
            ),
            Event::Terminated {
                url,
                status,
                dropped_tasks,
                ..
            } => tracing::info!(url = %url, dropped_tasks, "download {}", status),
            Event::Finished { url, path } => {
                tracing::info!(url = %url, path = %path.display(), "download finished")
            }
            Event::FinalizeFailed { url, reason } => {
                tracing::error!(url = %url, "download failed while finalizing: {}", reason)
            }
            Event::ProbeGaveUp { url, reason } => tracing::error!(url = %url, "{}", reason),
            Event::ProbeRetry {
                url,
                attempt,
                delay,
                error,
            } => tracing::warn!(
                url = %url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "probe failed, will retry: {}",
                error
            ),
            Event::AdmissionFailed { url, reason } => {
                tracing::error!(url = %url, "cannot admit download: {}", reason)
            }
            Event::Admitted {
                url,
                length,
                tasks,
                ranged,
            } => tracing::info!(url = %url, length, tasks, ranged, "download admitted"),
            Event::WorkerReaped {
                url,
                worker,
                segment,
                bytes,
                outcome,
            } => tracing::debug!(
                url = %url,
                worker,
                start = segment.start,
                end = segment.end,
                bytes,
                outcome = ?outcome,
                "worker reaped"
            ),
            Event::Finalizing { url, length } => {
                tracing::debug!(url = %url, length, "all bytes written, finalizing")
            }
            Event::ShuttingDown { workers } => tracing::info!(workers, "shutting down"),
        }
    }
}

fn log_all(events: Vec<Event>) {
    for event in events {
        event.log();
    }
}

#[derive(Debug, Default)]
pub(crate) struct Queues {
    submitted: VecDeque<QueuedEntry>,
    in_flight: HashMap<Arc<str>, ActiveDownload>,
    tasks: VecDeque<Task>,
    workers: HashMap<u64, WorkerSlot>,
    archive: Vec<CompletionRecord>,
    /// url -> index into `archive`.
    archived: HashMap<Arc<str>, usize>,
    next_worker_id: u64,
    /// Something changed that may let the control loop make progress.
    dirty: bool,
    shutdown: bool,
}

impl Queues {
    fn queued_index(&self, url: &str) -> Option<usize> {
        self.submitted.iter().position(|e| &*e.url == url)
    }

    fn knows(&self, url: &str) -> bool {
        self.queued_index(url).is_some()
            || self.in_flight.contains_key(url)
            || self.archived.contains_key(url)
    }

    fn probing(&self) -> usize {
        self.submitted.iter().filter(|e| e.probing).count()
    }

    fn admitted(&self) -> usize {
        self.in_flight.len() + self.probing()
    }

    fn is_idle(&self) -> bool {
        self.submitted.is_empty() && self.in_flight.is_empty() && self.workers.is_empty()
    }

    /// Completion-tracker sum: reaped bytes plus every unreaped worker's counter.
    fn progress_of(&self, url: &str, dl: &ActiveDownload) -> u64 {
        let live: u64 = self
            .workers
            .values()
            .filter(|w| &*w.url == url)
            .map(|w| w.transferred.load(Ordering::Acquire))
            .sum();
        dl.reaped_bytes + live
    }

    fn push_archive(
        &mut self,
        url: Arc<str>,
        status: TerminalStatus,
        reason: Option<String>,
        path: Option<PathBuf>,
    ) {
        self.archived.insert(Arc::clone(&url), self.archive.len());
        self.archive.push(CompletionRecord {
            url: url.to_string(),
            status,
            reason,
            path,
        });
    }

    fn drop_tasks(&mut self, url: &str) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| &*t.url != url);
        before - self.tasks.len()
    }

    /// Abort and archive an active download. Returns its storage for cleanup,
    /// or `None` if it is not active or already finalizing.
    fn terminate_active(
        &mut self,
        url: &str,
        status: TerminalStatus,
        reason: Option<String>,
        events: &mut Vec<Event>,
    ) -> Option<StorageWriter> {
        if self.in_flight.get(url)?.finalizing {
            return None;
        }
        let (key, dl) = self.in_flight.remove_entry(url)?;
        dl.abort.store(true, Ordering::Release);
        let dropped_tasks = self.drop_tasks(&key);
        events.push(Event::Terminated {
            url: Arc::clone(&key),
            status,
            reason: reason.clone(),
            dropped_tasks,
        });
        self.push_archive(key, status, reason, None);
        Some(dl.storage)
    }
}

/// The engine's single state object.
#[derive(Debug)]
pub(crate) struct SharedState {
    queues: Mutex<Queues>,
    /// Wakes the control loop.
    wake: Condvar,
    /// Wakes `wait_idle` callers.
    settled: Condvar,
    max_downloads: usize,
    max_threads: usize,
}

impl SharedState {
    pub fn new(max_downloads: usize, max_threads: usize) -> Self {
        Self {
            queues: Mutex::new(Queues::default()),
            wake: Condvar::new(),
            settled: Condvar::new(),
            max_downloads: max_downloads.max(1),
            max_threads: max_threads.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the state dirty and wake both the control loop and idle waiters.
    fn touch(&self, q: &mut Queues) {
        q.dirty = true;
        self.wake.notify_all();
        self.settled.notify_all();
    }

    // ---- caller side ------------------------------------------------------

    pub fn submit(&self, url: Arc<str>) -> Result<(), SubmitError> {
        let mut q = self.lock();
        if q.shutdown {
            return Err(SubmitError::ShuttingDown);
        }
        if q.knows(&url) {
            return Err(SubmitError::Duplicate(url.to_string()));
        }
        q.submitted.push_back(QueuedEntry::new(Arc::clone(&url)));
        let queued = q.submitted.len();
        self.touch(&mut q);
        drop(q);
        Event::Submitted { url, queued }.log();
        Ok(())
    }

    /// Cancel `url`. An active download's storage is returned so the caller
    /// can remove the temp file after the lock is released.
    pub fn cancel(&self, url: &str) -> (CancelOutcome, Option<StorageWriter>) {
        let mut events = Vec::new();
        let result = self.cancel_locked(url, &mut events);
        log_all(events);
        result
    }

    fn cancel_locked(
        &self,
        url: &str,
        events: &mut Vec<Event>,
    ) -> (CancelOutcome, Option<StorageWriter>) {
        let mut q = self.lock();
        if let Some(entry) = q.queued_index(url).and_then(|i| q.submitted.remove(i)) {
            events.push(Event::QueuedCanceled {
                url: Arc::clone(&entry.url),
                probing: entry.probing,
            });
            q.push_archive(entry.url, TerminalStatus::Canceled, None, None);
            self.touch(&mut q);
            return (CancelOutcome::Accepted, None);
        }
        if q.in_flight.contains_key(url) {
            return match q.terminate_active(url, TerminalStatus::Canceled, None, events) {
                Some(storage) => {
                    self.touch(&mut q);
                    (CancelOutcome::Accepted, Some(storage))
                }
                None => (CancelOutcome::TooLate, None),
            };
        }
        if q.archived.contains_key(url) {
            (CancelOutcome::TooLate, None)
        } else {
            (CancelOutcome::NotFound, None)
        }
    }

    pub fn status(&self, url: &str) -> Option<DownloadStatus> {
        let q = self.lock();
        if q.queued_index(url).is_some() {
            return Some(DownloadStatus::Queued);
        }
        if let Some(dl) = q.in_flight.get(url) {
            let progress_percent = if dl.finalizing {
                100
            } else {
                percent(q.progress_of(url, dl), dl.length)
            };
            return Some(DownloadStatus::Active { progress_percent });
        }
        q.archived
            .get(url)
            .map(|&i| DownloadStatus::from(q.archive[i].status))
    }

    pub fn progress(&self, url: &str) -> Option<ProgressStats> {
        let q = self.lock();
        let dl = q.in_flight.get(url)?;
        let bytes_done = if dl.finalizing {
            dl.length
        } else {
            q.progress_of(url, dl).min(dl.length)
        };
        Some(ProgressStats {
            bytes_done,
            total_bytes: dl.length,
            elapsed_secs: dl.started.elapsed().as_secs_f64(),
        })
    }

    pub fn list_completed(&self) -> Vec<CompletionRecord> {
        self.lock().archive.clone()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let q = self.lock();
        EngineSnapshot {
            queued: q.submitted.len(),
            probing: q.probing(),
            active: q.in_flight.len(),
            tasks: q.tasks.len(),
            workers: q.workers.len(),
            completed: q.archive.len(),
        }
    }

    /// Block until nothing is queued, in flight, or running, or `timeout` passes.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut q = self.lock();
        loop {
            if q.is_idle() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            q = self
                .settled
                .wait_timeout(q, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Cancel everything and stop accepting work. Returns temp files to discard.
    pub fn begin_shutdown(&self) -> Vec<StorageWriter> {
        let mut events = Vec::new();
        let mut q = self.lock();
        if q.shutdown {
            return Vec::new();
        }
        q.shutdown = true;
        events.push(Event::ShuttingDown {
            workers: q.workers.len(),
        });
        while let Some(entry) = q.submitted.pop_front() {
            q.push_archive(entry.url, TerminalStatus::Canceled, None, None);
        }
        let active: Vec<Arc<str>> = q.in_flight.keys().cloned().collect();
        let discards = active
            .iter()
            .filter_map(|url| q.terminate_active(url, TerminalStatus::Canceled, None, &mut events))
            .collect();
        self.touch(&mut q);
        drop(q);
        log_all(events);
        discards
    }

    // ---- control loop side ------------------------------------------------

    /// Wait until the control loop has something to do. Returns false once
    /// shutdown has been requested and every worker has been reaped.
    pub fn wait_for_work(&self) -> bool {
        let mut q = self.lock();
        loop {
            if q.shutdown && q.workers.is_empty() {
                return false;
            }
            if q.dirty {
                q.dirty = false;
                return true;
            }
            // A backing-off entry becomes eligible on its own; wake for it.
            let now = Instant::now();
            let has_slot = q.admitted() < self.max_downloads;
            let mut next: Option<Instant> = None;
            for entry in q.submitted.iter().filter(|e| !e.probing) {
                match entry.not_before {
                    Some(t) if t > now => next = Some(next.map_or(t, |n| n.min(t))),
                    _ if has_slot && !q.shutdown => return true,
                    _ => {}
                }
            }
            q = match next {
                Some(t) => {
                    self.wake
                        .wait_timeout(q, t - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.wake.wait(q).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Remove exited workers, fold their bytes into their download, fail
    /// downloads whose worker failed, and mark complete downloads finalizing.
    pub fn reap(&self) -> Reaped {
        let mut out = Reaped::default();
        let mut events = Vec::new();
        let mut guard = self.lock();
        let q = &mut *guard;

        let exited: Vec<u64> = q
            .workers
            .iter()
            .filter(|(_, w)| w.outcome.is_some())
            .map(|(id, _)| *id)
            .collect();
        for id in exited {
            let Some(slot) = q.workers.remove(&id) else {
                continue;
            };
            out.handles.extend(slot.handle);
            let bytes = slot.transferred.load(Ordering::Acquire);
            if let Some(dl) = q.in_flight.get_mut(&slot.url) {
                dl.reaped_bytes += bytes;
                dl.live_workers = dl.live_workers.saturating_sub(1);
            }
            events.push(Event::WorkerReaped {
                url: Arc::clone(&slot.url),
                worker: id,
                segment: slot.segment,
                bytes,
                outcome: slot.outcome.clone(),
            });
            if let Some(WorkerOutcome::Failed(reason)) = slot.outcome {
                out.discard.extend(q.terminate_active(
                    &slot.url,
                    TerminalStatus::Failed,
                    Some(reason),
                    &mut events,
                ));
            }
        }

        let complete: Vec<Arc<str>> = q
            .in_flight
            .iter()
            .filter(|(url, dl)| !dl.finalizing && q.progress_of(url, dl) >= dl.length)
            .map(|(url, _)| Arc::clone(url))
            .collect();
        for url in complete {
            if let Some(dl) = q.in_flight.get_mut(&url) {
                dl.finalizing = true;
                events.push(Event::Finalizing {
                    url: Arc::clone(&url),
                    length: dl.length,
                });
                out.finalize.push((url, dl.storage.clone()));
            }
        }

        self.settled.notify_all();
        drop(guard);
        log_all(events);
        out
    }

    /// Archive a finalizing download as finished (`Ok(path)`) or failed.
    pub fn finish(&self, url: &str, result: Result<PathBuf, String>) {
        let mut q = self.lock();
        let Some((key, _dl)) = q.in_flight.remove_entry(url) else {
            return;
        };
        let event = match result {
            Ok(path) => {
                q.push_archive(Arc::clone(&key), TerminalStatus::Finished, None, Some(path.clone()));
                Event::Finished { url: key, path }
            }
            Err(reason) => {
                q.push_archive(Arc::clone(&key), TerminalStatus::Failed, Some(reason.clone()), None);
                Event::FinalizeFailed { url: key, reason }
            }
        };
        self.touch(&mut q);
        drop(q);
        event.log();
    }

    /// Claim the next admissible queued entry for probing, FIFO, skipping
    /// entries still backing off. `None` when no slot or no entry is ready.
    pub fn begin_probe(&self) -> Option<Arc<str>> {
        let mut q = self.lock();
        if q.shutdown || q.admitted() >= self.max_downloads {
            return None;
        }
        let now = Instant::now();
        let entry = q.submitted.iter_mut().find(|e| e.ready(now))?;
        entry.probing = true;
        Some(Arc::clone(&entry.url))
    }

    /// Record a failed probe: back off, or fail the entry once
    /// `max_attempts` probes have failed.
    pub fn probe_failed(&self, url: &str, error: &str, policy: &RetryPolicy, max_attempts: u32) {
        let mut q = self.lock();
        let Some(i) = q.queued_index(url) else {
            return;
        };
        let entry = &mut q.submitted[i];
        entry.probing = false;
        entry.probe_attempts += 1;
        let attempts = entry.probe_attempts;
        let event = if attempts >= max_attempts {
            let reason = format!("probe failed after {} attempts: {}", attempts, error);
            let entry = q.submitted.remove(i);
            entry.map(|entry| {
                q.push_archive(
                    Arc::clone(&entry.url),
                    TerminalStatus::Failed,
                    Some(reason.clone()),
                    None,
                );
                Event::ProbeGaveUp {
                    url: entry.url,
                    reason,
                }
            })
        } else {
            let delay = policy.backoff(attempts);
            entry.not_before = Some(Instant::now() + delay);
            Some(Event::ProbeRetry {
                url: Arc::clone(&entry.url),
                attempt: attempts,
                delay,
                error: error.to_string(),
            })
        };
        self.touch(&mut q);
        drop(q);
        if let Some(event) = event {
            event.log();
        }
    }

    /// Fail a queued entry whose destination could not be prepared.
    pub fn admission_failed(&self, url: &str, reason: String) {
        let mut q = self.lock();
        let Some(entry) = q.queued_index(url).and_then(|i| q.submitted.remove(i)) else {
            return;
        };
        q.push_archive(
            Arc::clone(&entry.url),
            TerminalStatus::Failed,
            Some(reason.clone()),
            None,
        );
        self.touch(&mut q);
        drop(q);
        Event::AdmissionFailed {
            url: entry.url,
            reason,
        }
        .log();
    }

    /// Move a probed entry from the queue to the in-flight set and enqueue its
    /// tasks in one step. If the entry was canceled meanwhile the storage is
    /// handed back for discarding.
    pub fn activate(
        &self,
        url: &str,
        length: u64,
        storage: StorageWriter,
        tasks: Vec<Task>,
    ) -> Result<(), StorageWriter> {
        let mut q = self.lock();
        let Some(entry) = q.queued_index(url).and_then(|i| q.submitted.remove(i)) else {
            return Err(storage);
        };
        let event = Event::Admitted {
            url: Arc::clone(&entry.url),
            length,
            tasks: tasks.len(),
            ranged: !tasks.iter().any(|t| t.mode == FetchMode::Whole),
        };
        q.tasks.extend(tasks);
        q.in_flight.insert(
            entry.url,
            ActiveDownload {
                length,
                storage,
                abort: Arc::new(AtomicBool::new(false)),
                reaped_bytes: 0,
                live_workers: 0,
                finalizing: false,
                started: Instant::now(),
            },
        );
        self.touch(&mut q);
        drop(q);
        event.log();
        Ok(())
    }

    /// Final paths already claimed by in-flight downloads.
    pub fn active_destinations(&self) -> Vec<PathBuf> {
        self.lock()
            .in_flight
            .values()
            .map(|dl| dl.storage.final_path().to_path_buf())
            .collect()
    }

    /// Pop the next task and register a worker slot for it, if a slot is free.
    pub fn next_dispatch(&self) -> Option<Dispatch> {
        let mut guard = self.lock();
        let q = &mut *guard;
        if q.workers.len() >= self.max_threads {
            return None;
        }
        while let Some(task) = q.tasks.pop_front() {
            let Some(dl) = q.in_flight.get_mut(&task.url) else {
                continue;
            };
            if dl.abort.load(Ordering::Acquire) {
                continue;
            }
            dl.live_workers += 1;
            let id = q.next_worker_id;
            q.next_worker_id += 1;
            let transferred = Arc::new(AtomicU64::new(0));
            q.workers.insert(
                id,
                WorkerSlot {
                    url: Arc::clone(&task.url),
                    segment: task.segment,
                    transferred: Arc::clone(&transferred),
                    outcome: None,
                    handle: None,
                },
            );
            return Some(Dispatch {
                id,
                storage: dl.storage.clone(),
                abort: Arc::clone(&dl.abort),
                task,
                transferred,
            });
        }
        None
    }

    pub fn attach_handle(&self, id: u64, handle: JoinHandle<()>) {
        if let Some(slot) = self.lock().workers.get_mut(&id) {
            slot.handle = Some(handle);
        }
    }

    /// Called by a worker thread as its last action.
    pub fn worker_exited(&self, id: u64, outcome: WorkerOutcome) {
        let mut q = self.lock();
        if let Some(slot) = q.workers.get_mut(&id) {
            slot.outcome = Some(outcome);
        }
        self.touch(&mut q);
    }

    /// Check both capacity bounds.
    pub fn check_capacity(&self) -> Result<(), CapacityExceeded> {
        let q = self.lock();
        let admitted = q.admitted();
        if admitted > self.max_downloads {
            return Err(CapacityExceeded::Downloads {
                admitted,
                max: self.max_downloads,
            });
        }
        if q.workers.len() > self.max_threads {
            return Err(CapacityExceeded::Workers {
                live: q.workers.len(),
                max: self.max_threads,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch_head::ProbeResult;
    use crate::scheduler::admit;
    use std::sync::atomic::AtomicUsize;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    /// Counts log events, and those emitted while the queue mutex is held.
    struct LockWatch {
        state: Arc<SharedState>,
        events: Arc<AtomicUsize>,
        under_lock: Arc<AtomicUsize>,
    }

    impl<S: tracing::Subscriber> Layer<S> for LockWatch {
        fn on_event(&self, _event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            self.events.fetch_add(1, Ordering::SeqCst);
            if self.state.queues.try_lock().is_err() {
                self.under_lock.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn writer(dir: &std::path::Path, name: &str) -> StorageWriter {
        let temp = dir.join(format!("{}.part", name));
        let file = std::fs::File::create(&temp).unwrap();
        StorageWriter::from_parts(file, temp, dir.join(name))
    }

    fn admit_one(state: &SharedState, dir: &std::path::Path, name: &str) -> Arc<str> {
        let url = state.begin_probe().unwrap();
        let probe = ProbeResult {
            length: 10,
            accept_ranges: true,
        };
        let tasks = admit::partition(&url, probe, 2);
        state.activate(&url, 10, writer(dir, name), tasks).unwrap();
        url
    }

    #[test]
    fn transitions_are_logged_after_unlock() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(SharedState::new(1, 2));
        let events = Arc::new(AtomicUsize::new(0));
        let under_lock = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(LockWatch {
            state: Arc::clone(&state),
            events: Arc::clone(&events),
            under_lock: Arc::clone(&under_lock),
        });
        let policy = RetryPolicy::default();

        tracing::subscriber::with_default(subscriber, || {
            // queued cancel
            state.submit(Arc::from("http://h/a")).unwrap();
            assert_eq!(state.cancel("http://h/a").0, CancelOutcome::Accepted);

            // retry then give up
            state.submit(Arc::from("http://h/b")).unwrap();
            let b = state.begin_probe().unwrap();
            state.probe_failed(&b, "timed out", &policy, 2);
            state.lock().submitted[0].not_before = None;
            let b = state.begin_probe().unwrap();
            state.probe_failed(&b, "timed out", &policy, 2);

            state.submit(Arc::from("http://h/c")).unwrap();
            let c = state.begin_probe().unwrap();
            state.admission_failed(&c, "no space".to_string());

            // active cancel
            state.submit(Arc::from("http://h/d")).unwrap();
            let d = admit_one(&state, dir.path(), "d");
            let (outcome, storage) = state.cancel(&d);
            assert_eq!(outcome, CancelOutcome::Accepted);
            assert!(storage.is_some());

            state.submit(Arc::from("http://h/e")).unwrap();
            let e = admit_one(&state, dir.path(), "e");
            state.finish(&e, Ok(dir.path().join("e")));

            state.submit(Arc::from("http://h/f")).unwrap();
            admit_one(&state, dir.path(), "f");
            state.submit(Arc::from("http://h/g")).unwrap();
            assert_eq!(state.begin_shutdown().len(), 1);
            state.reap();
        });

        assert!(events.load(Ordering::SeqCst) >= 14);
        assert_eq!(under_lock.load(Ordering::SeqCst), 0);
        let statuses: Vec<TerminalStatus> =
            state.list_completed().iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                TerminalStatus::Canceled,
                TerminalStatus::Failed,
                TerminalStatus::Failed,
                TerminalStatus::Canceled,
                TerminalStatus::Finished,
                TerminalStatus::Canceled,
                TerminalStatus::Canceled,
            ]
        );
    }
}
