//! Dispatch step: start one worker thread per task while slots are free.

use std::sync::Arc;
use std::thread;

use super::control_loop::LoopContext;
use super::state::{Dispatch, SharedState};
use crate::downloader::{run_worker, RangeJob, WorkerOutcome};

/// Reports the worker's outcome when dropped, so a panicking worker is still
/// reaped, as a failure.
struct ExitReport {
    state: Arc<SharedState>,
    id: u64,
    outcome: Option<WorkerOutcome>,
}

impl Drop for ExitReport {
    fn drop(&mut self) {
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| WorkerOutcome::Failed("worker panicked".to_string()));
        self.state.worker_exited(self.id, outcome);
    }
}

pub(super) fn dispatch_ready(ctx: &LoopContext) {
    while let Some(job) = ctx.state.next_dispatch() {
        spawn_worker(ctx, job);
    }
}

fn spawn_worker(ctx: &LoopContext, job: Dispatch) {
    let id = job.id;
    tracing::debug!(
        url = %job.task.url,
        worker = id,
        start = job.task.segment.start,
        end = job.task.segment.end,
        "dispatching"
    );

    let state = Arc::clone(&ctx.state);
    let transport = Arc::clone(&ctx.transport);
    let policy = ctx.config.retry;
    let spawned = thread::Builder::new()
        .name(format!("mtdl-worker-{}", id))
        .spawn(move || {
            let mut report = ExitReport {
                state,
                id,
                outcome: None,
            };
            let range_job = RangeJob {
                url: &job.task.url,
                segment: job.task.segment,
                mode: job.task.mode,
                storage: &job.storage,
                transferred: &job.transferred,
                abort: &job.abort,
            };
            report.outcome = Some(run_worker(transport.as_ref(), &policy, &range_job));
        });

    match spawned {
        Ok(handle) => ctx.state.attach_handle(id, handle),
        Err(e) => ctx
            .state
            .worker_exited(id, WorkerOutcome::Failed(format!("cannot spawn worker: {}", e))),
    }
}
