//! The control loop: one dedicated thread running reap, admit, dispatch.

use std::sync::Arc;

use super::state::SharedState;
use super::{admit, dispatch, reap, EngineConfig};
use crate::transport::Transport;

/// What the control thread owns.
pub(super) struct LoopContext {
    pub state: Arc<SharedState>,
    pub transport: Arc<dyn Transport>,
    pub config: EngineConfig,
}

/// Runs until shutdown is requested and the last worker has been reaped.
/// Blocks on the state's condition variable between iterations.
pub(super) fn run(ctx: LoopContext) {
    tracing::info!(
        max_downloads = ctx.config.max_downloads,
        max_threads = ctx.config.max_threads,
        split_num = ctx.config.split_num,
        "control loop started"
    );
    loop {
        reap::reap_and_finalize(&ctx.state);
        admit::admit_pending(&ctx);
        dispatch::dispatch_ready(&ctx);
        if let Err(e) = ctx.state.check_capacity() {
            tracing::error!("capacity exceeded: {}", e);
        }
        if !ctx.state.wait_for_work() {
            break;
        }
    }
    // Files of downloads finishing during shutdown still get renamed.
    reap::reap_and_finalize(&ctx.state);
    tracing::info!("control loop stopped");
}
