//! Admission step: probe queued resources, prepare their files, partition.

use std::sync::Arc;

use super::control_loop::LoopContext;
use super::model::Task;
use super::reap::discard_quietly;
use crate::downloader::FetchMode;
use crate::fetch_head::ProbeResult;
use crate::segmenter::{plan_segments, Segment};
use crate::{paths, storage, url_model};

/// Admit queued resources while admission slots are free.
pub(super) fn admit_pending(ctx: &LoopContext) {
    while let Some(url) = ctx.state.begin_probe() {
        tracing::debug!(url = %url, "probing");
        match ctx.transport.probe(&url) {
            Ok(probe) => prepare_and_activate(ctx, &url, probe),
            Err(e) => ctx.state.probe_failed(
                &url,
                &e.to_string(),
                &ctx.config.retry,
                ctx.config.max_probe_attempts,
            ),
        }
    }
}

fn prepare_and_activate(ctx: &LoopContext, url: &Arc<str>, probe: ProbeResult) {
    let name = url_model::derive_filename(url);
    let taken = ctx.state.active_destinations();
    let final_path = paths::unique_destination(&ctx.config.download_dir, &name, &taken);

    let storage = match storage::prepare(&final_path, probe.length) {
        Ok(s) => s,
        Err(e) => {
            ctx.state.admission_failed(url, format!("{:#}", e));
            return;
        }
    };

    let tasks = partition(url, probe, ctx.config.split_num);
    if let Err(storage) = ctx.state.activate(url, probe.length, storage, tasks) {
        tracing::debug!(url = %url, "canceled while probing, discarding prepared file");
        discard_quietly(storage);
    }
}

/// Tasks for a probed resource: `split` ranged segments, or one whole-body
/// task when the server does not serve ranges. Empty resources get none.
pub(crate) fn partition(url: &Arc<str>, probe: ProbeResult, split: usize) -> Vec<Task> {
    if probe.length == 0 {
        return Vec::new();
    }
    if !probe.accept_ranges {
        return vec![Task {
            url: Arc::clone(url),
            segment: Segment::new(0, probe.length - 1),
            mode: FetchMode::Whole,
        }];
    }
    plan_segments(probe.length, split)
        .into_iter()
        .map(|segment| Task {
            url: Arc::clone(url),
            segment,
            mode: FetchMode::Ranged,
        })
        .collect()
}
