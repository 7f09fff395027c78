//! Reap step and completion tracking: collect exited workers, then sync and
//! rename downloads whose progress reached their length.

use super::state::SharedState;
use crate::storage::StorageWriter;

pub(super) fn reap_and_finalize(state: &SharedState) {
    let reaped = state.reap();

    for handle in reaped.handles {
        if handle.join().is_err() {
            tracing::warn!("worker thread panicked after reporting");
        }
    }
    for storage in reaped.discard {
        discard_quietly(storage);
    }
    for (url, storage) in reaped.finalize {
        let final_path = storage.final_path().to_path_buf();
        let result = storage
            .finalize()
            .map(|()| final_path)
            .map_err(|e| format!("{:#}", e));
        state.finish(&url, result);
    }
}

/// Remove a temp file, logging instead of failing.
pub(super) fn discard_quietly(storage: StorageWriter) {
    let path = storage.temp_path().to_path_buf();
    if let Err(e) = storage.discard() {
        tracing::warn!(path = %path.display(), "cannot remove temp file: {:#}", e);
    }
}
