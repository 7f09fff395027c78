//! Aggregated progress of one active download.
//!
//! Bytes done is the completion tracker's sum: bytes of workers already reaped
//! plus the live counters of workers still running.

/// Snapshot of an active download's progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressStats {
    pub bytes_done: u64,
    pub total_bytes: u64,
    /// Seconds since admission.
    pub elapsed_secs: f64,
}

impl ProgressStats {
    /// Whole percent complete, floored and capped at 100. Empty resources are 100%.
    pub fn percent(&self) -> u8 {
        percent(self.bytes_done, self.total_bytes)
    }

    /// Average rate since admission (0 if no time has passed).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None while the rate is still 0).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }
}

pub(crate) fn percent(done: u64, total: u64) -> u8 {
    if total == 0 || done >= total {
        return 100;
    }
    ((done as u128 * 100) / total as u128) as u8
}
