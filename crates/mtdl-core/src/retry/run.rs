//! Retry loop: run a closure until success, cancellation, or policy says stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::error::SegmentError;
use super::policy::{RetryDecision, RetryPolicy};

/// Granularity of the cancellable backoff sleep.
const ABORT_POLL: Duration = Duration::from_millis(50);

/// Runs a closure until it succeeds or the retry policy says to stop.
/// On retryable failure, sleeps for the backoff duration then tries again.
/// The closure receives the 1-based attempt number. If `abort` is raised while
/// backing off, returns `SegmentError::Interrupted` without another attempt.
pub fn run_with_retry<F>(policy: &RetryPolicy, abort: &AtomicBool, mut f: F) -> Result<(), SegmentError>
where
    F: FnMut(u32) -> Result<(), SegmentError>,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt) {
            Ok(()) => return Ok(()),
            Err(e) => {
                match policy.decide(attempt, e.transience()) {
                    RetryDecision::GiveUp => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        tracing::warn!(attempt, delay_ms = d.as_millis() as u64, "retrying after: {}", e);
                        if !sleep_unless_aborted(d, abort) {
                            return Err(SegmentError::Interrupted);
                        }
                        attempt += 1;
                    }
                }
            }
        }
    }
}

/// Sleeps for `d` in short slices. Returns false as soon as `abort` is set.
fn sleep_unless_aborted(d: Duration, abort: &AtomicBool) -> bool {
    let deadline = Instant::now() + d;
    loop {
        if abort.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(ABORT_POLL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn retries_until_success() {
        let abort = AtomicBool::new(false);
        let mut calls = 0;
        let res = run_with_retry(&fast_policy(5), &abort, |attempt| {
            calls += 1;
            if attempt < 3 {
                Err(SegmentError::Http(503))
            } else {
                Ok(())
            }
        });
        assert!(res.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let abort = AtomicBool::new(false);
        let mut calls = 0;
        let res = run_with_retry(&fast_policy(3), &abort, |_| {
            calls += 1;
            Err(SegmentError::Http(500))
        });
        assert!(matches!(res, Err(SegmentError::Http(500))));
        assert_eq!(calls, 3);
    }

    #[test]
    fn fatal_error_not_retried() {
        let abort = AtomicBool::new(false);
        let mut calls = 0;
        let res = run_with_retry(&fast_policy(5), &abort, |_| {
            calls += 1;
            Err(SegmentError::Http(404))
        });
        assert!(matches!(res, Err(SegmentError::Http(404))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn abort_during_backoff_stops() {
        let abort = AtomicBool::new(true);
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(10),
        };
        let started = Instant::now();
        let res = run_with_retry(&policy, &abort, |_| Err(SegmentError::Http(503)));
        assert!(matches!(res, Err(SegmentError::Interrupted)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
