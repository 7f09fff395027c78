//! Retry and backoff shared by range workers and the admission step.
//!
//! A failed attempt is classified as transient, throttled or fatal; the
//! [`RetryPolicy`] turns that plus the attempt number into a delay or a stop.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::Transience;
pub use error::SegmentError;
pub use policy::{RetryDecision, RetryPolicy};
pub use run::run_with_retry;
