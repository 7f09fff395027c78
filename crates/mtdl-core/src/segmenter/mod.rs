//! Range math and segment planning.
//!
//! Splits an admitted download into inclusive byte-range segments and
//! computes HTTP Range header bounds.

mod range;

pub use range::{plan_segments, Segment};
