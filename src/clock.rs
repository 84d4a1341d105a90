//! Monotonic nanosecond clock shared by the order book and stats blocks.
//!
//! `Order.timestamp` and `Trade.timestamp` are diagnostic only: time
//! priority is encoded by queue position, never by this field, so a
//! process-local monotonic counter (not wall-clock time) is sufficient.

use std::sync::OnceLock;
use std::time::Instant;

static START: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds elapsed since the first call to this function in the process.
pub fn now_nanos() -> u64 {
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64
}
