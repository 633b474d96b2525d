//! Wall-clock helper
//!
//! All timestamps in the system are Unix nanoseconds as `i64`. Services
//! read the clock at their edges and pass timestamps into constructors so
//! core logic stays deterministic under test.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in Unix nanoseconds.
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_nanos() as i64
}

/// Convert nanoseconds to whole milliseconds.
pub fn nanos_to_millis(nanos: i64) -> i64 {
    nanos / 1_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_monotonic_enough() {
        let a = now_nanos();
        let b = now_nanos();
        assert!(b >= a);
        // Sanity: after 2020, before 2100
        assert!(a > 1_577_836_800_000_000_000);
        assert!(a < 4_102_444_800_000_000_000);
    }

    #[test]
    fn test_nanos_to_millis() {
        assert_eq!(nanos_to_millis(1_500_000_000), 1_500);
        assert_eq!(nanos_to_millis(999_999), 0);
    }
}
