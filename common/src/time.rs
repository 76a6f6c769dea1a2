// Wall-clock timestamps, always milliseconds since the Unix epoch. That is
// the one unit the gateway deals in: order expirations, the trades lookback
// window, and the event stream's timestamp_ms fields all use it. Nothing
// here feeds signing or object versioning, so a skewed host clock can only
// shift lookback boundaries.

use std::time::{SystemTime, UNIX_EPOCH};

// Millisecond timestamps carry their unit in the type
pub type TimestampMillis = u64;

pub fn current_millis() -> TimestampMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is set before the unix epoch")
        .as_millis() as TimestampMillis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_millis_is_past_2020() {
        // 2020-01-01 in milliseconds; a sane host clock is well past it
        assert!(current_millis() > 1_577_836_800_000);
    }
}
