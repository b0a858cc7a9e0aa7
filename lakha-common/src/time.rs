use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current UNIX timestamp in fractional seconds, matching the
/// source's `time.time()` precision (used for block/transaction timestamps
/// and PoCS temporal decay).
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the UNIX epoch")
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_monotonic_enough() {
        let t1 = now();
        let t2 = now();
        assert!(t2 >= t1);
    }
}
