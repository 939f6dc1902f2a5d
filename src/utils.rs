use std::time::Duration;

use rand::Rng;

const MAX_BACKOFF_MS: u64 = 30_000;

/// Exponential backoff for `attempt` plus up to 50% random jitter, capped at 30s.
pub(crate) fn jittered_delay(base_delay_ms: u64, attempt: u32) -> Duration {
    let backoff_multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let base = base_delay_ms.saturating_mul(backoff_multiplier);

    let jitter_upper_bound = base / 2;
    let jitter = if jitter_upper_bound == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_upper_bound)
    };

    Duration::from_millis(base.saturating_add(jitter).min(MAX_BACKOFF_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jittered_delay_bounds() {
        for attempt in 0..9 {
            let base = 100 * 2u64.pow(attempt);
            let delay = jittered_delay(100, attempt);
            assert!(delay >= Duration::from_millis(base.min(MAX_BACKOFF_MS)));
            assert!(delay <= Duration::from_millis((base + base / 2).min(MAX_BACKOFF_MS)));
        }
    }

    #[test]
    fn test_jittered_delay_overflow_is_capped() {
        assert_eq!(jittered_delay(u64::MAX, u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_base_has_no_jitter() {
        assert_eq!(jittered_delay(0, 3), Duration::ZERO);
    }
}
