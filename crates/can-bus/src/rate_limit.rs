//! Per-Identifier Rate Limiting
//!
//! Each allow-listed identifier is forwarded at most once per
//! [`MIN_INTERVAL_US`]; identifiers outside the list are never forwarded.

use crate::allow_list::VEHICLE_BUS_IDS;

/// Minimum spacing between two forwarded frames of one identifier (11 msg/s)
pub const MIN_INTERVAL_US: u64 = 1_000_000 / 11;

/// Outcome of offering a frame to the limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Frame should be fanned out
    Forward,
    /// Identifier is listed but was forwarded too recently
    Throttled,
    /// Identifier is not on the allow-list
    NotListed,
}

impl Admission {
    /// Whether the frame is forwarded
    pub fn is_forward(&self) -> bool {
        matches!(self, Admission::Forward)
    }
}

/// Admission filter owned by the ingestion task.
///
/// Holds one last-forwarded timestamp per allow-list entry. Not shared, so no
/// synchronization is needed.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Sorted identifiers of interest
    ids: &'static [u32],
    /// Last forwarded timestamp per identifier slot
    last_forwarded_us: Vec<Option<u64>>,
    /// Minimum interval between forwards
    min_interval_us: u64,
}

impl RateLimiter {
    /// Create a limiter over a sorted identifier list
    pub fn new(ids: &'static [u32], min_interval_us: u64) -> Self {
        debug_assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids must be sorted");
        Self {
            ids,
            last_forwarded_us: vec![None; ids.len()],
            min_interval_us,
        }
    }

    /// Decide whether a frame with `id` seen at `now_us` is forwarded
    pub fn admit(&mut self, id: u32, now_us: u64) -> Admission {
        let Ok(slot) = self.ids.binary_search(&id) else {
            return Admission::NotListed;
        };

        match self.last_forwarded_us[slot] {
            Some(last) if now_us.saturating_sub(last) < self.min_interval_us => {
                Admission::Throttled
            }
            _ => {
                self.last_forwarded_us[slot] = Some(now_us);
                Admission::Forward
            }
        }
    }

    /// Configured minimum interval in microseconds
    pub fn min_interval_us(&self) -> u64 {
        self.min_interval_us
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(VEHICLE_BUS_IDS, MIN_INTERVAL_US)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_frame_forwarded() {
        let mut limiter = RateLimiter::default();
        assert_eq!(limiter.admit(0x132, 0), Admission::Forward);
    }

    #[test]
    fn test_close_frames_throttled() {
        let mut limiter = RateLimiter::default();
        assert_eq!(limiter.admit(0x132, 1_000), Admission::Forward);
        assert_eq!(limiter.admit(0x132, 1_000 + MIN_INTERVAL_US - 1), Admission::Throttled);
        assert_eq!(limiter.admit(0x132, 1_000 + MIN_INTERVAL_US), Admission::Forward);
    }

    #[test]
    fn test_throttled_frame_does_not_reset_window() {
        let mut limiter = RateLimiter::default();
        limiter.admit(0x257, 0);
        limiter.admit(0x257, 50_000);
        // Measured from the forwarded frame, not the throttled one
        assert_eq!(limiter.admit(0x257, MIN_INTERVAL_US), Admission::Forward);
    }

    #[test]
    fn test_identifiers_are_independent() {
        let mut limiter = RateLimiter::default();
        assert!(limiter.admit(0x132, 0).is_forward());
        assert!(limiter.admit(0x257, 10).is_forward());
        assert!(!limiter.admit(0x132, 20).is_forward());
    }

    #[test]
    fn test_unlisted_never_forwarded() {
        let mut limiter = RateLimiter::default();
        assert_eq!(limiter.admit(0x7DF, 0), Admission::NotListed);
        assert_eq!(limiter.admit(0x7DF, 10_000_000), Admission::NotListed);
    }

    proptest! {
        #[test]
        fn prop_spacing_decides_second_forward(
            idx in 0..VEHICLE_BUS_IDS.len(),
            start in 0u64..1_000_000_000,
            gap in 0u64..(3 * MIN_INTERVAL_US),
        ) {
            let id = VEHICLE_BUS_IDS[idx];
            let mut limiter = RateLimiter::default();
            prop_assert!(limiter.admit(id, start).is_forward());
            let second = limiter.admit(id, start + gap);
            prop_assert_eq!(second.is_forward(), gap >= MIN_INTERVAL_US);
        }

        #[test]
        fn prop_unlisted_ids_rejected(id in 0u32..0x800, times in proptest::collection::vec(0u64..10_000_000, 1..20)) {
            prop_assume!(!crate::is_listed(id));
            let mut limiter = RateLimiter::default();
            for t in times {
                prop_assert_eq!(limiter.admit(id, t), Admission::NotListed);
            }
        }
    }
}
