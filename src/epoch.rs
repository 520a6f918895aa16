use std::time::{Duration, Instant};

/// Sentinel offset meaning "nothing pending".
pub const EMPTY: u64 = u64::MAX;

/// Maps instants in the caller's clock domain onto nanosecond offsets from
/// the list's start time, and offsets onto coarse epoch indices.
///
/// Instants before `start` clamp to offset zero. Offsets never reach
/// [`EMPTY`], so it stays free as a sentinel.
#[derive(Debug, Clone, Copy)]
pub struct EpochClock {
    start: Instant,
    width: u64,
}

impl EpochClock {
    pub fn new(start: Instant, epoch_duration: Duration) -> Self {
        let width = u64::try_from(epoch_duration.as_nanos())
            .unwrap_or(EMPTY - 1)
            .max(1);
        Self { start, width }
    }

    #[inline(always)]
    pub fn start(&self) -> Instant {
        self.start
    }

    #[inline(always)]
    pub fn epoch_duration(&self) -> Duration {
        Duration::from_nanos(self.width)
    }

    #[inline(always)]
    pub fn offset(&self, when: Instant) -> u64 {
        let nanos = when.saturating_duration_since(self.start).as_nanos();
        u64::try_from(nanos).unwrap_or(EMPTY - 1).min(EMPTY - 1)
    }

    #[inline(always)]
    pub fn epoch_of(&self, when: Instant) -> u64 {
        self.offset(when) / self.width
    }

    /// Offset of the first instant belonging to `epoch`.
    #[inline(always)]
    pub fn epoch_start(&self, epoch: u64) -> u64 {
        epoch.saturating_mul(self.width).min(EMPTY - 1)
    }

    /// Instant for an offset, `None` for [`EMPTY`].
    #[inline]
    pub fn instant_at(&self, offset: u64) -> Option<Instant> {
        if offset == EMPTY {
            return None;
        }
        self.start.checked_add(Duration::from_nanos(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_boundaries() {
        let start = Instant::now();
        let clock = EpochClock::new(start, Duration::from_secs(1));

        assert_eq!(clock.epoch_of(start), 0);
        assert_eq!(clock.epoch_of(start + Duration::from_millis(10)), 0);
        assert_eq!(clock.epoch_of(start + Duration::from_millis(999)), 0);
        assert_eq!(clock.epoch_of(start + Duration::from_millis(1000)), 1);
        assert_eq!(clock.epoch_of(start + Duration::from_millis(1010)), 1);
        assert_eq!(clock.epoch_of(start + Duration::from_millis(2500)), 2);
    }

    #[test]
    fn test_before_start_clamps_to_zero() {
        let start = Instant::now() + Duration::from_secs(5);
        let clock = EpochClock::new(start, Duration::from_secs(1));

        assert_eq!(clock.offset(start - Duration::from_secs(3)), 0);
        assert_eq!(clock.epoch_of(start - Duration::from_secs(3)), 0);
    }

    #[test]
    fn test_epoch_start_is_lower_bound() {
        let start = Instant::now();
        let clock = EpochClock::new(start, Duration::from_millis(250));

        for ms in [0u64, 1, 249, 250, 251, 999, 1000, 12_345] {
            let when = start + Duration::from_millis(ms);
            let epoch = clock.epoch_of(when);
            assert!(clock.epoch_start(epoch) <= clock.offset(when));
            assert!(clock.epoch_start(epoch + 1) > clock.offset(when));
        }
    }

    #[test]
    fn test_instant_round_trip() {
        let start = Instant::now();
        let clock = EpochClock::new(start, Duration::from_secs(1));
        let when = start + Duration::from_micros(1_234_567);

        assert_eq!(clock.instant_at(clock.offset(when)), Some(when));
        assert_eq!(clock.instant_at(EMPTY), None);
    }

    #[test]
    fn test_zero_width_is_clamped() {
        let clock = EpochClock::new(Instant::now(), Duration::ZERO);
        assert_eq!(clock.epoch_duration(), Duration::from_nanos(1));
    }
}
