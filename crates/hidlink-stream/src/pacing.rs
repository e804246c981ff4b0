//! Inter-frame delay selection.
//!
//! Priority, first match wins:
//! 1. fixed delay from `SyncConfig::frame_delay_ms`
//! 2. the source's nominal frame interval (video frame rate)
//! 3. gap between the two latest source timestamps
//! 4. [`DEFAULT_FRAME_DELAY`]

use std::time::Duration;

use hidlink_core::DEFAULT_FRAME_DELAY;

#[derive(Debug, Clone, Default)]
pub struct FramePacer {
    fixed: Option<Duration>,
    nominal: Option<Duration>,
    last_timestamp: Option<Duration>,
    last_gap: Option<Duration>,
}

impl FramePacer {
    pub fn new(fixed: Option<Duration>, nominal: Option<Duration>) -> Self {
        Self {
            fixed: fixed.filter(|d| !d.is_zero()),
            nominal: nominal.filter(|d| !d.is_zero()),
            ..Self::default()
        }
    }

    /// Feed the timestamp of the frame just written.
    pub fn observe(&mut self, timestamp: Option<Duration>) {
        let Some(ts) = timestamp else { return };
        if let Some(prev) = self.last_timestamp {
            // Non-increasing stamps (new pass, reordered B-frames) carry no spacing.
            if ts > prev {
                self.last_gap = Some(ts - prev);
            }
        }
        self.last_timestamp = Some(ts);
    }

    /// Timestamps restart at zero on every pass; the last known gap is kept.
    pub fn begin_pass(&mut self) {
        self.last_timestamp = None;
    }

    pub fn delay(&self) -> Duration {
        self.fixed
            .or(self.nominal)
            .or(self.last_gap)
            .unwrap_or(DEFAULT_FRAME_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: fn(u64) -> Duration = Duration::from_millis;

    #[test]
    fn fixed_delay_wins() {
        let mut pacer = FramePacer::new(Some(MS(250)), Some(MS(40)));
        pacer.observe(Some(MS(0)));
        pacer.observe(Some(MS(33)));
        assert_eq!(pacer.delay(), MS(250));
    }

    #[test]
    fn nominal_interval_before_timestamps() {
        let mut pacer = FramePacer::new(None, Some(MS(40)));
        pacer.observe(Some(MS(0)));
        pacer.observe(Some(MS(33)));
        assert_eq!(pacer.delay(), MS(40));
    }

    #[test]
    fn timestamp_gap_then_default() {
        let mut pacer = FramePacer::new(None, None);
        assert_eq!(pacer.delay(), DEFAULT_FRAME_DELAY);

        pacer.observe(Some(MS(1_000)));
        assert_eq!(pacer.delay(), DEFAULT_FRAME_DELAY);
        pacer.observe(Some(MS(1_066)));
        assert_eq!(pacer.delay(), MS(66));

        pacer.begin_pass();
        pacer.observe(Some(MS(0)));
        assert_eq!(pacer.delay(), MS(66));
    }

    #[test]
    fn zero_durations_are_ignored() {
        let pacer = FramePacer::new(Some(Duration::ZERO), Some(Duration::ZERO));
        assert_eq!(pacer.delay(), DEFAULT_FRAME_DELAY);
    }
}
