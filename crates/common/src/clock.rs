//! Clock and timing utilities for capture and export.
//!
//! Recording sessions anchor every frame to a monotonic epoch captured at
//! session start. This module provides:
//! - The epoch clock (backed by tokio's clock so virtual time works in tests)
//! - A frame scheduler that fires at a fixed cadence without drifting
//! - Conversions between frame indices, seconds and nanoseconds
//! - Drift measurement between two timelines

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// A recording clock that provides monotonic timestamps relative to
/// a fixed epoch (the moment capture started).
#[derive(Debug, Clone)]
pub struct RecordingClock {
    /// The instant capture started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl RecordingClock {
    /// Create a new recording clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Get nanoseconds elapsed since capture start.
    pub fn elapsed_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Get seconds elapsed since capture start.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at capture start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// The instant `secs` after the epoch.
    pub fn deadline_after(&self, secs: f64) -> Instant {
        self.epoch + Duration::from_secs_f64(secs.max(0.0))
    }

    /// Convert an elapsed nanosecond value to seconds.
    pub fn ns_to_secs(ns: u64) -> f64 {
        ns as f64 / 1_000_000_000.0
    }

    /// Convert seconds to nanoseconds.
    pub fn secs_to_ns(secs: f64) -> u64 {
        (secs * 1_000_000_000.0) as u64
    }
}

/// Presentation time of frame `index` at `fps`.
///
/// Derived from the index rather than accumulated, so long runs do not
/// pick up floating-point drift.
pub fn frame_time_secs(index: u64, fps: u32) -> f64 {
    index as f64 / fps.max(1) as f64
}

/// Length of one frame at `fps`, in seconds.
pub fn frame_interval_secs(fps: u32) -> f64 {
    1.0 / fps.max(1) as f64
}

/// Drift measurement between two streams.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Timestamp in the reference stream (ns).
    pub reference_ns: u64,
    /// Timestamp in the measured stream (ns).
    pub measured_ns: u64,
}

impl DriftMeasurement {
    /// Drift in nanoseconds (positive = measured is ahead).
    pub fn drift_ns(&self) -> i64 {
        self.measured_ns as i64 - self.reference_ns as i64
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_ns() as f64 / 1_000_000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}

/// Frame-ready scheduler.
///
/// Ticks are scheduled against absolute deadlines (`epoch + n * period`),
/// so a slow frame delays only itself. Missed ticks are skipped rather
/// than replayed in a burst.
#[derive(Debug)]
pub struct FrameScheduler {
    interval: Interval,
    period: Duration,
    ticks: u64,
}

impl FrameScheduler {
    /// Create a scheduler targeting `fps` frames per second.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(fps: u32) -> Self {
        let period = Duration::from_nanos(1_000_000_000 / fps.max(1) as u64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            interval,
            period,
            ticks: 0,
        }
    }

    /// Wait for the next frame tick. Returns the number of ticks fired
    /// before this one. The first tick completes immediately.
    pub async fn tick(&mut self) -> u64 {
        self.interval.tick().await;
        let index = self.ticks;
        self.ticks += 1;
        index
    }

    /// Target interval between ticks.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Ticks fired so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = RecordingClock::start();
        assert!(clock.elapsed_ns() < 1_000_000_000);
    }

    #[test]
    fn test_ns_to_secs_conversion() {
        assert!((RecordingClock::ns_to_secs(1_500_000_000) - 1.5).abs() < 1e-9);
        assert_eq!(RecordingClock::secs_to_ns(2.0), 2_000_000_000);
    }

    #[test]
    fn test_frame_time_is_index_derived() {
        assert!((frame_time_secs(0, 30) - 0.0).abs() < 1e-12);
        assert!((frame_time_secs(90, 30) - 3.0).abs() < 1e-12);
        // 10k frames at 30fps should land exactly, unlike repeated addition.
        assert!((frame_time_secs(10_000, 30) - 10_000.0 / 30.0).abs() < 1e-9);
        assert!((frame_interval_secs(25) - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_drift_measurement() {
        let drift = DriftMeasurement {
            reference_ns: 1_000_000_000,
            measured_ns: 1_050_000_000,
        };
        assert_eq!(drift.drift_ns(), 50_000_000);
        assert!((drift.drift_ms() - 50.0).abs() < 1e-9);
        assert!(drift.exceeds_threshold_ms(10.0));
        assert!(!drift.exceeds_threshold_ms(100.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_ticks_at_cadence() {
        let clock = RecordingClock::start();
        let mut scheduler = FrameScheduler::new(30);
        for expected in 0..31 {
            assert_eq!(scheduler.tick().await, expected);
        }
        // 31 ticks, the first immediate: 30 periods elapsed.
        let elapsed = clock.elapsed_secs();
        assert!((elapsed - 30.0 * scheduler.period().as_secs_f64()).abs() < 1e-6);
        assert_eq!(scheduler.ticks(), 31);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_after() {
        let clock = RecordingClock::start();
        tokio::time::sleep_until(clock.deadline_after(2.5)).await;
        assert!((clock.elapsed_secs() - 2.5).abs() < 1e-6);
    }
}
