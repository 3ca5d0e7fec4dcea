//! Tap detection
//!
//! Reduces a continuous per-frame distance into discrete tap events with a
//! refractory period, and keeps the inter-tap interval window used for
//! coordination scoring.

use crate::buffer::{RollingBuffer, TAP_INTERVAL_CAPACITY};
use crate::types::{Millis, TapEvent};
use serde::{Deserialize, Serialize};

/// Minimum time between two accepted taps (ms)
pub const DEFAULT_REFRACTORY_MS: f64 = 200.0;

/// Threshold/refractory tap detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapDetector {
    refractory_ms: f64,
    last_event_time: Option<Millis>,
    tap_count: u64,
    intervals: RollingBuffer<f64>,
}

impl Default for TapDetector {
    fn default() -> Self {
        Self::new(DEFAULT_REFRACTORY_MS, TAP_INTERVAL_CAPACITY)
    }
}

impl TapDetector {
    pub fn new(refractory_ms: f64, interval_capacity: usize) -> Self {
        Self {
            refractory_ms,
            last_event_time: None,
            tap_count: 0,
            intervals: RollingBuffer::new(interval_capacity),
        }
    }

    /// Feed one measurement; returns the tap if one fired.
    ///
    /// Fires only when `measurement < threshold_px` and more than the
    /// refractory period has elapsed since the last tap. When nothing fires
    /// the detector state is left untouched.
    pub fn detect(&mut self, measurement: f64, threshold_px: f64, now: Millis) -> Option<TapEvent> {
        if measurement.is_nan() || measurement >= threshold_px {
            return None;
        }

        if let Some(last) = self.last_event_time {
            if now - last <= self.refractory_ms {
                return None;
            }
        }

        let interval = self.last_event_time.map(|last| now - last).unwrap_or(0.0);
        self.last_event_time = Some(now);
        self.intervals.push(interval);
        self.tap_count += 1;

        Some(TapEvent {
            timestamp: now,
            interval_since_last_ms: interval,
        })
    }

    pub fn tap_count(&self) -> u64 {
        self.tap_count
    }

    pub fn last_event_time(&self) -> Option<Millis> {
        self.last_event_time
    }

    /// Ordered copy of the interval window
    pub fn intervals(&self) -> Vec<f64> {
        self.intervals.snapshot()
    }

    pub fn reset(&mut self) {
        self.last_event_time = None;
        self.tap_count = 0;
        self.intervals.clear();
    }
}
