//! Motor lab
//!
//! Turns per-frame hand landmarks into tap events, tremor and scores. Each
//! frame updates one authoritative [`MotorMetrics`] snapshot; readers get a
//! copy of it.

use crate::buffer::RollingBuffer;
use crate::config::MotorConfig;
use crate::detector::TapDetector;
use crate::error::LabError;
use crate::frequency;
use crate::pipeline::Lab;
use crate::scoring::{coordination_score, movement_quality};
use crate::types::{LandmarkFrame, LandmarkModel, Millis, MotorMetrics, Point2, TimedSample};
use tracing::{debug, trace};

/// Finger-tapping and tremor processor
#[derive(Debug, Clone)]
pub struct MotorLab {
    config: MotorConfig,
    detector: TapDetector,
    tremor_samples: RollingBuffer<TimedSample>,
    first_frame_at: Option<Millis>,
    metrics: MotorMetrics,
}

impl Default for MotorLab {
    fn default() -> Self {
        Self::new(MotorConfig::default())
    }
}

impl MotorLab {
    pub fn new(config: MotorConfig) -> Self {
        Self {
            detector: TapDetector::new(config.refractory_ms, config.interval_capacity),
            tremor_samples: RollingBuffer::new(config.tremor_capacity),
            first_frame_at: None,
            metrics: MotorMetrics::default(),
            config,
        }
    }

    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    /// Process one landmark frame.
    ///
    /// Frames without a hand leave the state untouched and return the previous
    /// snapshot. A malformed frame is rejected before anything is mutated.
    pub fn process(
        &mut self,
        model: &LandmarkModel,
        frame: &LandmarkFrame,
    ) -> Result<MotorMetrics, LabError> {
        let Some(points) = frame.points.as_deref() else {
            trace!(t = frame.timestamp_ms, "no hand in frame");
            return Ok(self.metrics.clone());
        };

        let (thumb, index, tremor_point) = self.validate(model, frame, points)?;

        let t = frame.timestamp_ms;
        let first = *self.first_frame_at.get_or_insert(t);

        let distance =
            ((index.x - thumb.x) * frame.width).hypot((index.y - thumb.y) * frame.height);
        if let Some(tap) = self.detector.detect(distance, self.config.tap_threshold_px, t) {
            debug!(
                t = tap.timestamp,
                interval_ms = tap.interval_since_last_ms,
                "tap detected"
            );
        }

        self.tremor_samples
            .push(TimedSample::new(t, tremor_point.y * frame.height));
        let tremor = frequency::analyze(&self.tremor_samples.snapshot(), frame.height);

        let coordination = coordination_score(&self.detector.intervals());
        let elapsed_min = (t - first) / 60_000.0;
        let tap_count = self.detector.tap_count();

        self.metrics = MotorMetrics {
            tap_count,
            tap_rate_per_min: if elapsed_min > 0.0 {
                tap_count as f64 / elapsed_min
            } else {
                0.0
            },
            last_distance_px: Some(distance),
            tremor,
            coordination_score: coordination,
            movement_quality: movement_quality(coordination, tremor.amplitude_normalized),
        };

        Ok(self.metrics.clone())
    }

    fn validate(
        &self,
        model: &LandmarkModel,
        frame: &LandmarkFrame,
        points: &[Point2],
    ) -> Result<(Point2, Point2, Point2), LabError> {
        if !(frame.width > 0.0 && frame.height > 0.0) {
            return Err(LabError::MalformedFrame(format!(
                "frame size {}x{} is not positive",
                frame.width, frame.height
            )));
        }
        if !frame.timestamp_ms.is_finite() {
            return Err(LabError::MalformedFrame("timestamp is not finite".to_string()));
        }
        if points.len() != model.landmark_count {
            return Err(LabError::MalformedFrame(format!(
                "expected {} landmarks from {}, got {}",
                model.landmark_count,
                model.name,
                points.len()
            )));
        }

        let point = |i: usize| -> Result<Point2, LabError> {
            let p = points.get(i).copied().ok_or_else(|| {
                LabError::MalformedFrame(format!("landmark {i} missing"))
            })?;
            if !(p.x.is_finite() && p.y.is_finite()) {
                return Err(LabError::MalformedFrame(format!("landmark {i} is not finite")));
            }
            Ok(p)
        };

        Ok((
            point(self.config.thumb_tip)?,
            point(self.config.index_tip)?,
            point(self.config.tremor_landmark)?,
        ))
    }

    pub fn snapshot(&self) -> MotorMetrics {
        self.metrics.clone()
    }

    /// Inter-tap intervals currently in the window
    pub fn intervals(&self) -> Vec<f64> {
        self.detector.intervals()
    }

    pub fn reset(&mut self) {
        self.detector.reset();
        self.tremor_samples.clear();
        self.first_frame_at = None;
        self.metrics = MotorMetrics::default();
    }
}

impl Lab for MotorLab {
    type Capture = LandmarkModel;
    type Input = LandmarkFrame;
    type Metrics = MotorMetrics;

    fn name(&self) -> &'static str {
        "motor"
    }

    fn step(
        &mut self,
        capture: &LandmarkModel,
        input: &LandmarkFrame,
    ) -> Result<MotorMetrics, LabError> {
        self.process(capture, input)
    }

    fn snapshot(&self) -> MotorMetrics {
        MotorLab::snapshot(self)
    }

    fn reset(&mut self) {
        MotorLab::reset(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::f64::consts::PI;

    const FPS: f64 = 30.0;

    fn frame(i: usize, pinch: bool, index_y: f64) -> LandmarkFrame {
        let mut points = vec![Point2::default(); 21];
        points[4] = Point2 { x: 0.50, y: 0.50 };
        points[8] = if pinch {
            Point2 { x: 0.51, y: index_y }
        } else {
            Point2 { x: 0.70, y: index_y }
        };
        LandmarkFrame {
            timestamp_ms: i as f64 * 1000.0 / FPS,
            width: 640.0,
            height: 480.0,
            points: Some(points),
        }
    }

    #[test]
    fn test_rhythmic_tapping() {
        let model = LandmarkModel::hand();
        let mut lab = MotorLab::default();

        // pinch held for two frames every 500ms; the second frame is refractory
        for i in 0..90 {
            lab.process(&model, &frame(i, i % 15 < 2, 0.5)).unwrap();
        }
        let metrics = lab.snapshot();

        assert_eq!(metrics.tap_count, 6);
        assert_eq!(lab.intervals().len(), 6);
        assert_eq!(lab.intervals()[0], 0.0);
        assert!((lab.intervals()[1] - 500.0).abs() < 1e-6);
        assert!(metrics.coordination_score > 60.0 && metrics.coordination_score < 80.0);
        // 6 taps over 89 frames (~2.97 s)
        assert!((metrics.tap_rate_per_min - 6.0 / (89.0 / FPS / 60.0)).abs() < 1e-6);
    }

    #[test]
    fn test_tremor_frequency_from_index_tip() {
        let model = LandmarkModel::hand();
        let mut lab = MotorLab::default();

        for i in 0..90 {
            let t = i as f64 / FPS;
            let y = 0.5 + 0.01 * (2.0 * PI * 5.0 * t).sin();
            lab.process(&model, &frame(i, false, y)).unwrap();
        }
        let tremor = lab.snapshot().tremor;

        assert!(
            (tremor.dominant_frequency_hz - 5.0).abs() < 0.5,
            "got {}",
            tremor.dominant_frequency_hz
        );
        // std of a 0.01 sine in normalized units
        assert!((tremor.amplitude_normalized - 0.01 / 2f64.sqrt()).abs() < 1e-3);
    }

    #[test]
    fn test_no_hand_keeps_previous_snapshot() {
        let model = LandmarkModel::hand();
        let mut lab = MotorLab::default();
        let before = lab.process(&model, &frame(0, true, 0.5)).unwrap();

        let mut empty = frame(1, false, 0.5);
        empty.points = None;
        let after = lab.process(&model, &empty).unwrap();

        assert_eq!(before, after);
        assert_eq!(after.tap_count, 1);
    }

    #[test]
    fn test_malformed_frame_leaves_state_untouched() {
        let model = LandmarkModel::hand();
        let mut lab = MotorLab::default();
        lab.process(&model, &frame(0, true, 0.5)).unwrap();
        let before = lab.snapshot();

        let mut short = frame(20, true, 0.5);
        short.points = Some(vec![Point2::default(); 5]);
        assert!(matches!(
            lab.process(&model, &short),
            Err(LabError::MalformedFrame(_))
        ));

        let mut bad = frame(21, true, 0.5);
        bad.height = 0.0;
        assert!(lab.process(&model, &bad).is_err());

        assert_eq!(lab.snapshot(), before);
        assert_eq!(lab.intervals().len(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let model = LandmarkModel::hand();
        let mut lab = MotorLab::default();
        for i in 0..30 {
            lab.process(&model, &frame(i, i % 10 == 0, 0.5)).unwrap();
        }
        lab.reset();

        assert_eq!(lab.snapshot(), MotorMetrics::default());
        assert!(lab.intervals().is_empty());
    }
}
