//! Pipeline orchestration
//!
//! This module provides the public API for Wellness Labs.
//! It drives a lab from capture frames to metric snapshots and exposes
//! one-shot helpers for batch analysis.

use crate::cognition::{SessionSummary, TestType, Trial};
use crate::error::LabError;
use crate::frequency;
use crate::pitch::{self, PitchEstimate};
use crate::resource::{ResourceLease, SharedResource};
use crate::types::{TimedSample, TremorMetrics};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A per-frame processor driven by a [`FrameLoop`]
pub trait Lab {
    /// Capture collaborator the lab reads from (landmark model, microphone)
    type Capture;
    /// One capture frame
    type Input;
    /// Read-only snapshot handed to the presentation layer
    type Metrics: Clone;

    fn name(&self) -> &'static str;

    /// Process one frame. On error the lab state must be unchanged.
    fn step(&mut self, capture: &Self::Capture, input: &Self::Input)
        -> Result<Self::Metrics, LabError>;

    fn snapshot(&self) -> Self::Metrics;

    /// Return to the initial state
    fn reset(&mut self);

    /// Called when the loop stops; cancel anything pending
    fn stop(&mut self) {}
}

/// Externally visible state of a running lab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum LabStatus {
    Idle,
    Running,
    /// Last frame failed; the loop keeps going
    TransientError(String),
    Stopped,
    /// Capture could not start or broke; the lab is back in its initial state
    CaptureFailed(String),
}

/// Frame loop with an explicit active guard.
///
/// Frames are processed only while a capture lease is held. Frames delivered
/// after [`FrameLoop::stop`] are ignored.
pub struct FrameLoop<L: Lab> {
    lab: L,
    lease: Option<ResourceLease<L::Capture>>,
    status: LabStatus,
    frames_processed: u64,
    frames_failed: u64,
}

impl<L: Lab> FrameLoop<L> {
    pub fn new(lab: L) -> Self {
        Self {
            lab,
            lease: None,
            status: LabStatus::Idle,
            frames_processed: 0,
            frames_failed: 0,
        }
    }

    /// Acquire the capture resource and begin accepting frames.
    ///
    /// On failure the lab is reset and the status records the cause.
    pub fn start(&mut self, capture: &SharedResource<L::Capture>) -> Result<(), LabError> {
        if self.lease.is_some() {
            return Ok(());
        }
        match capture.acquire() {
            Ok(lease) => {
                self.lease = Some(lease);
                self.status = LabStatus::Running;
                info!(lab = self.lab.name(), "lab started");
                Ok(())
            }
            Err(e) => {
                self.fail_capture(&e);
                Err(e)
            }
        }
    }

    /// Process one frame; `None` when inactive or when the frame failed.
    ///
    /// Per-frame errors are logged and recorded in the status; the loop
    /// stays active.
    pub fn on_frame(&mut self, input: &L::Input) -> Option<L::Metrics> {
        let lease = self.lease.as_ref()?;

        match self.lab.step(lease.get(), input) {
            Ok(metrics) => {
                self.frames_processed += 1;
                self.status = LabStatus::Running;
                Some(metrics)
            }
            Err(e) => {
                self.frames_failed += 1;
                warn!(lab = self.lab.name(), error = %e, "frame processing failed");
                self.status = LabStatus::TransientError(e.to_string());
                None
            }
        }
    }

    /// Report a capture-layer failure (permission revoked, device lost).
    pub fn on_capture_error(&mut self, err: &LabError) {
        self.fail_capture(err);
    }

    fn fail_capture(&mut self, err: &LabError) {
        warn!(lab = self.lab.name(), error = %err, "capture failed");
        self.lab.stop();
        self.lease = None;
        self.lab.reset();
        self.status = LabStatus::CaptureFailed(err.to_string());
    }

    /// Stop accepting frames and release the capture resource
    pub fn stop(&mut self) {
        if self.lease.take().is_some() {
            self.lab.stop();
            self.status = LabStatus::Stopped;
            info!(
                lab = self.lab.name(),
                processed = self.frames_processed,
                failed = self.frames_failed,
                "lab stopped"
            );
        }
    }

    pub fn is_active(&self) -> bool {
        self.lease.is_some()
    }

    pub fn status(&self) -> &LabStatus {
        &self.status
    }

    pub fn snapshot(&self) -> L::Metrics {
        self.lab.snapshot()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn frames_failed(&self) -> u64 {
        self.frames_failed
    }

    pub fn lab(&self) -> &L {
        &self.lab
    }

    pub fn lab_mut(&mut self) -> &mut L {
        &mut self.lab
    }
}

/// Parse NDJSON (newline-delimited JSON) frames or events, skipping blank lines
pub fn parse_ndjson<T: DeserializeOwned>(ndjson: &str) -> Result<Vec<T>, LabError> {
    let mut records = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                return Err(LabError::ParseError(format!(
                    "Failed to parse line {}: {}",
                    line_num + 1,
                    e
                )));
            }
        }
    }
    Ok(records)
}

/// Analyze a tremor window in one call.
///
/// # Arguments
/// * `samples_json` - JSON array of `{ "t": ms, "y": value }` in time order
/// * `reference_scale` - Vertical extent used to normalize amplitude
///
/// # Returns
/// JSON-encoded [`TremorMetrics`]
pub fn analyze_tremor(samples_json: &str, reference_scale: f64) -> Result<String, LabError> {
    let samples: Vec<TimedSample> = serde_json::from_str(samples_json)?;
    let metrics: TremorMetrics = frequency::analyze(&samples, reference_scale);
    Ok(serde_json::to_string(&metrics)?)
}

/// Estimate pitch and loudness of a single audio block.
///
/// # Example
/// ```ignore
/// let estimate = estimate_voice(&samples, 44100.0);
/// ```
pub fn estimate_voice(samples: &[f32], sample_rate: f64) -> PitchEstimate {
    pitch::estimate(samples, sample_rate)
}

/// Summarize a finished list of trials.
///
/// # Arguments
/// * `test_type` - Which cognitive test produced the trials
/// * `trials_json` - JSON array of resolved trials
///
/// # Returns
/// JSON-encoded [`SessionSummary`]
pub fn score_trials(test_type: TestType, trials_json: &str) -> Result<String, LabError> {
    let trials: Vec<Trial> = serde_json::from_str(trials_json)?;
    let summary = SessionSummary::from_trials(test_type, &trials);
    Ok(serde_json::to_string(&summary)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::MotorLab;
    use crate::types::{LandmarkFrame, LandmarkModel, Point2};
    use pretty_assertions::assert_eq;

    fn hand_model() -> SharedResource<LandmarkModel> {
        SharedResource::new("hand_landmarker", || Ok(LandmarkModel::hand()))
    }

    fn frame(t: f64, points: usize) -> LandmarkFrame {
        LandmarkFrame {
            timestamp_ms: t,
            width: 640.0,
            height: 480.0,
            points: Some(vec![Point2 { x: 0.5, y: 0.5 }; points]),
        }
    }

    #[test]
    fn test_frames_ignored_until_started_and_after_stop() {
        let model = hand_model();
        let mut frame_loop = FrameLoop::new(MotorLab::default());

        assert!(frame_loop.on_frame(&frame(0.0, 21)).is_none());
        assert_eq!(frame_loop.status(), &LabStatus::Idle);

        frame_loop.start(&model).unwrap();
        assert!(frame_loop.on_frame(&frame(10.0, 21)).is_some());
        assert_eq!(model.lease_count(), 1);

        frame_loop.stop();
        assert!(frame_loop.on_frame(&frame(20.0, 21)).is_none());
        assert_eq!(frame_loop.status(), &LabStatus::Stopped);
        assert_eq!(frame_loop.frames_processed(), 1);
        assert!(!model.is_initialized());
    }

    #[test]
    fn test_frame_error_keeps_loop_running() {
        let model = hand_model();
        let mut frame_loop = FrameLoop::new(MotorLab::default());
        frame_loop.start(&model).unwrap();

        assert!(frame_loop.on_frame(&frame(0.0, 3)).is_none());
        assert!(matches!(frame_loop.status(), LabStatus::TransientError(_)));
        assert!(frame_loop.is_active());

        assert!(frame_loop.on_frame(&frame(33.0, 21)).is_some());
        assert_eq!(frame_loop.status(), &LabStatus::Running);
        assert_eq!(frame_loop.frames_failed(), 1);
    }

    #[test]
    fn test_capture_failure_resets_lab() {
        let denied: SharedResource<LandmarkModel> = SharedResource::new("camera", || {
            Err(LabError::PermissionDenied("camera".to_string()))
        });
        let mut frame_loop = FrameLoop::new(MotorLab::default());

        assert!(frame_loop.start(&denied).is_err());
        assert!(matches!(frame_loop.status(), LabStatus::CaptureFailed(_)));
        assert!(!frame_loop.is_active());

        let model = hand_model();
        frame_loop.start(&model).unwrap();
        frame_loop.on_frame(&frame(0.0, 21));
        frame_loop.on_capture_error(&LabError::DeviceUnavailable("unplugged".to_string()));

        assert_eq!(frame_loop.snapshot(), Default::default());
        assert_eq!(model.lease_count(), 0);
    }

    #[test]
    fn test_analyze_tremor_json() {
        let samples: Vec<TimedSample> = (0..30)
            .map(|i| TimedSample::new(i as f64 * 100.0, if i % 2 == 0 { 1.0 } else { -1.0 }))
            .collect();
        let json = serde_json::to_string(&samples).unwrap();

        let out = analyze_tremor(&json, 10.0).unwrap();
        let metrics: TremorMetrics = serde_json::from_str(&out).unwrap();

        assert!((metrics.amplitude_normalized - 0.1).abs() < 1e-9);
        assert!(analyze_tremor("not json", 10.0).is_err());
    }

    #[test]
    fn test_score_trials_json() {
        let trials = r#"[
            { "index": 0, "stimulus": { "kind": "go" }, "is_target": true,
              "response": "press", "reaction_time_ms": 420.0, "outcome": "hit" },
            { "index": 1, "stimulus": { "kind": "no_go" }, "is_target": false,
              "response": "press", "reaction_time_ms": 300.0, "outcome": "false_alarm" }
        ]"#;
        let out = score_trials(TestType::GoNoGo, trials).unwrap();
        let summary: SessionSummary = serde_json::from_str(&out).unwrap();

        assert_eq!(summary.hit_count, 1);
        assert_eq!(summary.false_alarm_count, 1);
        assert_eq!(summary.accuracy_percent, 50.0);
        assert_eq!(summary.average_reaction_time, Some(420.0));
    }

    #[test]
    fn test_estimate_voice_silence() {
        let estimate = estimate_voice(&[0.0; 1024], 16000.0);
        assert_eq!(estimate.fundamental_hz, None);
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let input = "{\"t\": 0.0, \"y\": 1.0}\n\n{\"t\": 1.0, \"y\": 2.0}\n";
        let samples: Vec<TimedSample> = parse_ndjson(input).unwrap();
        assert_eq!(samples.len(), 2);

        let err = parse_ndjson::<TimedSample>("{\"t\": 0.0, \"y\": 1.0}\n{oops").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
