//! Core types for the Wellness Labs pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: capture-layer frames, timestamped samples, derived events and the
//! metric snapshots handed to the presentation layer.

use serde::{Deserialize, Serialize};

/// Milliseconds on the capture clock (camera/audio/performance timer)
pub type Millis = f64;

/// One measurement in a rolling window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedSample {
    /// Capture timestamp (ms)
    pub t: Millis,
    /// Scalar measurement
    pub y: f64,
}

impl TimedSample {
    pub fn new(t: Millis, y: f64) -> Self {
        Self { t, y }
    }
}

/// A detected tap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TapEvent {
    /// When the tap fired (ms)
    pub timestamp: Millis,
    /// Time since the previous tap, 0 for the first tap (ms)
    pub interval_since_last_ms: f64,
}

/// Normalized landmark coordinate, x and y in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

/// Per-frame output of the external hand landmark model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandmarkFrame {
    /// Frame timestamp (ms)
    pub timestamp_ms: Millis,
    /// Frame width (px)
    pub width: f64,
    /// Frame height (px)
    pub height: f64,
    /// Tracked hand points, `None` when no hand was detected in this frame
    #[serde(default)]
    pub points: Option<Vec<Point2>>,
}

/// Properties of the loaded hand landmark model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkModel {
    pub name: String,
    /// Points emitted per detected hand
    pub landmark_count: usize,
}

impl LandmarkModel {
    /// 21-point hand model (wrist, 4 per finger)
    pub fn hand() -> Self {
        Self {
            name: "hand_landmarker".to_string(),
            landmark_count: 21,
        }
    }
}

/// Properties of the open microphone stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Microphone {
    pub device_id: String,
    /// Stream sample rate (Hz)
    pub sample_rate: f64,
}

impl Microphone {
    pub fn new(device_id: &str, sample_rate: f64) -> Self {
        Self {
            device_id: device_id.to_string(),
            sample_rate,
        }
    }
}

/// Per-frame raw audio block from the capture layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFrame {
    /// Frame timestamp (ms)
    pub timestamp_ms: Millis,
    /// Audio sample rate (Hz)
    pub sample_rate: f64,
    /// Raw samples, nominally in [-1, 1]
    pub samples: Vec<f32>,
}

/// Tremor estimate derived from a window of position samples
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TremorMetrics {
    /// Population std of the samples divided by the reference scale
    pub amplitude_normalized: f64,
    /// Dominant oscillation frequency (Hz)
    pub dominant_frequency_hz: f64,
}

/// Read-only motor lab snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MotorMetrics {
    pub tap_count: u64,
    /// Taps per minute since the first processed frame
    pub tap_rate_per_min: f64,
    /// Last measured thumb–index distance (px)
    pub last_distance_px: Option<f64>,
    pub tremor: TremorMetrics,
    /// Rhythm regularity score (0-100)
    pub coordination_score: f64,
    /// Combined coordination/tremor score (0-100)
    pub movement_quality: f64,
}

/// Which stage of the pitch estimator produced a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitchSource {
    Autocorrelation,
    SpectralPeak,
    None,
}

/// Read-only voice lab snapshot for one audio frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceMetrics {
    /// Accepted fundamental frequency (Hz)
    pub pitch_hz: Option<f64>,
    pub pitch_source: PitchSource,
    /// RMS of the raw frame
    pub loudness_rms: f64,
    /// Relative jitter, present once enough pitch history exists
    pub jitter_relative: Option<f64>,
    /// Voice quality score (0-100)
    pub quality_score: f64,
    /// Flags for low signal or missing data
    pub quality_flags: Vec<QualityFlag>,
}

impl Default for VoiceMetrics {
    fn default() -> Self {
        Self {
            pitch_hz: None,
            pitch_source: PitchSource::None,
            loudness_rms: 0.0,
            jitter_relative: None,
            quality_score: 0.0,
            quality_flags: Vec::new(),
        }
    }
}

/// Quality flag indicating why a metric is missing or weak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    Silence,
    NoPitch,
    PitchOutOfRange,
    InsufficientPitchHistory,
    InsufficientSamples,
}
