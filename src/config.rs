//! Lab configuration
//!
//! Every constant the labs rely on, grouped per lab. All sections default
//! independently so a partial JSON file only overrides what it names.

use crate::buffer::{PITCH_HISTORY_CAPACITY, TAP_INTERVAL_CAPACITY, TREMOR_CAPACITY};
use crate::detector::DEFAULT_REFRACTORY_MS;
use crate::error::LabError;
use crate::scoring::VoiceQualityThresholds;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    pub motor: MotorConfig,
    pub voice: VoiceConfig,
    pub cognition: CognitionConfig,
}

/// Motor lab settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    /// Thumb–index distance below which a tap fires (px)
    pub tap_threshold_px: f64,
    /// Minimum time between taps (ms)
    pub refractory_ms: f64,
    pub tremor_capacity: usize,
    pub interval_capacity: usize,
    /// Landmark indices for thumb tip and index fingertip
    pub thumb_tip: usize,
    pub index_tip: usize,
    /// Landmark whose vertical position feeds tremor analysis
    pub tremor_landmark: usize,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            tap_threshold_px: 40.0,
            refractory_ms: DEFAULT_REFRACTORY_MS,
            tremor_capacity: TREMOR_CAPACITY,
            interval_capacity: TAP_INTERVAL_CAPACITY,
            thumb_tip: 4,
            index_tip: 8,
            tremor_landmark: 8,
        }
    }
}

/// Voice lab settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub pitch_history_capacity: usize,
    /// Pitch values needed before jitter is reported
    pub min_jitter_history: usize,
    /// Plausibility band for accepting a pitch into history (Hz)
    pub min_pitch_hz: f64,
    pub max_pitch_hz: f64,
    pub quality: VoiceQualityThresholds,
    /// Default recording length (ms)
    pub recording_duration_ms: f64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            pitch_history_capacity: PITCH_HISTORY_CAPACITY,
            min_jitter_history: 10,
            min_pitch_hz: 50.0,
            max_pitch_hz: 800.0,
            quality: VoiceQualityThresholds::default(),
            recording_duration_ms: 10_000.0,
        }
    }
}

/// Cognition battery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CognitionConfig {
    /// Instruction screen hold before the first trial (ms)
    pub lead_in_ms: f64,
    /// Response window per trial (ms)
    pub trial_timeout_ms: f64,
    /// Blank interval between trials (ms)
    pub inter_trial_ms: f64,
    pub stroop_trials: usize,
    pub n_back_trials: usize,
    pub go_no_go_trials: usize,
    /// Lag for the n-back match task
    pub n_back: usize,
    /// Fraction of eligible n-back positions that are matches
    pub n_back_match_rate: f64,
    /// Fraction of go/no-go trials that are go
    pub go_ratio: f64,
}

impl Default for CognitionConfig {
    fn default() -> Self {
        Self {
            lead_in_ms: 3000.0,
            trial_timeout_ms: 2000.0,
            inter_trial_ms: 500.0,
            stroop_trials: 20,
            n_back_trials: 20,
            go_no_go_trials: 20,
            n_back: 2,
            n_back_match_rate: 0.3,
            go_ratio: 0.75,
        }
    }
}

impl LabConfig {
    /// Load config from file, or defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, LabError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn save(&self, path: &Path) -> Result<(), LabError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Parse and validate
    pub fn from_json(json: &str) -> Result<Self, LabError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, LabError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), LabError> {
        let motor = &self.motor;
        if motor.tap_threshold_px <= 0.0 {
            return Err(invalid("motor.tap_threshold_px must be positive"));
        }
        if motor.refractory_ms < 0.0 {
            return Err(invalid("motor.refractory_ms must not be negative"));
        }
        if motor.tremor_capacity == 0 || motor.interval_capacity == 0 {
            return Err(invalid("motor buffer capacities must be non-zero"));
        }

        let voice = &self.voice;
        if voice.pitch_history_capacity == 0 {
            return Err(invalid("voice.pitch_history_capacity must be non-zero"));
        }
        if voice.min_jitter_history < 2 {
            return Err(invalid("voice.min_jitter_history must be at least 2"));
        }
        if voice.min_pitch_hz <= 0.0 || voice.min_pitch_hz >= voice.max_pitch_hz {
            return Err(invalid("voice pitch band must satisfy 0 < min < max"));
        }
        if voice.recording_duration_ms <= 0.0 {
            return Err(invalid("voice.recording_duration_ms must be positive"));
        }

        let cognition = &self.cognition;
        if cognition.trial_timeout_ms <= 0.0 {
            return Err(invalid("cognition.trial_timeout_ms must be positive"));
        }
        if cognition.lead_in_ms < 0.0 || cognition.inter_trial_ms < 0.0 {
            return Err(invalid("cognition delays must not be negative"));
        }
        if cognition.stroop_trials == 0
            || cognition.n_back_trials == 0
            || cognition.go_no_go_trials == 0
        {
            return Err(invalid("cognition trial counts must be non-zero"));
        }
        if cognition.n_back == 0 || cognition.n_back >= cognition.n_back_trials {
            return Err(invalid("cognition.n_back must be in 1..n_back_trials"));
        }
        if !(0.0..=1.0).contains(&cognition.n_back_match_rate)
            || !(0.0..=1.0).contains(&cognition.go_ratio)
        {
            return Err(invalid("cognition rates must be within [0, 1]"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> LabError {
    LabError::InvalidConfig(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        assert!(LabConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = LabConfig::from_json(r#"{ "motor": { "tap_threshold_px": 25.0 } }"#).unwrap();

        assert_eq!(config.motor.tap_threshold_px, 25.0);
        assert_eq!(config.motor.refractory_ms, 200.0);
        assert_eq!(config.voice, VoiceConfig::default());
        assert_eq!(config.cognition.n_back, 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = LabConfig::from_json(r#"{ "voice": { "min_pitch_hz": 900.0 } }"#);
        assert!(matches!(result, Err(LabError::InvalidConfig(_))));

        let result = LabConfig::from_json(r#"{ "cognition": { "n_back_trials": 0 } }"#);
        assert!(matches!(result, Err(LabError::InvalidConfig(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labs.json");

        assert_eq!(LabConfig::load(&path).unwrap(), LabConfig::default());

        let mut config = LabConfig::default();
        config.cognition.trial_timeout_ms = 1500.0;
        config.save(&path).unwrap();

        assert_eq!(LabConfig::load(&path).unwrap(), config);
    }
}
