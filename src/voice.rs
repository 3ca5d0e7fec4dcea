//! Voice lab
//!
//! Per-frame pitch, loudness, jitter and quality, plus a timed recording
//! session that aggregates frames into a [`VoiceSessionSummary`].
//!
//! Missing values are never invented: when no pitch is found, or too little
//! history exists for jitter, the field stays `None` and a [`QualityFlag`]
//! says why.

use crate::buffer::RollingBuffer;
use crate::config::VoiceConfig;
use crate::error::LabError;
use crate::frequency::population_std;
use crate::pipeline::Lab;
use crate::pitch::{self, SILENCE_RMS};
use crate::scoring::voice_quality;
use crate::timer::{TimerQueue, TimerToken};
use crate::types::{AudioFrame, Microphone, Millis, QualityFlag, VoiceMetrics};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Relative jitter of a pitch sequence.
///
/// Mean absolute difference between consecutive values normalizes the
/// population std of those differences: `std(|Δf|) / mean(|Δf|)`. Returns 0
/// when the mean difference is 0 and `None` for fewer than two values.
pub fn relative_jitter(pitches: &[f64]) -> Option<f64> {
    if pitches.len() < 2 {
        return None;
    }
    let deltas: Vec<f64> = pitches.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
    if mean == 0.0 {
        return Some(0.0);
    }
    Some(population_std(&deltas) / mean)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceTimer {
    Recording,
}

/// Aggregate of one recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSessionSummary {
    pub started_at_ms: Millis,
    pub duration_ms: f64,
    pub frames: u32,
    /// Frames with an accepted pitch
    pub voiced_frames: u32,
    pub mean_pitch_hz: Option<f64>,
    pub mean_rms: f64,
    pub jitter_relative: Option<f64>,
    pub quality_score: f64,
    pub quality_flags: Vec<QualityFlag>,
}

#[derive(Debug, Clone)]
struct Recording {
    started_at: Millis,
    frames: u32,
    rms_sum: f64,
    pitches: Vec<f64>,
}

/// Pitch/loudness processor with an optional timed recording
#[derive(Debug, Clone)]
pub struct VoiceLab {
    config: VoiceConfig,
    pitch_history: RollingBuffer<f64>,
    metrics: VoiceMetrics,
    timers: TimerQueue<VoiceTimer>,
    recording: Option<Recording>,
}

impl Default for VoiceLab {
    fn default() -> Self {
        Self::new(VoiceConfig::default())
    }
}

impl VoiceLab {
    pub fn new(config: VoiceConfig) -> Self {
        Self {
            pitch_history: RollingBuffer::new(config.pitch_history_capacity),
            metrics: VoiceMetrics::default(),
            timers: TimerQueue::new(),
            recording: None,
            config,
        }
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    /// Process one audio frame
    pub fn process(
        &mut self,
        mic: &Microphone,
        frame: &AudioFrame,
    ) -> Result<VoiceMetrics, LabError> {
        validate(mic, frame)?;

        let estimate = pitch::estimate(&frame.samples, frame.sample_rate);
        let mut flags = Vec::new();
        if estimate.rms < SILENCE_RMS {
            flags.push(QualityFlag::Silence);
        }

        let accepted = match estimate.fundamental_hz {
            Some(hz) if hz >= self.config.min_pitch_hz && hz <= self.config.max_pitch_hz => {
                Some(hz)
            }
            Some(hz) => {
                debug!(hz, "pitch outside plausible band");
                flags.push(QualityFlag::PitchOutOfRange);
                None
            }
            None => {
                flags.push(QualityFlag::NoPitch);
                None
            }
        };

        if let Some(hz) = accepted {
            self.pitch_history.push(hz);
        }

        let jitter = if self.pitch_history.len() >= self.config.min_jitter_history {
            relative_jitter(&self.pitch_history.snapshot())
        } else {
            flags.push(QualityFlag::InsufficientPitchHistory);
            None
        };

        if let Some(recording) = self.recording.as_mut() {
            recording.frames += 1;
            recording.rms_sum += estimate.rms;
            recording.pitches.extend(accepted);
        }

        self.metrics = VoiceMetrics {
            pitch_hz: accepted,
            pitch_source: estimate.source,
            loudness_rms: estimate.rms,
            jitter_relative: jitter,
            quality_score: voice_quality(
                estimate.rms,
                jitter,
                accepted.is_some(),
                &self.config.quality,
            ),
            quality_flags: flags,
        };

        Ok(self.metrics.clone())
    }

    /// Begin a recording session that ends after `duration_ms` (the
    /// configured length when `None`). Restarting discards the previous one.
    pub fn start_recording(
        &mut self,
        now: Millis,
        duration_ms: Option<f64>,
    ) -> TimerToken<VoiceTimer> {
        let duration = duration_ms.unwrap_or(self.config.recording_duration_ms);
        self.recording = Some(Recording {
            started_at: now,
            frames: 0,
            rms_sum: 0.0,
            pitches: Vec::new(),
        });
        info!(duration_ms = duration, "recording started");
        self.timers.arm(VoiceTimer::Recording, now + duration)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Fire due timers; returns the summary when the recording elapsed
    pub fn tick(&mut self, now: Millis) -> Option<VoiceSessionSummary> {
        let mut finished = None;
        while let Some((token, due_at)) = self.timers.pop_due(now) {
            match token.role {
                VoiceTimer::Recording => finished = self.finish_recording(due_at),
            }
        }
        finished
    }

    /// End the recording early
    pub fn stop_recording(&mut self, now: Millis) -> Option<VoiceSessionSummary> {
        self.timers.cancel(VoiceTimer::Recording);
        self.finish_recording(now)
    }

    fn finish_recording(&mut self, ended_at: Millis) -> Option<VoiceSessionSummary> {
        let recording = self.recording.take()?;

        let voiced = recording.pitches.len() as u32;
        let mean_pitch_hz =
            (voiced > 0).then(|| recording.pitches.iter().sum::<f64>() / voiced as f64);
        let mean_rms = if recording.frames > 0 {
            recording.rms_sum / recording.frames as f64
        } else {
            0.0
        };

        let mut flags = Vec::new();
        if recording.frames == 0 {
            flags.push(QualityFlag::InsufficientSamples);
        } else if mean_rms < SILENCE_RMS {
            flags.push(QualityFlag::Silence);
        }
        if voiced == 0 {
            flags.push(QualityFlag::NoPitch);
        }
        let jitter = if recording.pitches.len() >= self.config.min_jitter_history {
            relative_jitter(&recording.pitches)
        } else {
            flags.push(QualityFlag::InsufficientPitchHistory);
            None
        };

        let summary = VoiceSessionSummary {
            started_at_ms: recording.started_at,
            duration_ms: ended_at - recording.started_at,
            frames: recording.frames,
            voiced_frames: voiced,
            mean_pitch_hz,
            mean_rms,
            jitter_relative: jitter,
            quality_score: voice_quality(mean_rms, jitter, voiced > 0, &self.config.quality),
            quality_flags: flags,
        };
        info!(
            frames = summary.frames,
            voiced = summary.voiced_frames,
            quality = summary.quality_score,
            "recording finished"
        );
        Some(summary)
    }

    pub fn snapshot(&self) -> VoiceMetrics {
        self.metrics.clone()
    }

    /// Accepted pitch values, oldest first
    pub fn pitch_history(&self) -> Vec<f64> {
        self.pitch_history.snapshot()
    }

    pub fn reset(&mut self) {
        self.timers.cancel_all();
        self.recording = None;
        self.pitch_history.clear();
        self.metrics = VoiceMetrics::default();
    }
}

fn validate(mic: &Microphone, frame: &AudioFrame) -> Result<(), LabError> {
    if frame.samples.is_empty() {
        return Err(LabError::MalformedFrame("audio frame has no samples".to_string()));
    }
    if !(frame.sample_rate > 0.0 && frame.sample_rate.is_finite()) {
        return Err(LabError::MalformedFrame(format!(
            "sample rate {} is not positive",
            frame.sample_rate
        )));
    }
    if frame.sample_rate != mic.sample_rate {
        return Err(LabError::MalformedFrame(format!(
            "frame sample rate {} does not match {} ({})",
            frame.sample_rate, mic.device_id, mic.sample_rate
        )));
    }
    if frame.samples.iter().any(|s| !s.is_finite()) {
        return Err(LabError::MalformedFrame("audio frame has non-finite samples".to_string()));
    }
    Ok(())
}

impl Lab for VoiceLab {
    type Capture = Microphone;
    type Input = AudioFrame;
    type Metrics = VoiceMetrics;

    fn name(&self) -> &'static str {
        "voice"
    }

    fn step(&mut self, capture: &Microphone, input: &AudioFrame) -> Result<VoiceMetrics, LabError> {
        self.process(capture, input)
    }

    fn snapshot(&self) -> VoiceMetrics {
        VoiceLab::snapshot(self)
    }

    fn reset(&mut self) {
        VoiceLab::reset(self);
    }

    fn stop(&mut self) {
        self.timers.cancel_all();
        self.recording = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PitchSource;
    use pretty_assertions::assert_eq;
    use std::f64::consts::PI;

    const RATE: f64 = 44100.0;

    fn tone(t: f64, freq_hz: f64, amplitude: f32) -> AudioFrame {
        AudioFrame {
            timestamp_ms: t,
            sample_rate: RATE,
            samples: (0..2048)
                .map(|i| amplitude * (2.0 * PI * freq_hz * i as f64 / RATE).sin() as f32)
                .collect(),
        }
    }

    fn mic() -> Microphone {
        Microphone::new("default", RATE)
    }

    #[test]
    fn test_relative_jitter() {
        assert_eq!(relative_jitter(&[200.0]), None);
        // constant step
        assert_eq!(relative_jitter(&[200.0, 210.0, 200.0, 210.0]), Some(0.0));
        assert_eq!(relative_jitter(&[200.0, 200.0, 200.0]), Some(0.0));
        // deltas 10, 30 -> mean 20, std 10
        assert_eq!(relative_jitter(&[200.0, 210.0, 240.0]), Some(0.5));
    }

    #[test]
    fn test_steady_tone_scores_high() {
        let mut lab = VoiceLab::default();

        let first = lab.process(&mic(), &tone(0.0, 220.0, 0.5)).unwrap();
        assert!(first.jitter_relative.is_none());
        assert!(first.quality_flags.contains(&QualityFlag::InsufficientPitchHistory));

        let mut metrics = first;
        for i in 1..12 {
            metrics = lab.process(&mic(), &tone(i as f64 * 46.0, 220.0, 0.5)).unwrap();
        }

        assert!((metrics.pitch_hz.unwrap() - 220.0).abs() < 2.0);
        assert_eq!(metrics.pitch_source, PitchSource::Autocorrelation);
        assert_eq!(metrics.jitter_relative, Some(0.0));
        assert_eq!(metrics.quality_score, 100.0);
        assert!(metrics.quality_flags.is_empty());
    }

    #[test]
    fn test_silence_is_flagged_not_fabricated() {
        let mut lab = VoiceLab::default();
        let frame = AudioFrame {
            timestamp_ms: 0.0,
            sample_rate: RATE,
            samples: vec![0.0; 2048],
        };
        let metrics = lab.process(&mic(), &frame).unwrap();

        assert_eq!(metrics.pitch_hz, None);
        assert_eq!(metrics.loudness_rms, 0.0);
        assert!(metrics.quality_flags.contains(&QualityFlag::Silence));
        assert!(metrics.quality_flags.contains(&QualityFlag::NoPitch));
        // 0.4 (rms) + 0.3 (no pitch)
        assert_eq!(metrics.quality_score, 30.0);
        assert!(lab.pitch_history().is_empty());
    }

    #[test]
    fn test_malformed_frames_rejected() {
        let mut lab = VoiceLab::default();
        let mut frame = tone(0.0, 220.0, 0.5);
        frame.sample_rate = 48000.0;
        assert!(matches!(lab.process(&mic(), &frame), Err(LabError::MalformedFrame(_))));

        let empty = AudioFrame {
            timestamp_ms: 0.0,
            sample_rate: RATE,
            samples: Vec::new(),
        };
        assert!(lab.process(&mic(), &empty).is_err());
        assert_eq!(lab.snapshot(), VoiceMetrics::default());
    }

    #[test]
    fn test_recording_session_elapses() {
        let mut lab = VoiceLab::default();
        lab.start_recording(0.0, Some(1000.0));

        for i in 0..20 {
            lab.process(&mic(), &tone(i as f64 * 46.0, 220.0, 0.5)).unwrap();
            assert!(lab.tick(i as f64 * 46.0).is_none());
        }

        let summary = lab.tick(1000.0).unwrap();
        assert!(!lab.is_recording());
        assert_eq!(summary.frames, 20);
        assert_eq!(summary.voiced_frames, 20);
        assert_eq!(summary.duration_ms, 1000.0);
        assert!((summary.mean_pitch_hz.unwrap() - 220.0).abs() < 2.0);
        assert_eq!(summary.quality_score, 100.0);

        // frames after the session do not reopen it
        lab.process(&mic(), &tone(1100.0, 220.0, 0.5)).unwrap();
        assert!(lab.tick(5000.0).is_none());
    }

    #[test]
    fn test_stop_recording_early_and_reset_cancels_timer() {
        let mut lab = VoiceLab::default();
        lab.start_recording(0.0, None);
        let summary = lab.stop_recording(200.0).unwrap();

        assert_eq!(summary.frames, 0);
        assert_eq!(summary.duration_ms, 200.0);
        assert!(summary.quality_flags.contains(&QualityFlag::InsufficientSamples));
        assert!(lab.tick(20_000.0).is_none());

        lab.start_recording(0.0, None);
        lab.reset();
        assert!(lab.tick(20_000.0).is_none());
        assert!(lab.stop_recording(20_000.0).is_none());
    }
}
