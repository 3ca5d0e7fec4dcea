//! Pitch and loudness estimation
//!
//! Fundamental frequency is found with normalized autocorrelation over the
//! 50-800 Hz lag range. When that gives no confident peak on a non-silent
//! frame, a spectral peak search over 80-800 Hz is used instead.

use crate::types::PitchSource;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

/// Frames with RMS below this are treated as silence
pub const SILENCE_RMS: f64 = 0.001;
/// Minimum normalized autocorrelation for a voiced frame
pub const MIN_CORRELATION: f64 = 0.01;
/// Autocorrelation search band (Hz)
pub const AUTOCORR_MIN_HZ: f64 = 50.0;
pub const AUTOCORR_MAX_HZ: f64 = 800.0;
/// Spectral fallback search band (Hz)
pub const SPECTRAL_MIN_HZ: f64 = 80.0;
pub const SPECTRAL_MAX_HZ: f64 = 800.0;
/// Minimum single-sided bin amplitude accepted by the spectral fallback
pub const MIN_SPECTRAL_MAGNITUDE: f64 = 0.01;

/// Result of analyzing one audio frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchEstimate {
    pub fundamental_hz: Option<f64>,
    pub rms: f64,
    pub source: PitchSource,
    /// Best normalized autocorrelation (0 when silent)
    pub correlation: f64,
}

/// Estimate the fundamental frequency and RMS loudness of a frame
pub fn estimate(frame: &[f32], sample_rate: f64) -> PitchEstimate {
    let rms = rms(frame);
    if rms < SILENCE_RMS || sample_rate <= 0.0 {
        return PitchEstimate {
            fundamental_hz: None,
            rms,
            source: PitchSource::None,
            correlation: 0.0,
        };
    }

    let centered = remove_dc(frame);

    let (best_lag, correlation) = autocorrelation_peak(&centered, sample_rate);
    if correlation >= MIN_CORRELATION && best_lag > 0 {
        return PitchEstimate {
            fundamental_hz: Some(sample_rate / best_lag as f64),
            rms,
            source: PitchSource::Autocorrelation,
            correlation,
        };
    }

    match spectral_peak(&centered, sample_rate) {
        Some(hz) => PitchEstimate {
            fundamental_hz: Some(hz),
            rms,
            source: PitchSource::SpectralPeak,
            correlation,
        },
        None => PitchEstimate {
            fundamental_hz: None,
            rms,
            source: PitchSource::None,
            correlation,
        },
    }
}

/// Root mean square of a raw frame
pub fn rms(frame: &[f32]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / frame.len() as f64).sqrt()
}

fn remove_dc(frame: &[f32]) -> Vec<f64> {
    let mean = frame.iter().map(|&s| s as f64).sum::<f64>() / frame.len() as f64;
    frame.iter().map(|&s| s as f64 - mean).collect()
}

/// Lag with the highest normalized autocorrelation, and that correlation.
///
/// Ties resolve to the shortest lag. Returns `(0, 0.0)` when nothing beats zero.
fn autocorrelation_peak(centered: &[f64], sample_rate: f64) -> (usize, f64) {
    let n = centered.len();
    let energy: f64 = centered.iter().map(|v| v * v).sum();
    if energy <= 0.0 || n < 2 {
        return (0, 0.0);
    }

    let min_lag = ((sample_rate / AUTOCORR_MAX_HZ) as usize).max(1);
    let max_lag = ((sample_rate / AUTOCORR_MIN_HZ) as usize).min(n - 1);

    let mut best_lag = 0;
    let mut best_corr = 0.0;
    for lag in min_lag..=max_lag {
        let sum: f64 = centered[..n - lag]
            .iter()
            .zip(&centered[lag..])
            .map(|(a, b)| a * b)
            .sum();
        let corr = sum / energy;
        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }

    (best_lag, best_corr)
}

/// Frequency of the strongest FFT bin in the 80-800 Hz band.
///
/// Magnitudes are single-sided amplitudes (`2|X_k|/N`); bins at or below
/// [`MIN_SPECTRAL_MAGNITUDE`] are ignored. Ties keep the lowest bin.
pub fn spectral_peak(centered: &[f64], sample_rate: f64) -> Option<f64> {
    let n = centered.len();
    if n < 2 || sample_rate <= 0.0 {
        return None;
    }

    let bin_hz = sample_rate / n as f64;
    let first_bin = ((SPECTRAL_MIN_HZ / bin_hz).ceil() as usize).max(1);
    let last_bin = ((SPECTRAL_MAX_HZ / bin_hz).floor() as usize).min(n / 2);
    if first_bin > last_bin {
        return None;
    }

    let mut spectrum: Vec<Complex<f64>> = centered.iter().map(|&v| Complex::new(v, 0.0)).collect();
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut spectrum);

    let mut best: Option<(usize, f64)> = None;
    for (k, bin) in spectrum.iter().enumerate().take(last_bin + 1).skip(first_bin) {
        let magnitude = 2.0 * bin.norm() / n as f64;
        if magnitude <= MIN_SPECTRAL_MAGNITUDE {
            continue;
        }
        if best.map_or(true, |(_, m)| magnitude > m) {
            best = Some((k, magnitude));
        }
    }

    best.map(|(k, _)| k as f64 * bin_hz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq_hz: f64, sample_rate: f64, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq_hz * i as f64 / sample_rate).sin() as f32)
            .collect()
    }

    #[test]
    fn test_silence_has_no_pitch() {
        let frame = vec![0.0005f32; 2048];
        let estimate = estimate(&frame, 44100.0);

        assert_eq!(estimate.fundamental_hz, None);
        assert_eq!(estimate.source, PitchSource::None);
        assert!((estimate.rms - 0.0005).abs() < 1e-6);
    }

    #[test]
    fn test_empty_frame() {
        let estimate = estimate(&[], 44100.0);
        assert_eq!(estimate.fundamental_hz, None);
        assert_eq!(estimate.rms, 0.0);
    }

    #[test]
    fn test_220hz_sine() {
        let frame = sine(220.0, 44100.0, 2048, 0.5);
        let estimate = estimate(&frame, 44100.0);

        let hz = estimate.fundamental_hz.unwrap();
        assert!((hz - 220.0).abs() < 2.0, "got {hz}");
        assert_eq!(estimate.source, PitchSource::Autocorrelation);
    }

    #[test]
    fn test_dc_offset_is_ignored() {
        let frame: Vec<f32> = sine(330.0, 44100.0, 2048, 0.3)
            .into_iter()
            .map(|s| s + 0.2)
            .collect();
        let hz = estimate(&frame, 44100.0).fundamental_hz.unwrap();

        assert!((hz - 330.0).abs() < 5.0, "got {hz}");
    }

    #[test]
    fn test_rms_of_sine() {
        let frame = sine(440.0, 44100.0, 4410, 1.0);
        assert!((rms(&frame) - 1.0 / 2f64.sqrt()).abs() < 1e-3);
    }

    #[test]
    fn test_spectral_peak_finds_tone() {
        let sample_rate = 8000.0;
        let centered: Vec<f64> = sine(400.0, sample_rate, 1000, 0.5)
            .into_iter()
            .map(|s| s as f64)
            .collect();

        // 8Hz bins, 400Hz sits exactly on bin 50
        let hz = spectral_peak(&centered, sample_rate).unwrap();
        assert!((hz - 400.0).abs() < 1e-6);
    }

    #[test]
    fn test_spectral_peak_rejects_out_of_band_tone() {
        let sample_rate = 8000.0;
        let centered: Vec<f64> = sine(2000.0, sample_rate, 1000, 0.5)
            .into_iter()
            .map(|s| s as f64)
            .collect();

        assert_eq!(spectral_peak(&centered, sample_rate), None);
    }

    #[test]
    fn test_short_frame_falls_back_to_spectral_peak() {
        // two 400Hz cycles at 8kHz: every lag in the 10..=19 window
        // correlates at or below zero, while bin 1 carries the tone
        let sample_rate = 8000.0;
        let frame = sine(400.0, sample_rate, 20, 0.5);
        let estimate = estimate(&frame, sample_rate);

        assert!(estimate.correlation < MIN_CORRELATION);
        assert_eq!(estimate.source, PitchSource::SpectralPeak);
        let hz = estimate.fundamental_hz.unwrap();
        assert!((hz - 400.0).abs() < 1e-6, "got {hz}");
    }

    #[test]
    fn test_spectral_peak_on_long_frame() {
        let sample_rate = 48000.0;
        let centered: Vec<f64> = sine(250.0, sample_rate, 48000, 0.2)
            .into_iter()
            .map(|s| s as f64)
            .collect();

        // 1Hz bins over a full second
        let hz = spectral_peak(&centered, sample_rate).unwrap();
        assert!((hz - 250.0).abs() < 1e-6, "got {hz}");
    }
}
