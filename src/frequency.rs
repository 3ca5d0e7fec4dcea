//! Tremor frequency analysis
//!
//! Direct discrete Fourier summation over a bounded window (at most a few
//! hundred samples per frame), so no FFT is needed.

use crate::types::{TimedSample, TremorMetrics};
use std::f64::consts::PI;

/// Fewer samples than this yields a zero result
pub const MIN_SAMPLES: usize = 6;

/// Estimate tremor amplitude and dominant frequency from an ordered window.
///
/// `reference_scale` is the vertical extent of the capture frame; amplitude is
/// the population standard deviation of `y` divided by it.
pub fn analyze(samples: &[TimedSample], reference_scale: f64) -> TremorMetrics {
    let n = samples.len();
    if n < MIN_SAMPLES {
        return TremorMetrics::default();
    }

    let ys: Vec<f64> = samples.iter().map(|s| s.y).collect();
    let amplitude_normalized = if reference_scale > 0.0 {
        population_std(&ys) / reference_scale
    } else {
        0.0
    };

    let duration_ms = samples[n - 1].t - samples[0].t;
    if duration_ms <= 0.0 {
        return TremorMetrics {
            amplitude_normalized,
            dominant_frequency_hz: 0.0,
        };
    }

    let sample_rate = (n - 1) as f64 / (duration_ms / 1000.0);
    let peak = dominant_harmonic(&ys);

    TremorMetrics {
        amplitude_normalized,
        dominant_frequency_hz: peak as f64 * sample_rate / n as f64,
    }
}

/// Harmonic index in `1..=n/2` with the largest DFT magnitude.
///
/// Ties resolve to the lowest index.
fn dominant_harmonic(ys: &[f64]) -> usize {
    let n = ys.len();
    let mut best_k = 0;
    let mut best_magnitude = 0.0;

    for k in 1..=n / 2 {
        let magnitude = harmonic_magnitude(ys, k);
        if magnitude > best_magnitude {
            best_magnitude = magnitude;
            best_k = k;
        }
    }

    best_k
}

fn harmonic_magnitude(ys: &[f64], k: usize) -> f64 {
    let n = ys.len() as f64;
    let (mut re, mut im) = (0.0, 0.0);
    for (j, y) in ys.iter().enumerate() {
        let angle = -2.0 * PI * k as f64 * j as f64 / n;
        re += y * angle.cos();
        im += y * angle.sin();
    }
    (re * re + im * im).sqrt()
}

pub(crate) fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq_hz: f64, sample_rate: f64, count: usize, amplitude: f64) -> Vec<TimedSample> {
        (0..count)
            .map(|i| {
                let t = i as f64 / sample_rate;
                TimedSample::new(t * 1000.0, amplitude * (2.0 * PI * freq_hz * t).sin())
            })
            .collect()
    }

    #[test]
    fn test_short_windows_are_zero() {
        for len in 0..MIN_SAMPLES {
            let samples = sine(3.0, 30.0, len, 10.0);
            assert_eq!(analyze(&samples, 480.0), TremorMetrics::default());
        }
    }

    #[test]
    fn test_zero_duration_has_no_frequency() {
        let samples: Vec<TimedSample> = (0..10)
            .map(|i| TimedSample::new(500.0, i as f64))
            .collect();
        let metrics = analyze(&samples, 100.0);

        assert_eq!(metrics.dominant_frequency_hz, 0.0);
        assert!(metrics.amplitude_normalized > 0.0);
    }

    #[test]
    fn test_three_hz_sine_at_thirty_hz() {
        // 3 seconds at 30Hz
        let samples = sine(3.0, 30.0, 90, 1.0);
        let metrics = analyze(&samples, 1.0);

        assert!((metrics.dominant_frequency_hz - 3.0).abs() < 0.1);
    }

    #[test]
    fn test_amplitude_normalization() {
        let samples = sine(5.0, 30.0, 120, 12.0);
        let metrics = analyze(&samples, 480.0);

        // std of a sine is A / sqrt(2)
        let expected = 12.0 / 2f64.sqrt() / 480.0;
        assert!((metrics.amplitude_normalized - expected).abs() < 1e-3);
    }

    #[test]
    fn test_flat_signal_has_no_dominant_frequency() {
        let samples: Vec<TimedSample> = (0..30)
            .map(|i| TimedSample::new(i as f64 * 33.3, 0.0))
            .collect();
        let metrics = analyze(&samples, 480.0);

        assert_eq!(metrics.amplitude_normalized, 0.0);
        // No magnitude beats zero under strict comparison
        assert_eq!(metrics.dominant_frequency_hz, 0.0);
    }

    #[test]
    fn test_non_positive_scale() {
        let samples = sine(3.0, 30.0, 60, 5.0);
        assert_eq!(analyze(&samples, 0.0).amplitude_normalized, 0.0);
    }
}
