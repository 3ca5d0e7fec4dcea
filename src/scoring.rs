//! Score derivation
//!
//! Deterministic formulas turning already-computed signals into bounded
//! 0-100 scores, plus the signal-detection d-prime index.

use crate::frequency::population_std;
use serde::{Deserialize, Serialize};

/// Rhythm regularity from inter-tap intervals.
///
/// Formula: `round(clamp(100 / (1 + cv), 0, 100))` where `cv = std / mean`.
/// Returns 0 for one or zero intervals, or when the mean interval is 0.
pub fn coordination_score(intervals: &[f64]) -> f64 {
    if intervals.len() <= 1 {
        return 0.0;
    }

    let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
    if mean == 0.0 {
        return 0.0;
    }

    let cv = population_std(intervals) / mean;
    (100.0 / (1.0 + cv)).clamp(0.0, 100.0).round()
}

/// Combined movement quality
///
/// Formula:
/// ```text
/// tremor_penalty = min(100, amplitude * 300 * 100) / 100
/// quality        = round(clamp(coordination * 0.7 + (100 - tremor_penalty) * 0.3, 0, 100))
/// ```
pub fn movement_quality(coordination: f64, tremor_amplitude_normalized: f64) -> f64 {
    let tremor_penalty = (tremor_amplitude_normalized * 300.0 * 100.0).min(100.0) / 100.0;
    (coordination * 0.7 + (100.0 - tremor_penalty) * 0.3)
        .clamp(0.0, 100.0)
        .round()
}

/// Signal detection sensitivity index, rounded to 2 decimals.
///
/// Hit and false-alarm rates default to 0.5 when their denominators are empty
/// and are kept `1/(2·total_trials)` away from 0 and 1 before the probit
/// transform.
pub fn d_prime(
    hits: u32,
    misses: u32,
    false_alarms: u32,
    correct_rejections: u32,
    total_trials: u32,
) -> f64 {
    let mut hit_rate = rate(hits, misses);
    let mut false_alarm_rate = rate(false_alarms, correct_rejections);

    if total_trials > 0 {
        let correction = 1.0 / (2.0 * total_trials as f64);
        hit_rate = hit_rate.clamp(correction, 1.0 - correction);
        false_alarm_rate = false_alarm_rate.clamp(correction, 1.0 - correction);
    }

    let value = inverse_normal_cdf(hit_rate) - inverse_normal_cdf(false_alarm_rate);
    (value * 100.0).round() / 100.0
}

fn rate(numerator: u32, other: u32) -> f64 {
    let denominator = numerator + other;
    if denominator == 0 {
        0.5
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Inverse of the standard normal CDF (Acklam's rational approximation).
///
/// Relative error below 1.15e-9 on (0, 1). Returns ±infinity at the bounds.
pub fn inverse_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.02425;
    const P_HIGH: f64 = 1.0 - P_LOW;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= P_HIGH {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

/// Thresholds for the voice quality risk accumulation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceQualityThresholds {
    /// RMS below this adds 0.4 risk
    pub rms_low: f64,
    /// RMS below this (but not below `rms_low`) adds 0.2 risk
    pub rms_moderate: f64,
    /// Jitter above this adds 0.4 risk
    pub jitter_high: f64,
    /// Jitter above this (but not above `jitter_high`) adds 0.3 risk
    pub jitter_moderate: f64,
}

impl Default for VoiceQualityThresholds {
    fn default() -> Self {
        Self {
            rms_low: 0.01,
            rms_moderate: 0.03,
            jitter_high: 1.0,
            jitter_moderate: 0.5,
        }
    }
}

/// Voice quality score (0-100) from weighted risk accumulation
///
/// Formula:
/// ```text
/// risk = [0.4 | 0.2 by RMS] + [0.4 | 0.3 by jitter] + [0.3 if no pitch]
/// quality = round((1 - min(risk, 1)) * 100)
/// ```
pub fn voice_quality(
    rms: f64,
    jitter: Option<f64>,
    pitch_detected: bool,
    thresholds: &VoiceQualityThresholds,
) -> f64 {
    let mut risk: f64 = 0.0;

    if rms < thresholds.rms_low {
        risk += 0.4;
    } else if rms < thresholds.rms_moderate {
        risk += 0.2;
    }

    if let Some(jitter) = jitter {
        if jitter > thresholds.jitter_high {
            risk += 0.4;
        } else if jitter > thresholds.jitter_moderate {
            risk += 0.3;
        }
    }

    if !pitch_detected {
        risk += 0.3;
    }

    ((1.0 - risk.min(1.0)) * 100.0).round()
}
