//! Session summaries
//!
//! Always recomputed from the full trial list, never accumulated.

use super::types::{Stimulus, TestType, Trial, TrialOutcome};
use crate::scoring::d_prime;
use serde::{Deserialize, Serialize};

/// Aggregate performance for a finished (or partial) session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total_trials: u32,
    /// Mean reaction time of hits (ms)
    pub average_reaction_time: Option<f64>,
    /// `(hits + correct rejections) / total * 100`, rounded
    pub accuracy_percent: f64,
    pub hit_count: u32,
    pub miss_count: u32,
    pub false_alarm_count: u32,
    pub correct_rejection_count: u32,
    /// Sensitivity index; absent for Stroop, which has no non-target trials
    pub d_prime: Option<f64>,
    /// Stroop only: mean incongruent hit RT minus mean congruent hit RT (ms)
    pub interference_ms: Option<f64>,
}

impl SessionSummary {
    pub fn from_trials(test_type: TestType, trials: &[Trial]) -> Self {
        let count =
            |outcome: TrialOutcome| trials.iter().filter(|t| t.outcome == outcome).count() as u32;
        let hits = count(TrialOutcome::Hit);
        let misses = count(TrialOutcome::Miss);
        let false_alarms = count(TrialOutcome::FalseAlarm);
        let correct_rejections = count(TrialOutcome::CorrectRejection);
        let total = trials.len() as u32;

        let accuracy_percent = if total > 0 {
            ((hits + correct_rejections) as f64 / total as f64 * 100.0).round()
        } else {
            0.0
        };

        let d_prime = match test_type {
            TestType::Stroop => None,
            TestType::NBack | TestType::GoNoGo => {
                Some(d_prime(hits, misses, false_alarms, correct_rejections, total))
            }
        };

        let interference_ms = match test_type {
            TestType::Stroop => {
                let incongruent = mean_hit_rt(trials, |s| s.is_congruent() == Some(false));
                let congruent = mean_hit_rt(trials, |s| s.is_congruent() == Some(true));
                incongruent.zip(congruent).map(|(i, c)| (i - c).round())
            }
            _ => None,
        };

        Self {
            total_trials: total,
            average_reaction_time: mean_hit_rt(trials, |_| true).map(f64::round),
            accuracy_percent,
            hit_count: hits,
            miss_count: misses,
            false_alarm_count: false_alarms,
            correct_rejection_count: correct_rejections,
            d_prime,
            interference_ms,
        }
    }
}

fn mean_hit_rt(trials: &[Trial], filter: impl Fn(&Stimulus) -> bool) -> Option<f64> {
    let rts: Vec<f64> = trials
        .iter()
        .filter(|t| t.outcome == TrialOutcome::Hit && filter(&t.stimulus))
        .filter_map(|t| t.reaction_time_ms)
        .collect();
    if rts.is_empty() {
        None
    } else {
        Some(rts.iter().sum::<f64>() / rts.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cognition::types::{Color, ResponseKey};
    use pretty_assertions::assert_eq;

    fn trial(index: usize, stimulus: Stimulus, outcome: TrialOutcome, rt: Option<f64>) -> Trial {
        Trial {
            index,
            stimulus,
            is_target: matches!(outcome, TrialOutcome::Hit | TrialOutcome::Miss),
            response: rt.map(|_| ResponseKey::Press),
            reaction_time_ms: rt,
            outcome,
        }
    }

    #[test]
    fn test_empty_session() {
        let summary = SessionSummary::from_trials(TestType::GoNoGo, &[]);

        assert_eq!(summary.total_trials, 0);
        assert_eq!(summary.accuracy_percent, 0.0);
        assert_eq!(summary.average_reaction_time, None);
        assert_eq!(summary.d_prime, Some(0.0));
    }

    #[test]
    fn test_go_no_go_counts() {
        let trials = vec![
            trial(0, Stimulus::Go, TrialOutcome::Hit, Some(400.0)),
            trial(1, Stimulus::Go, TrialOutcome::Hit, Some(500.0)),
            trial(2, Stimulus::Go, TrialOutcome::Miss, None),
            trial(3, Stimulus::NoGo, TrialOutcome::FalseAlarm, Some(300.0)),
            trial(4, Stimulus::NoGo, TrialOutcome::CorrectRejection, None),
        ];
        let summary = SessionSummary::from_trials(TestType::GoNoGo, &trials);

        assert_eq!(summary.hit_count, 2);
        assert_eq!(summary.miss_count, 1);
        assert_eq!(summary.false_alarm_count, 1);
        assert_eq!(summary.correct_rejection_count, 1);
        assert_eq!(summary.accuracy_percent, 60.0);
        // false alarm RT is excluded
        assert_eq!(summary.average_reaction_time, Some(450.0));
        assert!(summary.d_prime.is_some());
        assert_eq!(summary.interference_ms, None);
    }

    #[test]
    fn test_stroop_interference() {
        let congruent = Stimulus::Stroop {
            word: Color::Red,
            ink: Color::Red,
        };
        let incongruent = Stimulus::Stroop {
            word: Color::Red,
            ink: Color::Blue,
        };
        let trials = vec![
            trial(0, congruent, TrialOutcome::Hit, Some(500.0)),
            trial(1, incongruent, TrialOutcome::Hit, Some(620.0)),
            trial(2, incongruent, TrialOutcome::Hit, Some(680.0)),
        ];
        let summary = SessionSummary::from_trials(TestType::Stroop, &trials);

        assert_eq!(summary.d_prime, None);
        assert_eq!(summary.interference_ms, Some(150.0));
        assert_eq!(summary.accuracy_percent, 100.0);
    }
}
