//! Stimulus sequence generation
//!
//! The full list is generated up front when a session starts, with balancing
//! per test type. A seeded [`StdRng`] makes sessions reproducible.

use super::types::{Color, Stimulus, TestType};
use crate::config::CognitionConfig;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

const LETTERS: [char; 8] = ['B', 'C', 'D', 'F', 'H', 'K', 'M', 'R'];

/// Number of trials a test runs under `config`
pub fn trial_count(test_type: TestType, config: &CognitionConfig) -> usize {
    match test_type {
        TestType::Stroop => config.stroop_trials,
        TestType::NBack => config.n_back_trials,
        TestType::GoNoGo => config.go_no_go_trials,
    }
}

pub fn generate(test_type: TestType, config: &CognitionConfig, rng: &mut StdRng) -> Vec<Stimulus> {
    let total = trial_count(test_type, config);
    match test_type {
        TestType::Stroop => stroop(total, rng),
        TestType::NBack => n_back(total, config.n_back, config.n_back_match_rate, rng),
        TestType::GoNoGo => go_no_go(total, config.go_ratio, rng),
    }
}

/// Half congruent, half incongruent, shuffled
fn stroop(total: usize, rng: &mut StdRng) -> Vec<Stimulus> {
    let congruent = total / 2;
    let mut stimuli: Vec<Stimulus> = (0..total)
        .map(|i| {
            let word = random_color(rng);
            let ink = if i < congruent {
                word
            } else {
                let others: Vec<Color> = Color::ALL.into_iter().filter(|c| *c != word).collect();
                others[rng.gen_range(0..others.len())]
            };
            Stimulus::Stroop { word, ink }
        })
        .collect();
    stimuli.shuffle(rng);
    stimuli
}

/// Letters with `round(rate * (total - n))` matches placed among the eligible
/// positions; non-match positions never repeat the letter `n` back.
fn n_back(total: usize, n: usize, match_rate: f64, rng: &mut StdRng) -> Vec<Stimulus> {
    let eligible: Vec<usize> = (n..total).collect();
    let matches = ((match_rate * eligible.len() as f64).round() as usize).min(eligible.len());
    let mut targets = vec![false; total];
    for &i in eligible.choose_multiple(rng, matches) {
        targets[i] = true;
    }

    let mut letters: Vec<char> = Vec::with_capacity(total);
    for i in 0..total {
        let letter = if i < n {
            LETTERS[rng.gen_range(0..LETTERS.len())]
        } else if targets[i] {
            letters[i - n]
        } else {
            let back = letters[i - n];
            let others: Vec<char> = LETTERS.into_iter().filter(|c| *c != back).collect();
            others[rng.gen_range(0..others.len())]
        };
        letters.push(letter);
    }

    letters.into_iter().map(|letter| Stimulus::Letter { letter }).collect()
}

/// `round(ratio * total)` go trials, shuffled
fn go_no_go(total: usize, go_ratio: f64, rng: &mut StdRng) -> Vec<Stimulus> {
    let go = ((go_ratio * total as f64).round() as usize).min(total);
    let mut stimuli: Vec<Stimulus> = (0..total)
        .map(|i| if i < go { Stimulus::Go } else { Stimulus::NoGo })
        .collect();
    stimuli.shuffle(rng);
    stimuli
}

fn random_color(rng: &mut StdRng) -> Color {
    Color::ALL[rng.gen_range(0..Color::ALL.len())]
}

/// Whether position `index` repeats the stimulus `n` positions earlier
pub fn is_n_back_match(stimuli: &[Stimulus], index: usize, n: usize) -> bool {
    index >= n && stimuli.get(index).is_some() && stimuli.get(index) == stimuli.get(index - n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_stroop_is_balanced() {
        let mut rng = StdRng::seed_from_u64(7);
        let stimuli = generate(TestType::Stroop, &CognitionConfig::default(), &mut rng);

        let congruent = stimuli
            .iter()
            .filter(|s| s.is_congruent() == Some(true))
            .count();
        assert_eq!(stimuli.len(), 20);
        assert_eq!(congruent, 10);
    }

    #[test]
    fn test_n_back_match_count_is_forced() {
        let config = CognitionConfig::default();
        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let stimuli = generate(TestType::NBack, &config, &mut rng);
            let matches = (0..stimuli.len())
                .filter(|&i| is_n_back_match(&stimuli, i, config.n_back))
                .count();

            // round(0.3 * 18)
            assert_eq!(matches, 5, "seed {seed}");
        }
    }

    #[test]
    fn test_go_ratio() {
        let mut rng = StdRng::seed_from_u64(1);
        let stimuli = generate(TestType::GoNoGo, &CognitionConfig::default(), &mut rng);

        let go = stimuli.iter().filter(|s| **s == Stimulus::Go).count();
        assert_eq!(go, 15);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let config = CognitionConfig::default();
        let a = generate(TestType::NBack, &config, &mut StdRng::seed_from_u64(42));
        let b = generate(TestType::NBack, &config, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_match_needs_full_lag() {
        let stimuli = vec![
            Stimulus::Letter { letter: 'B' },
            Stimulus::Letter { letter: 'B' },
            Stimulus::Letter { letter: 'B' },
        ];
        assert!(!is_n_back_match(&stimuli, 1, 2));
        assert!(is_n_back_match(&stimuli, 2, 2));
        assert!(!is_n_back_match(&stimuli, 3, 2));
    }
}
