//! Cognition data types
//!
//! This module defines the stimuli, responses and trial records that flow
//! through the cognitive test battery.

use crate::types::Millis;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cognitive test variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    /// Name the ink color, ignoring the word
    Stroop,
    /// Press when the letter matches the one N positions back
    NBack,
    /// Press on go, withhold on no-go
    GoNoGo,
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestType::Stroop => "stroop",
            TestType::NBack => "n_back",
            TestType::GoNoGo => "go_no_go",
        };
        f.write_str(name)
    }
}

/// Stroop colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Red,
    Green,
    Blue,
    Yellow,
}

impl Color {
    pub const ALL: [Color; 4] = [Color::Red, Color::Green, Color::Blue, Color::Yellow];

    /// Response key naming this color
    pub fn key(self) -> ResponseKey {
        match self {
            Color::Red => ResponseKey::Red,
            Color::Green => ResponseKey::Green,
            Color::Blue => ResponseKey::Blue,
            Color::Yellow => ResponseKey::Yellow,
        }
    }
}

/// What a trial presents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stimulus {
    Stroop { word: Color, ink: Color },
    Letter { letter: char },
    Go,
    NoGo,
}

impl Stimulus {
    pub fn is_congruent(&self) -> Option<bool> {
        match self {
            Stimulus::Stroop { word, ink } => Some(word == ink),
            _ => None,
        }
    }
}

impl fmt::Display for Stimulus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stimulus::Stroop { word, ink } => write!(f, "{word:?}/{ink:?}"),
            Stimulus::Letter { letter } => write!(f, "{letter}"),
            Stimulus::Go => f.write_str("go"),
            Stimulus::NoGo => f.write_str("no_go"),
        }
    }
}

/// Keys a participant can press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKey {
    Red,
    Green,
    Blue,
    Yellow,
    /// Generic press (n-back match, go)
    Press,
}

impl ResponseKey {
    pub fn is_color(self) -> bool {
        !matches!(self, ResponseKey::Press)
    }
}

/// A participant response
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub key: ResponseKey,
    pub timestamp_ms: Millis,
}

/// Signal-detection classification of a trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialOutcome {
    Hit,
    Miss,
    FalseAlarm,
    CorrectRejection,
}

impl TrialOutcome {
    pub fn is_correct(self) -> bool {
        matches!(self, TrialOutcome::Hit | TrialOutcome::CorrectRejection)
    }
}

/// A resolved trial; never modified once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub index: usize,
    pub stimulus: Stimulus,
    /// Whether a response was expected
    pub is_target: bool,
    pub response: Option<ResponseKey>,
    pub reaction_time_ms: Option<f64>,
    pub outcome: TrialOutcome,
}

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Ready,
    Instructions,
    Running,
    Complete,
}
