//! Cognitive test battery
//!
//! Stroop, n-back and go/no-go tests run by a timer-driven trial state
//! machine and scored with signal-detection counts and d-prime.
//!
//! Flow: start → instructions (lead-in) → trials (present, respond or time
//! out, inter-trial gap) → frozen summary → report

pub mod machine;
pub mod sequence;
pub mod summary;
pub mod types;

pub use machine::{ActiveTrial, MachineEvent, TrialStateMachine};
pub use summary::SessionSummary;
pub use types::{
    Color, Phase, Response, ResponseKey, Stimulus, TestType, Trial, TrialOutcome,
};
