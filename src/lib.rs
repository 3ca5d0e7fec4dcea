//! Wellness Labs - On-device signal processing for motor, voice and cognition labs
//!
//! The labs turn capture frames into bounded scores through deterministic
//! stages: rolling buffers → event detection → spectral and pitch analysis →
//! scoring → reports.
//!
//! ## Modules
//!
//! - **Motor Lab**: Finger tapping and tremor from hand landmarks
//! - **Voice Lab**: Pitch, loudness, jitter and voice quality from audio frames
//! - **Cognition**: Stroop, n-back and go/no-go tests with signal-detection scoring

pub mod buffer;
pub mod cognition;
pub mod config;
pub mod detector;
pub mod error;
pub mod frequency;
pub mod motor;
pub mod pipeline;
pub mod pitch;
pub mod report;
pub mod resource;
pub mod scoring;
pub mod timer;
pub mod types;
pub mod voice;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use buffer::RollingBuffer;
pub use cognition::{SessionSummary, TestType, TrialStateMachine};
pub use config::LabConfig;
pub use error::LabError;
pub use motor::MotorLab;
pub use pipeline::{analyze_tremor, estimate_voice, score_trials, FrameLoop, Lab, LabStatus};
pub use report::{LabReport, ReportEncoder, SessionReport};
pub use resource::{ResourceLease, SharedResource};
pub use voice::VoiceLab;

/// Library version embedded in all reports
pub const LABS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "wellness-labs";
