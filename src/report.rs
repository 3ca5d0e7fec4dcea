//! Report encoding
//!
//! This module packages finished lab sessions into JSON reports with producer
//! metadata, and projects cognition sessions into flat rows for tabular
//! export.

use crate::cognition::{SessionSummary, TestType, Trial};
use crate::error::LabError;
use crate::types::MotorMetrics;
use crate::voice::VoiceSessionSummary;
use crate::{LABS_VERSION, PRODUCER_NAME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current report schema version
pub const REPORT_VERSION: &str = "1.0.0";

/// A completed cognition session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub test_type: TestType,
    pub timestamp: DateTime<Utc>,
    pub trials: Vec<Trial>,
    pub summary: SessionSummary,
}

/// Final motor snapshot of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorReport {
    pub timestamp: DateTime<Utc>,
    pub frames_processed: u64,
    pub metrics: MotorMetrics,
}

/// A completed voice recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceReport {
    pub timestamp: DateTime<Utc>,
    pub summary: VoiceSessionSummary,
}

/// Any lab's report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "lab", rename_all = "snake_case")]
pub enum LabReport {
    Cognition(SessionReport),
    Motor(MotorReport),
    Voice(VoiceReport),
}

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Top-level report envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPayload {
    pub report_version: String,
    pub producer: ReportProducer,
    pub computed_at_utc: String,
    pub report: LabReport,
}

/// One trial as a flat row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub test_type: String,
    pub trial: usize,
    pub stimulus: String,
    pub target: bool,
    pub response: String,
    pub reaction_time_ms: String,
    pub outcome: String,
}

impl ReportRow {
    pub const HEADER: [&'static str; 7] = [
        "test_type",
        "trial",
        "stimulus",
        "target",
        "response",
        "reaction_time_ms",
        "outcome",
    ];

    pub fn fields(&self) -> [String; 7] {
        [
            self.test_type.clone(),
            self.trial.to_string(),
            self.stimulus.clone(),
            self.target.to_string(),
            self.response.clone(),
            self.reaction_time_ms.clone(),
            self.outcome.clone(),
        ]
    }
}

/// Encoder stamping reports with producer metadata
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn encode(&self, report: LabReport) -> ReportPayload {
        ReportPayload {
            report_version: REPORT_VERSION.to_string(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: LABS_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            report,
        }
    }

    /// Encode to JSON string
    pub fn encode_to_json(&self, report: LabReport) -> Result<String, LabError> {
        let payload = self.encode(report);
        serde_json::to_string_pretty(&payload).map_err(LabError::JsonError)
    }
}

/// Flatten a cognition session into one row per trial
pub fn to_rows(report: &SessionReport) -> Vec<ReportRow> {
    report
        .trials
        .iter()
        .map(|trial| ReportRow {
            test_type: report.test_type.to_string(),
            trial: trial.index,
            stimulus: trial.stimulus.to_string(),
            target: trial.is_target,
            response: trial
                .response
                .and_then(|key| serde_json::to_value(key).ok())
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            reaction_time_ms: trial
                .reaction_time_ms
                .map(|rt| format!("{rt:.0}"))
                .unwrap_or_default(),
            outcome: serde_json::to_value(trial.outcome)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
        })
        .collect()
}

/// Render rows as comma-separated text with a header line
pub fn rows_to_csv(rows: &[ReportRow]) -> String {
    let mut out = ReportRow::HEADER.join(",");
    out.push('\n');
    for row in rows {
        out.push_str(&row.fields().join(","));
        out.push('\n');
    }
    out
}
