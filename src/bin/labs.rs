//! Labs CLI - Command-line interface for Wellness Labs
//!
//! Commands:
//! - motor: Replay hand landmark frames into motor metrics
//! - voice: Replay audio frames into voice metrics and a recording report
//! - cognition: Run a cognitive test from a scripted response file
//! - config: Print or validate a configuration file
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, warn};

use wellness_labs::cognition::{Phase, Response, ResponseKey, TestType, TrialStateMachine};
use wellness_labs::pipeline::parse_ndjson;
use wellness_labs::report::{rows_to_csv, to_rows, MotorReport, VoiceReport};
use wellness_labs::types::{AudioFrame, LandmarkFrame, LandmarkModel, Microphone};
use wellness_labs::{
    FrameLoop, LabConfig, LabError, LabReport, MotorLab, ReportEncoder, SharedResource, VoiceLab,
    LABS_VERSION, PRODUCER_NAME,
};

/// Labs - On-device motor, voice and cognition assessments
#[derive(Parser)]
#[command(name = "labs")]
#[command(version = LABS_VERSION)]
#[command(about = "Score motor, voice and cognition lab sessions", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay landmark frames (NDJSON) into per-frame motor metrics
    Motor {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the final session report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Replay audio frames (NDJSON) into per-frame voice metrics
    Voice {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Microphone sample rate; defaults to the first frame's rate
        #[arg(long)]
        sample_rate: Option<f64>,

        /// Recording length in ms; defaults to the configured length
        #[arg(long)]
        record_ms: Option<f64>,

        /// Write the recording report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Run a cognitive test driven by a scripted event file
    Cognition {
        /// Test to run
        #[arg(value_enum)]
        test: TestArg,

        /// Scripted events (NDJSON); without it every trial times out
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Seed for the stimulus sequence
        #[arg(long)]
        seed: Option<u64>,

        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Report format
        #[arg(long, default_value = "json")]
        format: ReportFormat,
    },

    /// Print the default configuration or validate a file
    Config {
        /// Validate this file instead of printing defaults
        #[arg(long)]
        validate: Option<PathBuf>,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Check configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TestArg {
    Stroop,
    NBack,
    GoNoGo,
}

impl From<TestArg> for TestType {
    fn from(arg: TestArg) -> Self {
        match arg {
            TestArg::Stroop => TestType::Stroop,
            TestArg::NBack => TestType::NBack,
            TestArg::GoNoGo => TestType::GoNoGo,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum ReportFormat {
    /// Pretty-printed report payload
    Json,
    /// One row per trial
    Csv,
}

/// One line of a cognition script
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ScriptEvent {
    Start { at_ms: f64 },
    Respond { at_ms: f64, key: ResponseKey },
    Reset { at_ms: f64 },
}

impl ScriptEvent {
    fn at_ms(&self) -> f64 {
        match self {
            ScriptEvent::Start { at_ms }
            | ScriptEvent::Respond { at_ms, .. }
            | ScriptEvent::Reset { at_ms } => *at_ms,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), LabsCliError> {
    match cli.command {
        Commands::Motor {
            input,
            output,
            config,
            report,
        } => cmd_motor(&input, &output, config.as_deref(), report.as_deref()),

        Commands::Voice {
            input,
            output,
            config,
            sample_rate,
            record_ms,
            report,
        } => cmd_voice(
            &input,
            &output,
            config.as_deref(),
            sample_rate,
            record_ms,
            report.as_deref(),
        ),

        Commands::Cognition {
            test,
            script,
            output,
            seed,
            config,
            format,
        } => cmd_cognition(
            test.into(),
            script.as_deref(),
            &output,
            seed,
            config.as_deref(),
            format,
        ),

        Commands::Config { validate } => cmd_config(validate.as_deref()),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn read_input(input: &Path) -> Result<String, LabsCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), LabsCliError> {
    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        stdout.write_all(data.as_bytes())?;
        stdout.flush()?;
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<LabConfig, LabsCliError> {
    match path {
        Some(path) => Ok(LabConfig::load(path)?),
        None => Ok(LabConfig::default()),
    }
}

fn cmd_motor(
    input: &Path,
    output: &Path,
    config: Option<&Path>,
    report: Option<&Path>,
) -> Result<(), LabsCliError> {
    let config = load_config(config)?;
    let frames: Vec<LandmarkFrame> = parse_ndjson(&read_input(input)?)?;
    if frames.is_empty() {
        return Err(LabsCliError::NoFrames);
    }

    let model = SharedResource::new("hand_landmarker", || Ok(LandmarkModel::hand()));
    let mut frame_loop = FrameLoop::new(MotorLab::new(config.motor));
    frame_loop.start(&model)?;

    let mut out = String::new();
    for frame in &frames {
        if let Some(metrics) = frame_loop.on_frame(frame) {
            out.push_str(&serde_json::to_string(&metrics)?);
            out.push('\n');
        }
    }
    let metrics = frame_loop.snapshot();
    let processed = frame_loop.frames_processed();
    let failed = frame_loop.frames_failed();
    frame_loop.stop();
    info!(processed, failed, taps = metrics.tap_count, "motor replay finished");
    if failed > 0 {
        warn!(failed, "some frames were rejected");
    }

    write_output(output, &out)?;

    if let Some(report_path) = report {
        let json = ReportEncoder::new().encode_to_json(LabReport::Motor(MotorReport {
            timestamp: chrono::Utc::now(),
            frames_processed: processed,
            metrics,
        }))?;
        fs::write(report_path, json)?;
    }

    Ok(())
}

fn cmd_voice(
    input: &Path,
    output: &Path,
    config: Option<&Path>,
    sample_rate: Option<f64>,
    record_ms: Option<f64>,
    report: Option<&Path>,
) -> Result<(), LabsCliError> {
    let config = load_config(config)?;
    let frames: Vec<AudioFrame> = parse_ndjson(&read_input(input)?)?;
    let Some(first) = frames.first() else {
        return Err(LabsCliError::NoFrames);
    };

    let sample_rate = sample_rate.unwrap_or(first.sample_rate);
    let started_at = first.timestamp_ms;
    let microphone = SharedResource::new("microphone", move || {
        if sample_rate > 0.0 {
            Ok(Microphone::new("replay", sample_rate))
        } else {
            Err(LabError::DeviceUnavailable(format!(
                "unsupported sample rate {sample_rate}"
            )))
        }
    });

    let mut frame_loop = FrameLoop::new(VoiceLab::new(config.voice));
    frame_loop.start(&microphone)?;
    frame_loop.lab_mut().start_recording(started_at, record_ms);

    let mut out = String::new();
    let mut summary = None;
    let mut last_t = started_at;
    for frame in &frames {
        last_t = frame.timestamp_ms;
        if let Some(done) = frame_loop.lab_mut().tick(last_t) {
            summary = Some(done);
        }
        if let Some(metrics) = frame_loop.on_frame(frame) {
            out.push_str(&serde_json::to_string(&metrics)?);
            out.push('\n');
        }
    }
    if summary.is_none() {
        debug!("input ended before the recording elapsed");
        summary = frame_loop.lab_mut().stop_recording(last_t);
    }
    frame_loop.stop();

    write_output(output, &out)?;

    if let (Some(report_path), Some(summary)) = (report, summary) {
        let json = ReportEncoder::new().encode_to_json(LabReport::Voice(VoiceReport {
            timestamp: chrono::Utc::now(),
            summary,
        }))?;
        fs::write(report_path, json)?;
    }

    Ok(())
}

fn cmd_cognition(
    test_type: TestType,
    script: Option<&Path>,
    output: &Path,
    seed: Option<u64>,
    config: Option<&Path>,
    format: ReportFormat,
) -> Result<(), LabsCliError> {
    let config = load_config(config)?;
    let events: Vec<ScriptEvent> = match script {
        Some(path) => parse_ndjson(&read_input(path)?)?,
        None => Vec::new(),
    };

    let mut machine = TrialStateMachine::new(test_type, config.cognition, seed);
    machine.start(0.0);

    for event in events {
        let resolved = machine.advance(event.at_ms());
        debug!(events = resolved.len(), at_ms = event.at_ms(), "advanced");
        match event {
            ScriptEvent::Start { at_ms } => machine.start(at_ms),
            ScriptEvent::Respond { at_ms, key } => {
                let accepted = machine.respond(Response {
                    key,
                    timestamp_ms: at_ms,
                });
                if accepted.is_none() {
                    debug!(at_ms, ?key, "response ignored");
                }
            }
            ScriptEvent::Reset { .. } => machine.reset(),
        }
    }

    // Remaining trials resolve by timeout
    machine.advance(f64::INFINITY);
    if machine.phase() != Phase::Complete {
        return Err(LabsCliError::SessionIncomplete);
    }
    let report = machine.report().ok_or(LabsCliError::SessionIncomplete)?;

    let data = match format {
        ReportFormat::Json => {
            ReportEncoder::new().encode_to_json(LabReport::Cognition(report))? + "\n"
        }
        ReportFormat::Csv => rows_to_csv(&to_rows(&report)),
    };
    write_output(output, &data)
}

fn cmd_config(validate: Option<&Path>) -> Result<(), LabsCliError> {
    match validate {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            LabConfig::from_json(&content)?;
            println!("{}: ok", path.display());
        }
        None => println!("{}", LabConfig::default().to_json()?),
    }
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), LabsCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "labs_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Labs version {}", LABS_VERSION),
    });

    // Check config file if provided
    if let Some(config_path) = config {
        if config_path.exists() {
            match LabConfig::load(config_path) {
                Ok(_) => checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: "Configuration file valid".to_string(),
                }),
                Err(e) => checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                }),
            }
        } else {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Configuration file does not exist; defaults apply".to_string(),
            });
        }
    }

    // Pipelines expect frames on stdin when input is "-"
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (frame replay ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: LABS_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Labs Doctor Report");
        println!("==================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(LabsCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

// Error types

#[derive(Debug)]
enum LabsCliError {
    Io(io::Error),
    Lab(LabError),
    Json(serde_json::Error),
    NoFrames,
    SessionIncomplete,
    DoctorFailed,
}

impl From<io::Error> for LabsCliError {
    fn from(e: io::Error) -> Self {
        LabsCliError::Io(e)
    }
}

impl From<LabError> for LabsCliError {
    fn from(e: LabError) -> Self {
        LabsCliError::Lab(e)
    }
}

impl From<serde_json::Error> for LabsCliError {
    fn from(e: serde_json::Error) -> Self {
        LabsCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<LabsCliError> for CliError {
    fn from(e: LabsCliError) -> Self {
        match e {
            LabsCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            LabsCliError::Lab(e) => {
                let (code, hint) = match &e {
                    LabError::ParseError(_) | LabError::JsonError(_) => {
                        ("PARSE_ERROR", "Ensure each input line is one JSON frame")
                    }
                    LabError::InvalidConfig(_) => {
                        ("CONFIG_ERROR", "Run 'labs config' to see valid defaults")
                    }
                    e if e.is_capture_failure() => {
                        ("CAPTURE_ERROR", "Check the capture device and sample rate")
                    }
                    _ => ("LAB_ERROR", "Run with --verbose for details"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            LabsCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            LabsCliError::NoFrames => CliError {
                code: "NO_FRAMES".to_string(),
                message: "No frames found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            LabsCliError::SessionIncomplete => CliError {
                code: "SESSION_INCOMPLETE".to_string(),
                message: "Cognition session did not complete".to_string(),
                hint: Some(
                    "A script ending in reset leaves no session; add a start event".to_string(),
                ),
            },
            LabsCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}
