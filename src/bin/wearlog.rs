//! Wearlog CLI - Command-line interface for the wear-log engine
//!
//! Commands:
//! - reconstruct: Build wear and non-wear intervals for every subject
//! - validate: Audit a wear log without an observation window
//! - normalize: Show how raw time fields are read
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, LevelFilter};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use wearlog_engine::adapters::SubjectInput;
use wearlog_engine::encoder::OutputFormat as ReportFormat;
use wearlog_engine::pipeline::SubjectAudit;
use wearlog_engine::{
    EngineConfig, TimestampNormalizer, WearProcessor, ENGINE_VERSION, PRODUCER_NAME,
};

/// Wearlog - Wear/non-wear interval reconstruction
#[derive(Parser)]
#[command(name = "wearlog")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Reconstruct wear intervals from hand-logged equipment events", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct wear and non-wear intervals (batch mode)
    Reconstruct {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Observation windows CSV (subject_id,data_start,data_end); for JSON
        /// input, used by subjects without an inline window
        #[arg(long)]
        windows: Option<PathBuf>,

        /// Engine configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Minimum non-wear gap in seconds
        #[arg(long)]
        min_gap_seconds: Option<i64>,

        /// Parallel subject workers
        #[arg(long)]
        workers: Option<usize>,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Audit a wear log: parse failures, ordering and unterminated intervals
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Observation windows CSV
        #[arg(long)]
        windows: Option<PathBuf>,

        /// Engine configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Normalize raw time field text
    Normalize {
        /// Field texts, e.g. "08:30 - swimming and shower"
        #[arg(required = true)]
        fields: Vec<String>,

        /// Engine configuration JSON (for descriptive phrases)
        #[arg(long)]
        config: Option<PathBuf>,
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

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// {"subjects": [...]} document
    Json,
    /// One row per (subject, day)
    Csv,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON batch report
    Json,
    /// Pretty-printed JSON batch report
    JsonPretty,
    /// Newline-delimited JSON (one subject per line)
    Ndjson,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => ReportFormat::Json,
            OutputFormat::JsonPretty => ReportFormat::JsonPretty,
            OutputFormat::Ndjson => ReportFormat::Ndjson,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
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

fn run(cli: Cli) -> Result<(), WearlogCliError> {
    match cli.command {
        Commands::Reconstruct {
            input,
            output,
            input_format,
            windows,
            config,
            min_gap_seconds,
            workers,
            output_format,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(seconds) = min_gap_seconds {
                config.min_gap_seconds = seconds;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            cmd_reconstruct(
                &input,
                &output,
                input_format,
                windows.as_deref(),
                config,
                output_format,
            )
        }
        Commands::Validate {
            input,
            input_format,
            windows,
            config,
            json,
        } => {
            let config = load_config(config.as_deref())?;
            cmd_validate(&input, input_format, windows.as_deref(), config, json)
        }
        Commands::Normalize { fields, config } => {
            let config = load_config(config.as_deref())?;
            cmd_normalize(&fields, &config.normalizer())
        }
        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, WearlogCliError> {
    match path {
        Some(path) => {
            debug!("loading configuration from {}", path.display());
            Ok(EngineConfig::from_path(path)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn read_input(input: &Path) -> Result<String, WearlogCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn load_subjects(
    processor: &WearProcessor,
    input: &Path,
    input_format: InputFormat,
    windows: Option<&Path>,
) -> Result<Vec<SubjectInput>, WearlogCliError> {
    let input_data = read_input(input)?;
    let windows_data = windows.map(fs::read_to_string).transpose()?;

    let subjects = match input_format {
        InputFormat::Json => processor.load_json(&input_data, windows_data.as_deref())?,
        InputFormat::Csv => processor.load_csv(&input_data, windows_data.as_deref())?,
    };

    if subjects.is_empty() {
        return Err(WearlogCliError::NoSubjects);
    }
    Ok(subjects)
}

fn cmd_reconstruct(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    windows: Option<&Path>,
    config: EngineConfig,
    output_format: OutputFormat,
) -> Result<(), WearlogCliError> {
    let processor = WearProcessor::with_config(config)?;
    let subjects = load_subjects(&processor, input, input_format, windows)?;

    let reports = processor.process_batch(&subjects)?;
    let report = processor
        .encoder()
        .encode(reports, processor.config().min_gap_seconds);
    let output_data = processor
        .encoder()
        .render(&report, output_format.into())?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
        if !output_data.ends_with('\n') {
            println!();
        }
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    windows: Option<&Path>,
    config: EngineConfig,
    json: bool,
) -> Result<(), WearlogCliError> {
    let processor = WearProcessor::with_config(config)?;
    let subjects = load_subjects(&processor, input, input_format, windows)?;

    let audits: Vec<SubjectAudit> = subjects
        .iter()
        .map(|subject| processor.audit_subject(subject))
        .collect();

    let report = ValidationReport {
        total_subjects: audits.len(),
        clean_subjects: audits.iter().filter(|a| a.is_clean()).count(),
        diagnostics: audits.iter().map(|a| a.diagnostics.len()).sum(),
        violations: audits.iter().map(|a| a.violations.len()).sum(),
        subjects: audits.into_iter().filter(|a| !a.is_clean()).collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total subjects: {}", report.total_subjects);
        println!("Clean subjects: {}", report.clean_subjects);
        println!("Diagnostics:    {}", report.diagnostics);
        println!("Violations:     {}", report.violations);

        for audit in &report.subjects {
            println!("\n{}:", audit.subject_id);
            for diagnostic in &audit.diagnostics {
                let raw = diagnostic
                    .raw
                    .as_deref()
                    .map(|r| format!(" [{r:?}]"))
                    .unwrap_or_default();
                println!("  - {:?}: {}{}", diagnostic.kind, diagnostic.message, raw);
            }
            for violation in &audit.violations {
                println!("  - {:?}: {}", violation.kind, violation.description);
            }
        }
    }

    let findings = report.diagnostics + report.violations;
    if findings > 0 {
        Err(WearlogCliError::ValidationFailed(findings))
    } else {
        Ok(())
    }
}

fn cmd_normalize(fields: &[String], normalizer: &TimestampNormalizer) -> Result<(), WearlogCliError> {
    let results: Vec<NormalizeResult> = fields
        .iter()
        .map(|raw| match normalizer.normalize_str(raw) {
            Ok(Some(field)) => NormalizeResult {
                raw: raw.clone(),
                time: Some(field.time.format("%H:%M:%S").to_string()),
                annotation: field.annotation,
                uncertain: field.uncertain,
                error: None,
            },
            Ok(None) => NormalizeResult {
                raw: raw.clone(),
                time: None,
                annotation: None,
                uncertain: false,
                error: None,
            },
            Err(e) => NormalizeResult {
                raw: raw.clone(),
                time: None,
                annotation: None,
                uncertain: e.uncertain,
                error: Some(e.to_string()),
            },
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), WearlogCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Wearlog engine version {}", ENGINE_VERSION),
    });

    if let Some(config_path) = config {
        if config_path.exists() {
            match EngineConfig::from_path(config_path) {
                Ok(config) => checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Configuration valid ({} trial days, {}s minimum gap, {} rules)",
                        config.trial_days,
                        config.min_gap_seconds,
                        config.rule_policy().rules().len()
                    ),
                }),
                Err(e) => checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid configuration: {}", e),
                }),
            }
        } else {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Configuration file does not exist".to_string(),
            });
        }
    } else {
        checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "Using built-in defaults".to_string(),
        });
    }

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
            message: "stdin is a pipe (use -i - to read it)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Wearlog Doctor Report");
        println!("=====================");
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
        Err(WearlogCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum WearlogCliError {
    Io(io::Error),
    Compute(wearlog_engine::ComputeError),
    Json(serde_json::Error),
    NoSubjects,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for WearlogCliError {
    fn from(e: io::Error) -> Self {
        WearlogCliError::Io(e)
    }
}

impl From<wearlog_engine::ComputeError> for WearlogCliError {
    fn from(e: wearlog_engine::ComputeError) -> Self {
        WearlogCliError::Compute(e)
    }
}

impl From<serde_json::Error> for WearlogCliError {
    fn from(e: serde_json::Error) -> Self {
        WearlogCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<WearlogCliError> for CliError {
    fn from(e: WearlogCliError) -> Self {
        use wearlog_engine::ComputeError;

        match e {
            WearlogCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            WearlogCliError::Compute(e) => {
                let (code, hint) = match &e {
                    ComputeError::InvalidConfig(_) => {
                        ("CONFIG_ERROR", "Run 'wearlog doctor --config <path>' for details")
                    }
                    ComputeError::Schema(_) => {
                        ("SCHEMA_ERROR", "Check the CSV header against the configured columns")
                    }
                    ComputeError::IoError(_) => ("IO_ERROR", "Check file paths and permissions"),
                    _ => ("PARSE_ERROR", "Check the input format"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            WearlogCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            WearlogCliError::NoSubjects => CliError {
                code: "NO_SUBJECTS".to_string(),
                message: "No subjects found in input".to_string(),
                hint: Some("Ensure the input has at least one row with a subject id".to_string()),
            },
            WearlogCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} findings in wear log", count),
                hint: Some("Fix the reported fields and retry".to_string()),
            },
            WearlogCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_subjects: usize,
    clean_subjects: usize,
    diagnostics: usize,
    violations: usize,
    subjects: Vec<SubjectAudit>,
}

#[derive(serde::Serialize)]
struct NormalizeResult {
    raw: String,
    time: Option<String>,
    annotation: Option<String>,
    uncertain: bool,
    error: Option<String>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
