//! AGATA CLI - Command-line interface for AGATA
//!
//! Commands:
//! - analyze: Analyze one or more glucose profiles
//! - arm: Analyze the profiles of one arm and summarize each metric
//! - compare: Compare two arms metric by metric
//! - convert: Convert a CGM export into AGATA JSON
//! - validate: Check glucose profiles before analysis
//! - init-config: Write a default .agata.toml

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use agata::config::{AnalysisConfig, DEFAULT_CONFIG_FILE};
use agata::inspection::{missing_glucose_percentage, number_days_of_observation};
use agata::readers::is_workbook;
use agata::types::{ArmComparison, ComparisonStats, GlucoseSample};
use agata::validation::check_homogeneous_timegrid;
use agata::{Agata, AgataError, CgmDevice, GlucoseProfile, GlycemicTarget, ReportEncoder};
use agata::{AGATA_VERSION, PRODUCER_NAME};

/// AGATA - Automated Glucose dATa Analysis
#[derive(Parser)]
#[command(name = "agata")]
#[command(version = AGATA_VERSION)]
#[command(about = "Analyze continuous glucose monitoring data", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./.agata.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one or more glucose profiles
    Analyze {
        /// Input file paths (use - for stdin)
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Wrap each analysis into a report with provenance and quality flags
        #[arg(long)]
        report: bool,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Analyze the profiles of one arm and summarize each metric
    Arm {
        /// Input file paths, one profile each
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Compare two arms metric by metric
    Compare {
        /// Profiles of the first arm
        #[arg(long = "arm-1", required = true, num_args = 1..)]
        arm_1: Vec<PathBuf>,

        /// Profiles of the second arm
        #[arg(long = "arm-2", required = true, num_args = 1..)]
        arm_2: Vec<PathBuf>,

        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Arms contain the same subjects, matched by position
        #[arg(long)]
        paired: bool,

        /// Significance level
        #[arg(long)]
        alpha: Option<f64>,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Convert a CGM export into AGATA JSON
    Convert {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long)]
        input_format: InputFormat,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Check glucose profiles before analysis
    Validate {
        /// Input file paths (use - for stdin)
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a default .agata.toml in the current directory
    InitConfig,
}

/// Options shared by the analysis commands
#[derive(clap::Args)]
struct AnalysisArgs {
    /// Input format
    #[arg(long, default_value = "json")]
    input_format: InputFormat,

    /// Glycemic target (diabetes or pregnancy)
    #[arg(long)]
    target: Option<GlycemicTarget>,

    /// Retime profiles onto a grid with this step (minutes)
    #[arg(long)]
    retime_step: Option<u32>,

    /// Impute missing-data gaps up to this length (minutes)
    #[arg(long)]
    impute_max_gap: Option<u32>,
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    /// JSON array of {"t", "glucose"} samples
    Json,
    /// Dexcom Clarity export (.csv or .xlsx)
    Dexcom,
    /// Eversense export (.csv or .xlsx)
    Eversense,
    /// FreeStyle Libre export (.csv or .xlsx)
    FreestyleLibre,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

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

/// Initialize logging on stderr; `RUST_LOG` overrides the verbosity flags.
fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("failed to install the log subscriber");
    }
}

fn run(cli: Cli) -> Result<(), AgataCliError> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            input,
            analysis,
            report,
            output,
            output_format,
        } => cmd_analyze(&input, &analysis, &config, report, &output, &output_format),

        Commands::Arm {
            input,
            analysis,
            output,
            output_format,
        } => {
            let agata = build_agata(&config, &analysis);
            let arm = load_arm(&input, analysis.input_format, &agata)?;
            let results = agata.analyze_one_arm(&arm)?;
            write_output(&output, &format_output(&[results], &output_format)?)
        }

        Commands::Compare {
            arm_1,
            arm_2,
            analysis,
            paired,
            alpha,
            output,
            output_format,
        } => {
            let agata = build_agata(&config, &analysis);
            let is_paired = paired || config.comparison.is_paired;
            let alpha = alpha.unwrap_or(config.comparison.alpha);

            let arm_1 = load_arm(&arm_1, analysis.input_format, &agata)?;
            let arm_2 = load_arm(&arm_2, analysis.input_format, &agata)?;
            let (results, stats) = agata.compare_two_arms(&arm_1, &arm_2, is_paired, alpha)?;

            let comparison = ComparisonOutput {
                is_paired,
                alpha,
                results,
                stats,
            };
            write_output(&output, &format_output(&[comparison], &output_format)?)
        }

        Commands::Convert {
            input,
            input_format,
            output,
        } => {
            let profile = load_profile(&input, input_format)?;
            let samples: Vec<GlucoseSample> = profile.into();
            write_output(&output, &serde_json::to_string_pretty(&samples)?)
        }

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::InitConfig => cmd_init_config(),
    }
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, AgataCliError> {
    let config = match path {
        Some(path) => Some(AnalysisConfig::load(path)?),
        None => AnalysisConfig::load_default()?,
    };
    Ok(config.unwrap_or_default())
}

/// Analyzer from the configuration file, with command-line values taking precedence
fn build_agata(config: &AnalysisConfig, args: &AnalysisArgs) -> Agata {
    let mut agata = Agata::from_config(config);
    if let Some(target) = args.target {
        agata.glycemic_target = target;
    }
    if args.retime_step.is_some() {
        agata.retime_step = args.retime_step;
    }
    if args.impute_max_gap.is_some() {
        agata.impute_max_gap = args.impute_max_gap;
    }
    agata
}

fn cmd_analyze(
    inputs: &[PathBuf],
    args: &AnalysisArgs,
    config: &AnalysisConfig,
    report: bool,
    output: &Path,
    output_format: &OutputFormat,
) -> Result<(), AgataCliError> {
    let agata = build_agata(config, args);
    let encoder = ReportEncoder::new();

    let mut records = Vec::new();
    for input in inputs {
        let raw = load_profile(input, args.input_format)?;
        let prepared = agata.preprocess(&raw)?;
        let analysis = agata.analyze_glucose_profile(&prepared)?;

        let record = if report {
            serde_json::to_value(encoder.encode(&raw, analysis, &input.to_string_lossy()))?
        } else {
            serde_json::to_value(analysis)?
        };
        records.push(record);
    }

    write_output(output, &format_output(&records, output_format)?)
}

fn cmd_validate(
    inputs: &[PathBuf],
    input_format: InputFormat,
    json: bool,
) -> Result<(), AgataCliError> {
    let mut entries = Vec::new();

    for input in inputs {
        let mut errors = Vec::new();
        let entry = match load_profile(input, input_format) {
            Ok(profile) => {
                if profile.is_empty() {
                    errors.push("profile contains no samples".to_string());
                }
                if let Err(e) = check_homogeneous_timegrid(&profile) {
                    errors.push(e.to_string());
                }
                ValidationEntry {
                    input: input.to_string_lossy().to_string(),
                    samples: profile.len(),
                    sample_time_minutes: profile.sample_time(),
                    missing_glucose_percentage: missing_glucose_percentage(&profile),
                    days_of_observation: number_days_of_observation(&profile),
                    errors,
                }
            }
            Err(e) => {
                errors.push(CliError::from(e).message);
                ValidationEntry {
                    input: input.to_string_lossy().to_string(),
                    samples: 0,
                    sample_time_minutes: None,
                    missing_glucose_percentage: f64::NAN,
                    days_of_observation: f64::NAN,
                    errors,
                }
            }
        };
        entries.push(entry);
    }

    let invalid = entries.iter().filter(|e| !e.errors.is_empty()).count();
    let report = ValidationReport {
        total_profiles: entries.len(),
        valid_profiles: entries.len() - invalid,
        invalid_profiles: invalid,
        profiles: entries,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report ({PRODUCER_NAME} {AGATA_VERSION})");
        println!("=================");
        for entry in &report.profiles {
            let status = if entry.errors.is_empty() { "[OK]" } else { "[ERR]" };
            println!(
                "  {} {}: {} samples, {:.1}% missing, {:.2} days",
                status,
                entry.input,
                entry.samples,
                entry.missing_glucose_percentage,
                entry.days_of_observation
            );
            for error in &entry.errors {
                println!("      {error}");
            }
        }
        println!(
            "\n{} of {} profiles valid",
            report.valid_profiles, report.total_profiles
        );
    }

    if invalid > 0 {
        Err(AgataCliError::ValidationFailed(invalid))
    } else {
        Ok(())
    }
}

fn cmd_init_config() -> Result<(), AgataCliError> {
    let path = PathBuf::from(DEFAULT_CONFIG_FILE);
    if path.exists() {
        return Err(AgataCliError::ConfigExists(path));
    }
    fs::write(&path, AnalysisConfig::default_toml())?;
    println!("Created {DEFAULT_CONFIG_FILE} with default settings.");
    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, AgataCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn load_profile(input: &Path, format: InputFormat) -> Result<GlucoseProfile, AgataCliError> {
    let device = match format {
        InputFormat::Json => None,
        InputFormat::Dexcom => Some(CgmDevice::Dexcom),
        InputFormat::Eversense => Some(CgmDevice::Eversense),
        InputFormat::FreestyleLibre => Some(CgmDevice::FreestyleLibre),
    };
    let profile = match device {
        None => serde_json::from_str(&read_input(input)?)?,
        Some(device) if is_workbook(input) => device.reader().read_xlsx(input)?,
        Some(device) => device.reader().read(&read_input(input)?)?,
    };
    tracing::debug!(input = %input.display(), samples = profile.len(), "loaded profile");
    Ok(profile)
}

fn load_arm(
    inputs: &[PathBuf],
    format: InputFormat,
    agata: &Agata,
) -> Result<Vec<GlucoseProfile>, AgataCliError> {
    inputs
        .iter()
        .map(|input| {
            let profile = load_profile(input, format)?;
            Ok(agata.preprocess(&profile)?)
        })
        .collect()
}

fn format_output<T: Serialize>(records: &[T], format: &OutputFormat) -> Result<String, AgataCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => match records {
            [single] => Ok(serde_json::to_string(single)?),
            _ => Ok(serde_json::to_string(records)?),
        },
        OutputFormat::JsonPretty => match records {
            [single] => Ok(serde_json::to_string_pretty(single)?),
            _ => Ok(serde_json::to_string_pretty(records)?),
        },
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), AgataCliError> {
    if output.to_string_lossy() == "-" {
        println!("{data}");
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum AgataCliError {
    Io(io::Error),
    Analysis(AgataError),
    Json(serde_json::Error),
    ValidationFailed(usize),
    ConfigExists(PathBuf),
}

impl From<io::Error> for AgataCliError {
    fn from(e: io::Error) -> Self {
        AgataCliError::Io(e)
    }
}

impl From<AgataError> for AgataCliError {
    fn from(e: AgataError) -> Self {
        AgataCliError::Analysis(e)
    }
}

impl From<serde_json::Error> for AgataCliError {
    fn from(e: serde_json::Error) -> Self {
        AgataCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<AgataCliError> for CliError {
    fn from(e: AgataCliError) -> Self {
        match e {
            AgataCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            AgataCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Profiles must be arrays of {\"t\", \"glucose\"} samples".to_string()),
            },
            AgataCliError::Analysis(e) => {
                let (code, hint) = match &e {
                    AgataError::Validation(_) => (
                        "VALIDATION_ERROR",
                        "Retime the profiles with --retime-step to obtain a homogeneous time grid",
                    ),
                    AgataError::UnsupportedGlycemicTarget(_) => {
                        ("TARGET_ERROR", "Use --target diabetes or --target pregnancy")
                    }
                    AgataError::Parse(_)
                    | AgataError::DateParse(_)
                    | AgataError::Csv(_)
                    | AgataError::Xlsx(_) => {
                        ("PARSE_ERROR", "Check that --input-format matches the export")
                    }
                    AgataError::Config(_) => ("CONFIG_ERROR", "Run 'agata init-config' for a template"),
                    AgataError::InsufficientData(_) => {
                        ("INSUFFICIENT_DATA", "Provide at least one profile per arm")
                    }
                    AgataError::Json(_) => ("JSON_ERROR", "Check JSON syntax"),
                    AgataError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            AgataCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} profiles failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            AgataCliError::ConfigExists(path) => CliError {
                code: "CONFIG_EXISTS".to_string(),
                message: format!("{} already exists", path.display()),
                hint: Some("Remove it first or edit it manually".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct ComparisonOutput {
    is_paired: bool,
    alpha: f64,
    results: ArmComparison,
    stats: ComparisonStats,
}

#[derive(Serialize)]
struct ValidationReport {
    total_profiles: usize,
    valid_profiles: usize,
    invalid_profiles: usize,
    profiles: Vec<ValidationEntry>,
}

#[derive(Serialize)]
struct ValidationEntry {
    input: String,
    samples: usize,
    sample_time_minutes: Option<f64>,
    missing_glucose_percentage: f64,
    days_of_observation: f64,
    errors: Vec<String>,
}
