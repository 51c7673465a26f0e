//! Intent CLI - offline tooling for the intent tracker
//!
//! Commands:
//! - score: Score a behavior snapshot and print the breakdown
//! - validate: Validate tracking events against the batch schema
//! - insights: Render learning statistics as insight lines
//! - doctor: Diagnose configuration and service reachability

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use intent_tracker::behavior::insights_from_value;
use intent_tracker::behavior::scoring::score_breakdown;
use intent_tracker::config::{TrackerConfig, API_URL_ENV};
use intent_tracker::types::{BehaviorSnapshot, TrackingEvent};
use intent_tracker::{TrackerError, PRODUCER_NAME, TRACKER_VERSION};

/// Intent - visitor behavior scoring and telemetry tooling
#[derive(Parser)]
#[command(name = "intent")]
#[command(author = "IntentIQ")]
#[command(version = TRACKER_VERSION)]
#[command(about = "Score visitor behavior and check tracking payloads", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a behavior snapshot (JSON object)
    Score {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Seconds spent on the current page
        #[arg(short, long, default_value = "0")]
        time_on_page: u64,

        /// Output the breakdown as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate tracking events
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert learning statistics (JSON object) into insight lines
    Insights {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and service reachability
    Doctor {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Also contact the scoring service
        #[arg(long)]
        ping: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

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

fn run(cli: Cli) -> Result<(), IntentCliError> {
    match cli.command {
        Commands::Score {
            input,
            time_on_page,
            json,
        } => cmd_score(&input, time_on_page, json),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Insights { input, json } => cmd_insights(&input, json),

        Commands::Doctor { config, ping, json } => cmd_doctor(config.as_deref(), ping, json),
    }
}

fn read_input(input: &Path) -> Result<String, IntentCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn cmd_score(input: &Path, time_on_page: u64, json: bool) -> Result<(), IntentCliError> {
    let snapshot: BehaviorSnapshot = serde_json::from_str(&read_input(input)?)?;
    let breakdown = score_breakdown(&snapshot, time_on_page);

    if json {
        println!("{}", serde_json::to_string_pretty(&breakdown)?);
        return Ok(());
    }

    println!("Intent Score");
    println!("============");
    println!(
        "Pricing pages:  {:>6.1}  ({} views)",
        breakdown.pricing_points, breakdown.pricing_page_views
    );
    println!(
        "Docs pages:     {:>6.1}  ({} views)",
        breakdown.docs_points, breakdown.docs_page_views
    );
    println!(
        "Time on page:   {:>6.1}  ({}s)",
        breakdown.time_on_page_points, time_on_page
    );
    println!(
        "Scroll depth:   {:>6.1}  ({}%)",
        breakdown.scroll_depth_points, snapshot.scroll_depth
    );
    println!("Return visitor: {:>6.1}", breakdown.return_visitor_points);
    println!("Referrer:       {:>6.1}", breakdown.referrer_points);
    println!("Multi-page:     {:>6.1}", breakdown.multi_page_points);
    println!("----------------------");
    println!("Raw total:      {:>6.1}", breakdown.raw_total);
    println!(
        "Score:          {:>6}  ({})",
        breakdown.score.rounded(),
        breakdown.level
    );

    Ok(())
}

/// Parse each record on its own so one bad line does not hide the rest
fn parse_events(
    data: &str,
    format: InputFormat,
) -> Result<Vec<Result<TrackingEvent, String>>, IntentCliError> {
    match format {
        InputFormat::Ndjson => Ok(data
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_str(line).map_err(|e| e.to_string()))
            .collect()),
        InputFormat::Json => {
            let values: Vec<serde_json::Value> = serde_json::from_str(data)?;
            Ok(values
                .into_iter()
                .map(|v| serde_json::from_value(v).map_err(|e| e.to_string()))
                .collect())
        }
    }
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), IntentCliError> {
    let parsed = parse_events(&read_input(input)?, input_format)?;
    if parsed.is_empty() {
        return Err(IntentCliError::NoEvents);
    }

    let errors: Vec<ValidationErrorDetail> = parsed
        .iter()
        .enumerate()
        .filter_map(|(index, event)| {
            let error = match event {
                Ok(event) => event.validate().err()?.to_string(),
                Err(parse_error) => parse_error.clone(),
            };
            Some(ValidationErrorDetail {
                index,
                page: event.as_ref().ok().map(|e| e.page.clone()),
                error,
            })
        })
        .collect();

    let report = ValidationReport {
        total_events: parsed.len(),
        valid_events: parsed.len() - errors.len(),
        invalid_events: errors.len(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Valid events:   {}", report.valid_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Event {} (index {}): {}",
                    err.page.as_deref().unwrap_or("unknown"),
                    err.index,
                    err.error
                );
            }
        }
    }

    if report.invalid_events > 0 {
        Err(IntentCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

fn cmd_insights(input: &Path, json: bool) -> Result<(), IntentCliError> {
    let stats: serde_json::Value = serde_json::from_str(&read_input(input)?)?;
    if !stats.is_object() {
        return Err(IntentCliError::ParseError(
            "learning stats must be a JSON object".to_string(),
        ));
    }

    let insights = insights_from_value(&stats);
    if json {
        println!("{}", serde_json::to_string_pretty(&insights)?);
    } else {
        for line in &insights {
            println!("- {}", line);
        }
    }
    Ok(())
}

fn cmd_doctor(config_path: Option<&Path>, ping: bool, json: bool) -> Result<(), IntentCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "tracker_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Tracker version {}", TRACKER_VERSION),
    });

    let config = match config_path {
        Some(path) => match TrackerConfig::load(path) {
            Ok(config) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Loaded {}", path.display()),
                });
                Some(config)
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                });
                None
            }
        },
        None => {
            let config = TrackerConfig::from_env();
            match config.validate() {
                Ok(()) => {
                    checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: "Using defaults".to_string(),
                    });
                    Some(config)
                }
                Err(e) => {
                    checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: e.to_string(),
                    });
                    None
                }
            }
        }
    };

    if let Some(config) = &config {
        let source = if std::env::var(API_URL_ENV).map(|v| !v.trim().is_empty()).unwrap_or(false) {
            format!("from {}", API_URL_ENV)
        } else {
            "configured".to_string()
        };
        checks.push(DoctorCheck {
            name: "api_base_url".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} ({})", config.api_base_url, source),
        });

        checks.push(storage_check(config));

        if ping {
            checks.push(ping_check(config));
        }
    }

    // Piped stdin is what score/validate/insights read with `-i -`
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
            message: "stdin is a pipe (ready for -i -)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: TRACKER_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Intent Doctor Report");
        println!("====================");
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
        Err(IntentCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn storage_check(config: &TrackerConfig) -> DoctorCheck {
    let Some(path) = &config.storage_path else {
        return DoctorCheck {
            name: "storage".to_string(),
            status: CheckStatus::Warning,
            message: "No storage_path set, visitor ids last one process".to_string(),
        };
    };

    let parent_ok = path
        .parent()
        .map(|p| p.as_os_str().is_empty() || p.is_dir())
        .unwrap_or(true);
    if !parent_ok {
        return DoctorCheck {
            name: "storage".to_string(),
            status: CheckStatus::Error,
            message: format!("Directory for {} does not exist", path.display()),
        };
    }

    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&content) {
            Ok(map) => DoctorCheck {
                name: "storage".to_string(),
                status: CheckStatus::Ok,
                message: format!("{} ({} keys)", path.display(), map.len()),
            },
            Err(e) => DoctorCheck {
                name: "storage".to_string(),
                status: CheckStatus::Warning,
                message: format!("Malformed store, it will be reset: {}", e),
            },
        },
        Err(_) => DoctorCheck {
            name: "storage".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} will be created on first write", path.display()),
        },
    }
}

fn ping_check(config: &TrackerConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            return DoctorCheck {
                name: "ping".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot start async runtime: {}", e),
            }
        }
    };

    let result = runtime.block_on(async {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let response = client.get(&config.api_base_url).send().await?;
        Ok::<u16, TrackerError>(response.status().as_u16())
    });

    match result {
        Ok(status) => DoctorCheck {
            name: "ping".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} answered with HTTP {}", config.api_base_url, status),
        },
        Err(e) => DoctorCheck {
            name: "ping".to_string(),
            status: CheckStatus::Warning,
            message: format!("Service unreachable, tracker will fall back to local scoring: {}", e),
        },
    }
}

// Error types

#[derive(Debug)]
enum IntentCliError {
    Io(io::Error),
    Json(serde_json::Error),
    NoEvents,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for IntentCliError {
    fn from(e: io::Error) -> Self {
        IntentCliError::Io(e)
    }
}

impl From<serde_json::Error> for IntentCliError {
    fn from(e: serde_json::Error) -> Self {
        IntentCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<IntentCliError> for CliError {
    fn from(e: IntentCliError) -> Self {
        match e {
            IntentCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            IntentCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            IntentCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            IntentCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            IntentCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            IntentCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    page: Option<String>,
    error: String,
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
