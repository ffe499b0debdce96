use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use emonbeat_core::frame::FrameDecoder;
use emonbeat_core::frame::layout::DEFAULT_NODE;
use emonbeat_core::poll::{JsonLinesSink, PollSummary, Scheduler};
use emonbeat_core::source::DEFAULT_DEVICE;
use emonbeat_core::{FetchCycle, FilePortFactory, PortFactory, PortSettings, SerialPortFactory};
use glob::glob;
use tracing::info;
use tracing_subscriber::EnvFilter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("EMONBEAT_BUILD_COMMIT"),
    " ",
    env!("EMONBEAT_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "emonbeat")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    about = "Polls a serial power-monitor node and emits per-channel power and RMS voltage readings.",
    long_about = None,
    after_help = "Examples:\n  emonbeat poll --device /dev/ttyAMA0 --interval 30\n  emonbeat poll --count 1 -o readings.jsonl\n  emonbeat decode capture.txt --stdout --pretty"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll the sensor node on a fixed interval and write readings as JSON lines.
    Poll {
        /// Serial device of the sensor node (9600 baud, 8N1)
        #[arg(long, default_value = DEFAULT_DEVICE)]
        device: String,

        /// Read frames from a file or FIFO instead of a serial device
        #[arg(long, conflicts_with = "device")]
        input_file: Option<PathBuf>,

        /// Seconds between the start of two cycles
        #[arg(long, default_value_t = 10.0)]
        interval: f64,

        /// Stop after this many cycles (default: run until killed)
        #[arg(long)]
        count: Option<u64>,

        /// Give up on a cycle when no complete line arrives within this many seconds
        #[arg(long)]
        timeout: Option<f64>,

        /// Node id whose frames are decoded; other nodes are ignored
        #[arg(long, default_value_t = DEFAULT_NODE)]
        node: u16,

        /// Append readings to this file instead of stdout
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Suppress non-error output
        #[arg(long)]
        quiet: bool,
    },
    /// Decode a recorded serial capture and generate a versioned JSON report.
    #[command(alias = "replay")]
    #[command(
        after_help = "Examples:\n  emonbeat decode capture.txt -o report.json\n  emonbeat replay 'captures/*.txt' --stdout --pretty"
    )]
    Decode {
        /// Path (or single-match glob) of a capture with one frame per line
        input: PathBuf,

        /// Output report path (JSON)
        #[arg(short = 'o', long, required_unless_present = "stdout")]
        report: Option<PathBuf>,

        /// Write JSON report to stdout
        #[arg(long, conflicts_with = "report")]
        stdout: bool,

        /// Pretty-print JSON output
        #[arg(long, conflicts_with = "compact")]
        pretty: bool,

        /// Compact JSON output (default)
        #[arg(long)]
        compact: bool,

        /// Node id whose frames are decoded; other nodes are ignored
        #[arg(long, default_value_t = DEFAULT_NODE)]
        node: u16,

        /// Suppress non-error output
        #[arg(long)]
        quiet: bool,

        /// Exit with a non-zero code if any line failed to decode
        #[arg(long)]
        strict: bool,

        /// List lines that failed to decode
        #[arg(long)]
        list_errors: bool,
    },
}

struct PollArgs {
    interval: f64,
    count: Option<u64>,
    timeout: Option<f64>,
    node: u16,
    output: Option<PathBuf>,
    quiet: bool,
}

struct DecodeArgs {
    input: PathBuf,
    report: Option<PathBuf>,
    stdout: bool,
    pretty: bool,
    compact: bool,
    node: u16,
    quiet: bool,
    strict: bool,
    list_errors: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Poll {
            device,
            input_file,
            interval,
            count,
            timeout,
            node,
            output,
            quiet,
        } => {
            init_logging(quiet);
            let args = PollArgs {
                interval,
                count,
                timeout,
                node,
                output,
                quiet,
            };
            match input_file {
                Some(path) => cmd_poll(FilePortFactory::new(path), args),
                None => cmd_poll(
                    SerialPortFactory::new(PortSettings::with_device(device)),
                    args,
                ),
            }
        }
        Commands::Decode {
            input,
            report,
            stdout,
            pretty,
            compact,
            node,
            quiet,
            strict,
            list_errors,
        } => {
            init_logging(quiet);
            cmd_decode(DecodeArgs {
                input,
                report,
                stdout,
                pretty,
                compact,
                node,
                quiet,
                strict,
                list_errors,
            })
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

fn init_logging(quiet: bool) {
    let default = if quiet { "error" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(format!("{err:#}"), None)
    }
}

fn cmd_poll<P: PortFactory>(factory: P, args: PollArgs) -> Result<(), CliError> {
    let interval = parse_seconds("--interval", args.interval)?;
    let timeout = args
        .timeout
        .map(|secs| parse_seconds("--timeout", secs))
        .transpose()?;

    let writer: Box<dyn Write> = match args.output.as_ref() {
        Some(path) => Box::new(open_output(path)?),
        None => Box::new(std::io::stdout()),
    };

    info!(
        device = %factory.describe(),
        node = args.node,
        interval_s = interval.as_secs_f64(),
        "starting poll"
    );
    let cycle = FetchCycle::new(factory, FrameDecoder::new(args.node)).with_timeout(timeout);
    let mut scheduler = Scheduler::new(cycle, JsonLinesSink::new(writer), interval)
        .with_max_cycles(args.count);

    let summary = scheduler.run().context("polling stopped")?;
    if !args.quiet {
        print_poll_summary(&summary);
    }
    Ok(())
}

fn cmd_decode(args: DecodeArgs) -> Result<(), CliError> {
    let resolved_input = resolve_input_path(&args.input)?;
    validate_input_file(&resolved_input)?;
    let input_abs = fs::canonicalize(&resolved_input)
        .with_context(|| format!("Failed to resolve input path: {}", resolved_input.display()))?;

    let report_path = if args.stdout {
        None
    } else {
        Some(args.report.clone().ok_or_else(|| {
            CliError::new(
                "missing output path",
                Some("use -o/--report or --stdout".to_string()),
            )
        })?)
    };

    if let Some(report_path) = report_path.as_ref() {
        ensure_distinct_output(report_path, &input_abs)?;
    }

    let decoder = FrameDecoder::new(args.node);
    let rep = emonbeat_core::decode_capture_file(&resolved_input, &decoder)
        .context("capture decoding failed")?;
    let json = serialize_report(&rep, args.pretty, args.compact)?;

    match report_path {
        None => println!("{}", json),
        Some(report) => {
            if let Some(parent) = report.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create output directory: {}", parent.display())
                    })?;
                }
            }
            fs::write(&report, json)
                .with_context(|| format!("Failed to write report: {}", report.display()))?;
            if !args.quiet {
                eprintln!("OK: report written -> {}", report.display());
            }
        }
    }

    if args.list_errors && !args.quiet {
        print_line_errors(&rep);
    }
    if args.strict && !rep.errors.is_empty() {
        return Err(CliError::new(
            format!("{} line(s) failed to decode", rep.errors.len()),
            Some("use --list-errors to inspect".to_string()),
        ));
    }
    Ok(())
}

fn parse_seconds(flag: &str, secs: f64) -> Result<Duration, CliError> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        CliError::new(
            format!("invalid {flag} value: {secs}"),
            Some("expected a non-negative number of seconds".to_string()),
        )
    })
}

fn open_output(path: &Path) -> Result<fs::File, CliError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open output: {}", path.display()))?;
    Ok(file)
}

fn ensure_distinct_output(report_path: &Path, input_abs: &Path) -> Result<(), CliError> {
    let report_dir = match report_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::canonicalize(parent),
        Some(_) => fs::canonicalize("."),
        None => return Ok(()),
    };
    // A missing output directory is created later, so it cannot hold the input.
    let Ok(report_dir) = report_dir else {
        return Ok(());
    };
    let file_name = report_path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid report path"))?;
    if report_dir.join(file_name) == input_abs {
        return Err(CliError::new(
            format!(
                "report path must differ from input: {}",
                report_path.display()
            ),
            Some("choose a different output path".to_string()),
        ));
    }
    Ok(())
}

fn serialize_report(
    rep: &emonbeat_core::DecodeReport,
    pretty: bool,
    compact: bool,
) -> Result<String, CliError> {
    if pretty && compact {
        return Err(CliError::new(
            "cannot use --pretty and --compact together",
            Some("choose one output format".to_string()),
        ));
    }
    if pretty {
        serde_json::to_string_pretty(rep)
            .context("JSON serialization failed")
            .map_err(Into::into)
    } else {
        serde_json::to_string(rep)
            .context("JSON serialization failed")
            .map_err(Into::into)
    }
}

fn print_poll_summary(summary: &PollSummary) {
    eprintln!(
        "OK: {} cycle(s), {} reading(s), {} ignored, {} error(s)",
        summary.cycles, summary.readings, summary.ignored, summary.errors
    );
}

fn print_line_errors(rep: &emonbeat_core::DecodeReport) {
    eprintln!("Line errors:");
    for error in &rep.errors {
        eprintln!("  line {}: {}", error.line, error.message);
    }
}

fn validate_input_file(input: &Path) -> Result<(), CliError> {
    if !input.exists() {
        return Err(CliError::new(
            format!("input file not found: {}", input.display()),
            Some("pass a capture file with one frame per line".to_string()),
        ));
    }
    let meta = fs::metadata(input)
        .with_context(|| format!("Failed to read input file: {}", input.display()))?;
    if !meta.is_file() {
        return Err(CliError::new(
            format!("input is not a file: {}", input.display()),
            Some("pass a capture file with one frame per line".to_string()),
        ));
    }
    Ok(())
}

fn resolve_input_path(input: &Path) -> Result<PathBuf, CliError> {
    let pattern = input.to_string_lossy();
    if !is_glob_pattern(&pattern) {
        return Ok(input.to_path_buf());
    }

    let mut matches = Vec::new();
    let paths = glob(&pattern).map_err(|err| {
        CliError::new(
            format!("invalid input pattern '{}'", pattern),
            Some(format!("pattern error: {}", err.msg)),
        )
    })?;
    for entry in paths {
        let path = entry.map_err(|err| {
            CliError::new(
                format!("invalid input pattern '{}'", pattern),
                Some(format!("pattern error: {}", err)),
            )
        })?;
        if path.is_file() {
            matches.push(path);
        }
    }

    if matches.is_empty() {
        return Err(CliError::new(
            format!("no files match pattern '{}'", pattern),
            Some("check the path or quote the pattern".to_string()),
        ));
    }
    if matches.len() > 1 {
        let listed = matches
            .iter()
            .take(3)
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let more = if matches.len() > 3 { ", ..." } else { "" };
        return Err(CliError::new(
            format!(
                "multiple files match pattern '{}' ({} matches); matches: {}{}",
                pattern,
                matches.len(),
                listed,
                more
            ),
            Some("pass a single capture file, or run once per file".to_string()),
        ));
    }

    Ok(matches.remove(0))
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains('*') || input.contains('?') || input.contains('[')
}
