//! Command-line front end: validate input, parse saved dumps, and run the
//! listing, extraction and bulk-update workflows against the SAP GUI client.
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;

use techloc_core::clipboard::SharedClipboard;
use techloc_core::config::Settings;
use techloc_core::context::WorkContext;
use techloc_core::driver::TransactionDriver;
use techloc_core::host::ScriptingHost;
use techloc_core::location::validate_batch;
use techloc_core::parser::{parse_report, ParseMode};
use techloc_core::pipeline::Pipeline;
use techloc_core::wait::CancelToken;
use techloc_core::TechLocError;

#[derive(Parser)]
#[command(name = "techloc", about = "Technical-location extraction and bulk update via SAP GUI Scripting")]
struct Args {
    /// Settings file (TOML)
    #[arg(long, env = "TECHLOC_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Override the maximum number of host sessions
    #[arg(long, env = "TECHLOC_MAX_SESSIONS", global = true)]
    max_sessions: Option<usize>,

    /// Override the directory result workbooks are written to
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Compact JSON output (no pretty-printing)
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check an input file of location codes without touching the host
    Validate { file: PathBuf },
    /// Parse a saved clipboard dump and print it as JSON
    Parse {
        file: PathBuf,
        /// Use the fixed-offset header detection
        #[arg(long)]
        legacy: bool,
    },
    /// Connect and print session identity and pool status
    Status,
    /// Run the record listing for each code or pattern
    List {
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Validate, list, bulk read and export the extracted records
    Extract { file: PathBuf },
    /// Full run: extract, filter by language, bulk update, audit, export
    Run { file: PathBuf },
}

impl Command {
    fn needs_host(&self) -> bool {
        !matches!(self, Command::Validate { .. } | Command::Parse { .. })
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .init();
}

fn load_settings(args: &Args) -> Result<Settings, TechLocError> {
    let mut settings = match &args.config {
        Some(path) => Settings::from_path(path)?,
        None => Settings::default(),
    };
    if let Some(max) = args.max_sessions {
        settings.max_sessions = max;
    }
    if let Some(dir) = &args.output_dir {
        settings.output_dir = dir.clone();
    }
    settings.validate()?;
    Ok(settings)
}

fn read_input(path: &Path) -> Result<String, TechLocError> {
    std::fs::read_to_string(path)
        .map_err(|e| TechLocError::ValidationError(format!("cannot read {}: {e}", path.display())))
}

fn print_json(value: &serde_json::Value, compact: bool) -> Result<(), TechLocError> {
    let text = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    }
    .map_err(|e| TechLocError::ExportError(format!("JSON output failed: {e}")))?;
    println!("{text}");
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, TechLocError> {
    serde_json::to_value(value)
        .map_err(|e| TechLocError::ExportError(format!("JSON output failed: {e}")))
}

/// Commands that never reach the host.
fn run_offline(command: &Command, settings: &Settings) -> Result<serde_json::Value, TechLocError> {
    match command {
        Command::Validate { file } => {
            let batch = validate_batch(&read_input(file)?)?;
            log::info!(
                "ok: {} exact codes, {} wildcard patterns",
                batch.exact.len(),
                batch.wildcard.len()
            );
            to_json(&batch)
        }
        Command::Parse { file, legacy } => {
            let mode = if *legacy { ParseMode::Legacy } else { settings.parse_mode };
            let text = std::fs::read_to_string(file).map_err(|e| {
                TechLocError::ParseError(format!("cannot read {}: {e}", file.display()))
            })?;
            to_json(&parse_report(&text, mode)?)
        }
        _ => Err(TechLocError::ConfigError("command needs a host".into())),
    }
}

/// Commands driven through a connected session pool.
#[cfg_attr(not(windows), allow(dead_code))]
fn run_on_host<H: ScriptingHost>(
    command: &Command,
    mut pipeline: Pipeline<H>,
) -> Result<serde_json::Value, TechLocError> {
    match command {
        Command::Status => {
            let info = pipeline.pool().connect()?;
            let status = pipeline.pool().status()?;
            Ok(json!({ "session": to_json(&info)?, "pool": to_json(&status)? }))
        }
        Command::List { codes } => {
            let info = pipeline.pool().connect()?;
            let ctx = pipeline.context().clone().with_language(&info.language);
            let timeout = ctx.timings().acquire_timeout();
            let mut listed = serde_json::Map::new();
            for code in codes {
                ctx.cancel.check()?;
                let outcome = pipeline.pool().with_session(timeout, |session| {
                    TransactionDriver::new(session, &ctx).list_locations(code)
                });
                let value = match outcome {
                    Ok(table) => to_json(&table)?,
                    Err(e) if e.is_soft() || matches!(e, TechLocError::VerificationFailed { .. }) => {
                        log::warn!("{code}: {e}");
                        json!({ "error": e.to_string() })
                    }
                    Err(e) => return Err(e),
                };
                listed.insert(code.clone(), value);
            }
            Ok(serde_json::Value::Object(listed))
        }
        Command::Extract { file } => {
            let input = read_input(file)?;
            pipeline.prepare()?;
            let (extraction, path) = pipeline.extract_and_export(&input)?;
            Ok(json!({
                "file": path,
                "codes": extraction.codes.len(),
                "rows": extraction.table.len(),
                "unmatched": extraction.unmatched,
            }))
        }
        Command::Run { file } => {
            let input = read_input(file)?;
            pipeline.prepare()?;
            let report = pipeline.run(&input)?;
            Ok(json!({
                "extracted_file": report.extracted_file,
                "updated_file": report.updated_file,
                "rows": report.update.table.len(),
                "succeeded": report.update.succeeded,
                "failed": report.update.failed,
                "changed_rows": report.changed_rows,
                "stats": to_json(&report.stats)?,
                "unmatched": report.extraction.unmatched,
            }))
        }
        Command::Validate { .. } | Command::Parse { .. } => {
            Err(TechLocError::ConfigError("command runs offline".into()))
        }
    }
}

#[cfg(windows)]
fn connect_and_run(command: &Command, ctx: WorkContext) -> Result<serde_json::Value, TechLocError> {
    let host = techloc_core::sapgui::SapGuiHost::new(ctx.settings.connection_index);
    run_on_host(command, Pipeline::new(host, ctx)?)
}

#[cfg(not(windows))]
fn connect_and_run(_command: &Command, _ctx: WorkContext) -> Result<serde_json::Value, TechLocError> {
    Err(TechLocError::ConnectionUnavailable(
        "SAP GUI Scripting is only available on Windows".into(),
    ))
}

fn execute(args: &Args) -> Result<serde_json::Value, TechLocError> {
    let settings = load_settings(args)?;
    if !args.command.needs_host() {
        return run_offline(&args.command, &settings);
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        log::warn!("interrupt received, stopping after the current step");
        handler_token.cancel();
    })
    .map_err(|e| TechLocError::ConfigError(format!("cannot install Ctrl+C handler: {e}")))?;

    let ctx = WorkContext::new(settings, SharedClipboard::system(), cancel)?;
    connect_and_run(&args.command, ctx)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match execute(&args).and_then(|value| print_json(&value, args.compact)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
