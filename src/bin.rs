//! Binary entry point for `beebot`.
//!
//! This module provides the command-line interface for beebot with options
//! for the reply mode, configuration file paths, and logging verbosity. It
//! initializes the necessary components and starts the service.

use std::process::ExitCode;

use beebot::base::{
    config::{Config, ConfigOverrides},
    types::{RunMode, Void, exit_code_for},
};
use clap::Parser;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use tracing::error;
use tracing_subscriber::{fmt::time::ChronoLocal, layer::SubscriberExt, util::SubscriberInitExt};

/// Beebot – keeps score of the emoji reactions in a Slack workspace.
///
/// Configuration can come from `config.toml` or `BEEBOT_*` environment
/// variables. Ask the bot with `showme [top|all|clicked] <reaction>`,
/// `showme [given|received|reactions]`, or `showme version`.
#[derive(Parser, Debug)]
#[command(version, author, about, long_about = None)]
struct Args {
    /// Override the config file path (optional).
    ///
    /// By default, the bot will look for a config file at `.hidden/config.toml`
    /// in the current directory.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
    /// Choose where `showme` replies go.
    ///
    /// - channel: reply in the channel/DM where the request was received
    /// - dm: send replies via direct message just to the requester (default)
    /// - quiet: don't reply to `showme` requests
    #[arg(short, long, value_enum)]
    mode: Option<RunMode>,
    /// Print every raw event.
    #[arg(short, long)]
    debug: bool,
    /// Drop and recreate the counter store before starting.
    #[arg(long)]
    reset_db: bool,
    /// Export spans over OTLP.
    #[arg(long)]
    otlp: bool,
    /// Increase log verbosity (-v, -vv, etc.).
    ///
    /// Use multiple times to increase verbosity:
    /// - No flag: INFO level
    /// - -v: DEBUG level
    /// - -vv or more: TRACE level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Main entry point for the beebot binary.
///
/// Sets up logging, loads configuration, and starts the bot. Fatal errors
/// map to the exit status of their kind.
#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing(&args) {
        eprintln!("Failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

async fn run(args: Args) -> Void {
    let overrides = ConfigOverrides { mode: args.mode, debug: args.debug };
    let config = Config::load(args.config.as_deref(), &overrides)?;

    beebot::start(config, args.reset_db).await
}

fn init_tracing(args: &Args) -> Void {
    // Construct the level filter.

    let level = match args.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let level_filter = tracing_subscriber::filter::LevelFilter::from_level(level);

    // Prepare the log layer; every line carries a local timestamp.

    let stdout = tracing_subscriber::fmt::layer()
        .with_timer(ChronoLocal::new("%Y%m%d %H%M%S".to_string()))
        .with_ansi(true)
        .with_level(true)
        .with_file(false)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    // Prepare the otlp layer.

    let otel = if args.otlp {
        let exporter = opentelemetry_otlp::SpanExporter::builder().with_http().with_protocol(Protocol::HttpBinary).build()?;
        let tracer = opentelemetry_sdk::trace::SdkTracerProvider::builder().with_simple_exporter(exporter).build().tracer("beebot");
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry().with(otel).with(level_filter).with(stdout).init();

    Ok(())
}
