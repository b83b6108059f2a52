//! docshield command line
//!
//! ```bash
//! docshield single scan.jpg
//! docshield --redact --output-dir results/ single scan.jpg
//! docshield --output-dir results/ batch scans/ extra.jpg
//! docshield --json single scan.jpg
//! docshield engines
//! docshield config show
//! ```

mod commands;
mod config;
mod discover;

use anyhow::Result;
use clap::{Parser, Subcommand};
use docshield_core::ProcessOptions;
use docshield_ocr::OcrEngineType;
use docshield_render::RedactionMethod;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::commands::OutputOptions;

#[derive(Parser)]
#[command(name = "docshield", version)]
#[command(about = "Extract text from photographed documents and detect personal information")]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file, defaults to <config dir>/docshield/config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Preferred OCR engine: tesseract or paddle
    #[arg(long, global = true)]
    engine: Option<OcrEngineType>,

    /// Directory for results JSON and redacted images
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Write a redacted copy of each image (needs --output-dir)
    #[arg(short, long, global = true)]
    redact: bool,

    /// black_box, blur or pixelate
    #[arg(long, global = true)]
    redaction_method: Option<RedactionMethod>,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process one JPEG image
    Single { image: PathBuf },

    /// Process JPEG files and directories of JPEG files
    Batch {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Report which OCR backends are usable
    Engines,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<bool> {
    let mut config = config::load_config(cli.config.as_deref())?;
    config.apply_env()?;
    if let Some(engine) = cli.engine {
        config.ocr_engine = Some(engine);
    }
    if let Some(method) = cli.redaction_method {
        config.redaction_method = Some(method);
    }

    let process = ProcessOptions {
        redact: cli.redact,
        method: config.redaction_method(),
        output_dir: cli.output_dir.clone(),
    };
    if process.redact && process.output_dir.is_none() {
        log::warn!("--redact has no effect without --output-dir");
    }
    let output = OutputOptions {
        output_dir: cli.output_dir,
        json: cli.json,
    };

    match cli.command {
        Command::Single { image } => {
            let mut pipeline = commands::build_pipeline(&config)?;
            commands::run_single(&mut pipeline, &image, &process, &output)
        }
        Command::Batch { paths } => {
            let mut pipeline = commands::build_pipeline(&config)?;
            commands::run_batch(&mut pipeline, &paths, &process, &output)
        }
        Command::Engines => commands::run_engines(&config, output.json),
        Command::Config {
            action: ConfigAction::Show,
        } => commands::show_config(&config, cli.config.as_deref()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
