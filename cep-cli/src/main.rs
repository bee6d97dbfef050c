//! CEP CLI - pattern detection over JSON Lines event files
//!
//! Loads a pattern and engine settings from a TOML config and runs one
//! adaptive engine per input file.

use anyhow::{bail, Context, Result};
use cep_engine::{EvaluationEngine, EvaluationSummary, LineInput, OutputStream, Pattern};
use clap::Parser;
use log::LevelFilter;
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod config;
mod report;

use config::AppConfig;
use report::JsonLinesOutput;

#[derive(Parser, Debug)]
#[command(name = "cep")]
#[command(about = "Detect event patterns in JSON Lines streams", long_about = None)]
#[command(version)]
struct Args {
    /// Path to config.toml file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Input files (override [input] files from the config)
    #[arg(short, long, value_name = "FILE")]
    input: Vec<PathBuf>,

    /// Directory for <input>.matches.jsonl files (default: stdout for a single input)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Verbose output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("CEP CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using cep-engine v{}", cep_engine::VERSION);

    let config = config::load_config(&args.config)?;
    log::debug!("Configuration loaded from {:?}", args.config);

    let inputs = if args.input.is_empty() {
        config.input.files.clone()
    } else {
        args.input.clone()
    };
    if inputs.is_empty() {
        bail!("No input files given (use --input or [input] files)");
    }

    let output_dir = args.output_dir.clone().or_else(|| config.output.output_dir.clone());
    if output_dir.is_none() && inputs.len() > 1 {
        bail!("Several inputs need an output directory (use --output-dir or [output] output_dir)");
    }
    if let Some(dir) = &output_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {:?}", dir))?;
    }

    let pattern = Arc::new(config.pattern.build()?);
    log::info!(
        "Pattern: {} positive / {} negated events, window {} ms",
        pattern.positive_events().len(),
        pattern.negated_events().len(),
        config.pattern.window_ms
    );

    let results: Vec<(&PathBuf, Result<EvaluationSummary>)> = inputs
        .par_iter()
        .map(|path| (path, run_file(path, &pattern, &config, output_dir.as_deref())))
        .collect();

    let mut failed = 0;
    for (path, result) in results {
        match result {
            Ok(summary) => log::info!("{:?}: {}", path, summary),
            Err(e) => {
                log::error!("{:?}: {:#}", path, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} input file(s) failed", failed, inputs.len());
    }
    Ok(())
}

/// Evaluate one input file with its own engine
fn run_file(
    path: &Path,
    pattern: &Arc<Pattern>,
    config: &AppConfig,
    output_dir: Option<&Path>,
) -> Result<EvaluationSummary> {
    let file =
        File::open(path).with_context(|| format!("Failed to open input file: {:?}", path))?;
    let mut input = LineInput::new(BufReader::new(file));

    let mut engine = EvaluationEngine::new(Arc::clone(pattern), config.engine.clone())
        .with_context(|| format!("Failed to build engine for {:?}", path))?;
    log::debug!("{:?}: initial tree {}", path, engine.structure_summary());

    match output_dir {
        Some(dir) => {
            let out_path = report::output_path(dir, path);
            let out = File::create(&out_path)
                .with_context(|| format!("Failed to create output file: {:?}", out_path))?;
            let mut output = JsonLinesOutput::new(BufWriter::new(out));
            let summary = evaluate(&mut engine, &mut input, &mut output, config, path)?;
            log::info!("{:?}: {} match(es) written to {:?}", path, output.written(), out_path);
            Ok(summary)
        }
        None => {
            let stdout = io::stdout();
            let mut output = JsonLinesOutput::new(stdout.lock());
            evaluate(&mut engine, &mut input, &mut output, config, path)
        }
    }
}

fn evaluate<O: OutputStream, R: io::BufRead>(
    engine: &mut EvaluationEngine,
    input: &mut LineInput<R>,
    output: &mut O,
    config: &AppConfig,
    path: &Path,
) -> Result<EvaluationSummary> {
    let summary = engine
        .eval(input, output, &config.input.formatter())
        .with_context(|| format!("Evaluation of {:?} failed", path))?;
    log::debug!("{:?}: final tree {}", path, engine.structure_summary());
    Ok(summary)
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
