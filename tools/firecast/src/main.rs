//! Fire-probability forecasting CLI: trains a MaxEnt model on a training-epoch
//! raster stack and presence points, then scores a forecast-epoch stack.
//!
//! Rasters and point collections are resolved by id inside a data directory
//! (`<id>.tif`, `<id>.json`, `<id>.geojson`).

mod catalog;
mod geotiff;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use firecast_core::loader::load_stack;
use firecast_core::{pipeline, FittedModel, RunConfig, StackInput};
use log::LevelFilter;
use serde::Serialize;

use catalog::DirectoryCatalog;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "firecast", version, about = "Presence/background MaxEnt fire-probability forecasts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline: sample, join, assemble, fit and score
    Train(TrainArgs),
    /// Apply a saved model to a raster stack
    Score(ScoreArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Run configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Directory holding rasters and point collections
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Output directory (created if absent)
    #[arg(short, long, default_value = "out")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ScoreArgs {
    /// Fitted model written by `train`
    #[arg(short, long)]
    model: PathBuf,

    /// Directory holding rasters
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Stack band as `ID` or `ID=BAND` (repeatable)
    #[arg(short, long = "input", required = true, value_parser = parse_stack_input)]
    inputs: Vec<StackInput>,

    /// Output probability raster (JSON)
    #[arg(short, long, default_value = "probability.json")]
    output: PathBuf,
}

fn parse_stack_input(s: &str) -> std::result::Result<StackInput, String> {
    match s.split_once('=') {
        Some((id, band)) if !id.is_empty() && !band.is_empty() => Ok(StackInput::renamed(id, band)),
        Some(_) => Err(format!("expected ID=BAND, got '{s}'")),
        None if !s.is_empty() => Ok(StackInput::new(s)),
        None => Err("empty raster id".to_string()),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Write failed: {}", path.display()))
}

// ── Commands ─────────────────────────────────────────────────────────────────

fn train(args: &TrainArgs) -> Result<()> {
    let text = fs::read_to_string(&args.config)
        .with_context(|| format!("Cannot read {}", args.config.display()))?;
    let config = RunConfig::from_json(&text)
        .with_context(|| format!("Failed to parse {}", args.config.display()))?;

    let catalog = DirectoryCatalog::new(&args.data_dir);
    let out = pipeline::run(&config, &catalog, &catalog)?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Cannot create {}", args.output.display()))?;
    write_json(&args.output.join("probability.json"), &out.probability)?;
    write_json(&args.output.join("model.json"), &out.model)?;
    write_json(&args.output.join("training_set.json"), &out.training_set)?;
    write_json(&args.output.join("report.json"), &out.report)?;

    let r = &out.report;
    if !r.converged {
        log::warn!("model did not converge after {} sweeps; outputs use the last iterate", r.iterations);
    }
    for c in &r.contributions {
        log::info!("  {:<24} {:6.2}%", c.variable, c.percent);
    }
    log::info!("wrote outputs to {}", args.output.display());
    Ok(())
}

fn score(args: &ScoreArgs) -> Result<()> {
    let text = fs::read_to_string(&args.model)
        .with_context(|| format!("Cannot read {}", args.model.display()))?;
    let model: FittedModel = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse model {}", args.model.display()))?;
    if model.lambdas.len() != model.features.features.len() {
        bail!(
            "model {} is inconsistent: {} weights for {} features",
            args.model.display(),
            model.lambdas.len(),
            model.features.features.len()
        );
    }

    let catalog = DirectoryCatalog::new(&args.data_dir);
    let stack = load_stack(&catalog, "forecast", &args.inputs, None)?;
    let probability = model.score_stack(&stack)?;
    write_json(&args.output, &probability)?;
    log::info!("scored {} pixels into {}", probability.data.len(), args.output.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Warn)
        .parse_env(env_logger::Env::default().filter_or("FIRECAST_LOG", "info"))
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Train(args) => train(args),
        Command::Score(args) => score(args),
    }
}
