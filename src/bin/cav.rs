//! CAV CLI - Command-line interface for the CAV engine
//!
//! Commands:
//! - score: Score NDJSON windows through a local model (batch mode)
//! - schema: Print the reference feature schema

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use cav_engine::config::EngineConfig;
use cav_engine::engine::CavEngine;
use cav_engine::features::FeatureSchema;
use cav_engine::types::{BatchItemResult, WindowPayload};
use cav_engine::ENGINE_VERSION;

/// CAV - Context-Aware Value scoring for physiological and environmental signals
#[derive(Parser)]
#[command(name = "cav")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Score sensor windows into CAV states", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score NDJSON windows from a file or stdin (one JSON object per line)
    Score {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Model artifact directory (model.json, feature_schema.json, scaler.json)
        #[arg(long)]
        model_dir: PathBuf,
    },

    /// Print the reference feature schema as JSON
    Schema,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Score { input, model_dir } => score(&input, model_dir),
        Commands::Schema => {
            let schema = FeatureSchema::reference();
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
    }
}

fn score(input: &PathBuf, model_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig {
        model_dir: Some(model_dir),
        ..EngineConfig::from_env()
    };
    let mut engine = CavEngine::from_artifacts(config)?;

    let reader: Box<dyn BufRead> = if input.as_os_str() == "-" {
        Box::new(io::BufReader::new(io::stdin()))
    } else {
        Box::new(io::BufReader::new(fs::File::open(input)?))
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let result = match serde_json::from_str::<WindowPayload>(&line) {
            Ok(WindowPayload::Raw(item)) => {
                match engine.score_window(&item.window, item.env(), item.local_hour) {
                    Ok(outcome) => BatchItemResult::success(&outcome),
                    Err(err) => BatchItemResult::failure(err.to_string()),
                }
            }
            Ok(WindowPayload::Features(item)) => {
                match engine.score_features(&item.features, item.env(), item.local_hour) {
                    Ok(outcome) => BatchItemResult::success(&outcome),
                    Err(err) => BatchItemResult::failure(err.to_string()),
                }
            }
            Err(err) => BatchItemResult::failure(format!("invalid input line: {err}")),
        };

        serde_json::to_writer(&mut out, &result)?;
        writeln!(out)?;
    }

    Ok(())
}
