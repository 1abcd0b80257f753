//! FlightLens CLI
//!
//! Command-line interface for FlightLens:
//! - Run the API server
//! - Inspect local DataFlash logs (index, stats, dumps, parameters, modes)
//! - Export one message type as CSV
//! - Generate a synthetic flight log
//! - Write a default config file

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use flightlens::api::{serve, AppState};
use flightlens::config::{generate_default_config, Config};
use flightlens::index::build_index;
use flightlens::logging::init_tracing;
use flightlens::persistence::open_store;
use flightlens::query::QueryEngine;
use flightlens::session::AnalysisSession;
use flightlens::telemetry::demo::write_demo_flight;
use flightlens::telemetry::DataflashSource;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "flightlens")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Flight log explorer for ArduPilot DataFlash logs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the API server
    Serve {
        /// Config file (default: search the usual locations)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Index a log and list its message types
    Analyze {
        /// Path to a .BIN log
        file: PathBuf,
    },

    /// Record totals and time span
    Stats {
        file: PathBuf,
    },

    /// Print the first records of one message type
    Dump {
        file: PathBuf,
        /// Message type, e.g. GPS
        #[arg(short = 't', long = "type")]
        msg_type: String,
        /// Maximum records to print
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Final value of every parameter
    Params {
        file: PathBuf,
    },

    /// Flight mode segments
    Modes {
        file: PathBuf,
    },

    /// Export one message type as CSV
    Export {
        file: PathBuf,
        /// Message type, e.g. BARO
        #[arg(short, long)]
        msg: String,
        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Write a synthetic copter flight
    Demo {
        /// Output .BIN path
        out: PathBuf,
        /// Flight length in seconds
        #[arg(short, long, default_value = "300")]
        seconds: u32,
    },

    /// Generate default config file
    InitConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let json = match cli.format.as_str() {
        "json" => true,
        "table" => false,
        other => bail!("unknown output format: {} (use table or json)", other),
    };
    let engine = QueryEngine::new(Arc::new(DataflashSource));

    match cli.command {
        Commands::Serve { config } => {
            let config = match config {
                Some(path) => Config::load_with_env(&path)
                    .with_context(|| format!("failed to load config from {}", path.display()))?,
                None => Config::load_default(),
            };
            init_tracing(&config.logging).context("failed to initialize tracing")?;

            let profiles = open_store(&config.persistence);
            let state = AppState::new(&config, profiles);
            let reaper = Arc::clone(&state.assembler).start_reaper();
            serve(state, &config.api).await?;
            reaper.abort();
        }

        Commands::Analyze { file } => {
            let session = open_log(&file)?;
            if json {
                return print_json(&session.index);
            }

            println!("{} ({} bytes)", session.filename, session.file_size);
            println!("{:<8} {:>10}  Numeric fields", "Type", "Records");
            println!("{}", "-".repeat(60));
            for (name, info) in &session.index.messages {
                println!("{:<8} {:>10}  {}", name, info.count, info.fields.join(", "));
            }
            println!();
            println!(
                "{} records, {} message types, {} flight modes",
                session.index.total_records(),
                session.index.messages.len(),
                session.index.flight_modes.len()
            );
        }

        Commands::Stats { file } => {
            let session = open_log(&file)?;
            let stats = engine.stats(&session)?;
            if json {
                return print_json(&stats);
            }

            println!("Total messages: {}", stats.total_messages);
            println!("Message types:  {}", stats.message_types);
            println!("First:          {}", format_time(stats.first_timestamp));
            println!("Last:           {}", format_time(stats.last_timestamp));
            println!("Duration:       {}", format_duration(stats.duration_seconds));
        }

        Commands::Dump {
            file,
            msg_type,
            limit,
        } => {
            let session = open_log(&file)?;
            let entries = engine.dump(&session, &msg_type, limit)?;
            if json {
                return print_json(&entries);
            }

            if entries.is_empty() {
                println!("No {} records", msg_type);
            }
            for entry in entries {
                let fields: Vec<String> = entry
                    .data
                    .iter()
                    .map(|(name, value)| format!("{}={}", name, value))
                    .collect();
                println!("{:>10}  {}", format_time(entry.timestamp), fields.join(" "));
            }
        }

        Commands::Params { file } => {
            let session = open_log(&file)?;
            let params = engine.params(&session)?;
            if json {
                return print_json(&params);
            }

            for (name, value) in &params {
                println!("{:<20} {}", name, value);
            }
            println!("{} parameters", params.len());
        }

        Commands::Modes { file } => {
            let session = open_log(&file)?;
            let modes = engine.flight_modes(&session);
            if json {
                return print_json(&modes);
            }

            if modes.is_empty() {
                println!("No flight modes recorded");
            }
            for mode in modes {
                println!(
                    "{:<14} {:>10} → {:>10}  ({})",
                    mode.mode,
                    format_time(Some(mode.start)),
                    format_time(Some(mode.end)),
                    format_duration(mode.duration)
                );
            }
        }

        Commands::Export { file, msg, out } => {
            let session = open_log(&file)?;
            let csv = engine.export_csv(&session, &msg)?;

            match out {
                Some(path) => {
                    std::fs::write(&path, &csv)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("Wrote {} bytes to {}", csv.len(), path.display());
                }
                None => std::io::stdout().write_all(&csv)?,
            }
        }

        Commands::Demo { out, seconds } => {
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            write_demo_flight(std::io::BufWriter::new(file), seconds)?;
            println!("Wrote {}s synthetic flight to {}", seconds, out.display());
        }

        Commands::InitConfig { output } => {
            let config = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, config)?;
                    println!("Config written to {}", path.display());
                }
                None => print!("{}", config),
            }
        }
    }

    Ok(())
}

/// Index a local log without copying it anywhere
fn open_log(path: &Path) -> anyhow::Result<AnalysisSession> {
    let file_size = std::fs::metadata(path)
        .with_context(|| format!("cannot read {}", path.display()))?
        .len();
    let index = build_index(&DataflashSource, path)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let work_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    Ok(AnalysisSession::new(
        work_dir,
        path.to_path_buf(),
        index,
        file_size,
        None,
    ))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_time(seconds: Option<f64>) -> String {
    seconds
        .map(|s| format!("{:.3}s", s))
        .unwrap_or_else(|| "-".to_string())
}

fn format_duration(seconds: f64) -> String {
    let whole = seconds.max(0.0) as u64;
    if whole < 60 {
        format!("{:.1}s", seconds)
    } else if whole < 3600 {
        format!("{}m {}s", whole / 60, whole % 60)
    } else {
        format!("{}h {}m", whole / 3600, (whole % 3600) / 60)
    }
}
