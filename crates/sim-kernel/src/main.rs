//! `sim-kernel` command line

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use sim_kernel::Report;
use sim_schema::SchemaKind;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sim-kernel", version, about = "Scenario direction kernel tooling")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate a JSON payload against a contract
    Validate {
        /// Contract name, e.g. director_settings
        #[arg(long, value_parser = parse_kind)]
        kind: SchemaKind,
        /// Payload file
        file: PathBuf,
    },
    /// Compile a raw parser payload into outline and settings
    Compile {
        /// Parsed scenario file
        file: PathBuf,
        /// Narrative file attached to the outline
        #[arg(long)]
        narrative: Option<PathBuf>,
        /// Advisor instructions attached to the outline
        #[arg(long)]
        instructions: Option<String>,
    },
    /// Print JSON Schemas
    Schema {
        /// Single contract; all when omitted
        #[arg(value_parser = parse_kind)]
        kind: Option<SchemaKind>,
    },
    /// Verify a persisted session snapshot
    VerifySnapshot {
        /// Snapshot file
        file: PathBuf,
    },
}

fn parse_kind(s: &str) -> Result<SchemaKind, String> {
    s.parse()
}

async fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_report(report: &Report, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.generate_text());
        if let Some(output) = &report.output {
            println!("{}", serde_json::to_string_pretty(output)?);
        }
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let report = match cli.command {
        Command::Validate { kind, file } => sim_kernel::validate(kind, &read_json(&file).await?),
        Command::Compile {
            file,
            narrative,
            instructions,
        } => {
            let narrative = match narrative {
                Some(path) => Some(
                    tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("reading {}", path.display()))?,
                ),
                None => None,
            };
            sim_kernel::compile(
                &read_json(&file).await?,
                narrative.as_deref(),
                instructions.as_deref(),
            )?
        }
        Command::Schema { kind } => {
            println!("{}", serde_json::to_string_pretty(&sim_kernel::schema(kind))?);
            return Ok(());
        }
        Command::VerifySnapshot { file } => sim_kernel::verify_snapshot(read_json(&file).await?)?,
    };

    print_report(&report, cli.json)?;
    std::process::exit(if report.passed() { 0 } else { 1 });
}
