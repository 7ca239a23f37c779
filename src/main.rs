//! Packweight scenario runner
//!
//! Usage:
//!   packweight --config packweight.toml --scenario trip.json
//!   packweight --dump-config > packweight.toml
//!
//! Runs a scripted scenario against the weight engine and prints every
//! published sync event as one JSON object per line, followed by one
//! `final` line per remaining actor.

use clap::Parser;
use packweight::config_file;
use packweight::scenario::Scenario;
use packweight_core::WeightConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "packweight", about = "Inventory weight and encumbrance engine")]
struct Cli {
    /// Path to config file (TOML). Missing or invalid files fall back to defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scenario to run (JSON).
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Dump default config as TOML and exit.
    #[arg(long)]
    dump_config: bool,

    /// Log as JSON instead of plain text.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.dump_config {
        println!("{}", config_file::to_toml(&WeightConfig::default()));
        return Ok(());
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "packweight=info,packweight_engine=info".into());
    // Logs go to stderr; stdout carries the event stream.
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let config = match cli.config {
        Some(path) => config_file::load(&path),
        None => WeightConfig::default(),
    };

    let Some(path) = cli.scenario else {
        anyhow::bail!("--scenario is required (or pass --dump-config)");
    };
    let scenario = Scenario::load(&path)?;
    let report = scenario.run(config).await?;

    for event in &report.events {
        println!("{}", serde_json::to_string(event)?);
    }
    for summary in &report.actors {
        let mut line = serde_json::to_value(summary)?;
        line["type"] = serde_json::Value::from("final");
        println!("{}", line);
    }
    Ok(())
}
