use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};
use viewsync_cache::TokioScheduler;
use viewsync_core::{ConfigManager, LoggingConfig};

mod replay;

use replay::{parse_events, read_views, Replay};

#[derive(Parser)]
#[command(name = "viewsync")]
#[command(about = "ViewSync CLI - Inspect configuration and replay event logs against cached views", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Configuration file (defaults to .viewsync.toml, then ~/.viewsync/config.toml)
    #[arg(short, long, global = true, env = "VIEWSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the configuration
    CheckConfig,

    /// Seed views from a file and replay a JSONL event log against them
    Replay {
        /// Resource namespace the events belong to
        #[arg(short, long)]
        resource: String,

        /// JSON array of {params, result} objects
        #[arg(long)]
        views: PathBuf,

        /// JSONL file with one {kind, payload} object per line
        #[arg(long)]
        events: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::load_from(path),
        None => ConfigManager::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&manager.config().logging, cli.verbose);

    match execute_command(&cli, &manager).await {
        Ok(output) => {
            print_output(&cli.output, &output)?;
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let fmt = match logging.format.as_str() {
        "json" => fmt.json().boxed(),
        "compact" => fmt.compact().boxed(),
        _ => fmt.pretty().boxed(),
    };

    tracing_subscriber::registry().with(filter).with(fmt).init();
}

async fn execute_command(cli: &Cli, manager: &ConfigManager) -> Result<serde_json::Value> {
    match &cli.command {
        Commands::CheckConfig => execute_check_config(manager),
        Commands::Replay {
            resource,
            views,
            events,
        } => execute_replay(manager, resource, views, events).await,
    }
}

fn execute_check_config(manager: &ConfigManager) -> Result<serde_json::Value> {
    let config = manager.config();
    let resources: Vec<serde_json::Value> = config
        .resources
        .iter()
        .map(|r| {
            let decoder = r.decoder();
            json!({
                "namespace": r.namespace,
                "singular": decoder.singular(),
                "plural": decoder.plural(),
                "search_fields": r.search_fields.len() + r.search_concat.len(),
                "filters": r.filters.keys().collect::<Vec<_>>(),
            })
        })
        .collect();

    Ok(json!({
        "config_path": manager
            .config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(defaults)".to_string()),
        "debounce_ms": config.debounce_ms,
        "log_level": config.logging.level,
        "log_format": config.logging.format,
        "resources": resources,
    }))
}

async fn execute_replay(
    manager: &ConfigManager,
    resource: &str,
    views: &Path,
    events: &Path,
) -> Result<serde_json::Value> {
    let seeded = read_views(views)?;
    let raw = std::fs::read_to_string(events)
        .with_context(|| format!("Failed to read event log {}", events.display()))?;
    let (events, skipped) = parse_events(&raw);

    let scheduler = TokioScheduler::try_current().context("No tokio runtime available")?;
    let replay = Replay::new(manager.config(), resource, Arc::new(scheduler));
    replay.seed(seeded)?;

    let (applied, changed) = replay.apply(&events)?;
    let version = replay.settle().await?;
    let summary = replay.summary(applied, skipped, changed, version)?;

    serde_json::to_value(summary).context("Failed to serialize replay summary")
}

fn print_output(format: &OutputFormat, value: &serde_json::Value) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Pretty => {
            print_pretty(value)?;
        }
    }
    Ok(())
}

fn print_pretty(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                let key_colored = key.cyan().bold();
                match val {
                    serde_json::Value::String(s) => {
                        println!("{}: {}", key_colored, s.green());
                    }
                    serde_json::Value::Number(n) => {
                        println!("{}: {}", key_colored, n.to_string().yellow());
                    }
                    serde_json::Value::Array(arr) if arr.is_empty() => {
                        println!("{}: {}", key_colored, "none".dimmed());
                    }
                    serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                        println!("{}:", key_colored);
                        println!("{}", serde_json::to_string_pretty(val)?);
                    }
                    _ => {
                        println!("{}: {}", key_colored, val);
                    }
                }
            }
        }
        _ => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}
