//! para CLI: run per-file extraction jobs on a worker pool.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use para::config::{Config, MapConfig, effective_pool_size};
use para::log::TracingSink;
use para::scan::{LineFilter, LineMatch};
use para::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "para", about = "Map a job over files on a pool of parallel workers")]
struct Cli {
    /// TOML file with a [map] table; overrides PARA_* environment variables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print matching lines from each file
    Scan {
        /// Files to scan
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Minimum line length, in characters
        #[arg(long, default_value_t = 100)]
        min_len: usize,
        /// Only lines containing this text
        #[arg(long)]
        contains: Option<String>,
        /// Number of parallel mappers (default: available parallelism)
        #[arg(long)]
        mappers: Option<usize>,
        /// Print one JSON object per match
        #[arg(long)]
        json: bool,
    },
    /// Show the effective pool configuration
    Config {
        /// Number of items the pool would be sized for
        #[arg(long, default_value_t = 1)]
        items: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(path) = &cli.config {
        config.map = MapConfig::load(path)?;
    }

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "para".to_string(),
        log_level: config.log_level.clone(),
    })?;

    match cli.command {
        Command::Scan {
            files,
            min_len,
            contains,
            mappers,
            json,
        } => {
            if mappers.is_some() {
                config.map.pool_size = mappers;
            }
            cmd_scan(&config.map, files, LineFilter { min_len, contains }, json).await
        }
        Command::Config { items } => cmd_config(&config.map, items),
    }
}

async fn cmd_scan(
    map_config: &MapConfig,
    files: Vec<PathBuf>,
    filter: LineFilter,
    json: bool,
) -> anyhow::Result<()> {
    let mut matches = para::map_with(filter, files, map_config, Arc::new(TracingSink))?;

    let mut count = 0usize;
    while let Some(found) = matches.next().await {
        let found = found?;
        print_match(&found, json)?;
        count += 1;
    }

    let reports = matches.shutdown().await;
    tracing::info!(matches = count, workers = reports.len(), "scan finished");
    Ok(())
}

fn print_match(found: &LineMatch, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(found)?);
    } else {
        println!("{}:{}: {}", found.path.display(), found.line_no, found.line);
    }
    Ok(())
}

fn cmd_config(map_config: &MapConfig, items: usize) -> anyhow::Result<()> {
    let requested = map_config
        .pool_size
        .map(|n| n.to_string())
        .unwrap_or("-".to_string());

    println!("Mappers:        {requested}");
    println!(
        "Effective:      {} (for {items} item(s))",
        effective_pool_size(map_config.pool_size, items)
    );
    println!("Output poll:    {}ms", map_config.output_poll.as_millis());
    println!("Claim timeout:  {}ms", map_config.claim_timeout.as_millis());
    println!("Log poll:       {}ms", map_config.log_poll.as_millis());
    println!("Preview length: {}", map_config.preview_len);
    Ok(())
}
