use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use burstwatch::config::{Config, LoggingConfig};

#[derive(Parser)]
#[command(
    name = "burstwatch",
    about = "Burst alerting over classified security logs",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (auto-refresh scheduler + API server)
    Serve {
        /// Bind address (overrides [server] bind)
        #[arg(long)]
        bind: Option<String>,

        /// Config file path
        #[arg(long, env = "BURSTWATCH_CONFIG")]
        config: Option<PathBuf>,

        /// JSON log output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Run one fetch/classify/detect cycle and print the alerts it raised
    Once {
        /// Config file path
        #[arg(long, env = "BURSTWATCH_CONFIG")]
        config: Option<PathBuf>,

        /// Log entries to fetch (overrides [feed] log_limit)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the effective alert rule table
    Rules {
        /// Config file path
        #[arg(long, env = "BURSTWATCH_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Validate the configuration and exit
    CheckConfig {
        /// Config file path
        #[arg(long, env = "BURSTWATCH_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn init_tracing(logging: &LoggingConfig, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json || logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolve configuration, start logging with it, then report where it
/// came from.
fn load_config(explicit: Option<&Path>, json: bool) -> Result<Config> {
    let path = Config::locate(explicit);
    let config = Config::resolve(path.as_deref())?;
    init_tracing(&config.logging, json);
    match &path {
        Some(path) => tracing::info!(
            path = %path.display(),
            rules = config.rules.len(),
            "configuration loaded"
        ),
        None => tracing::info!(rules = config.rules.len(), "no config file found, using defaults"),
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, config, json } => {
            let mut config = load_config(config.as_deref(), json)?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting burstwatch daemon");
            burstwatch::serve(config).await?;
        }
        Commands::Once { config, limit } => {
            let mut config = load_config(config.as_deref(), false)?;
            if let Some(limit) = limit {
                config.feed.log_limit = limit;
                config.validate()?;
            }

            let report = burstwatch::run_once(&config)
                .await
                .context("refresh cycle failed")?;

            println!("\n=== burstwatch refresh ===");
            println!("{}", report.summary());
            if report.new_alerts.is_empty() {
                println!("No alerts raised.");
            } else {
                println!();
                println!("{:<10} | {:<35} | {:<16} | Events", "Severity", "Title", "Source");
                println!("{:-<10}-|-{:-<35}-|-{:-<16}-|-{:-<6}", "", "", "", "");
                for alert in &report.new_alerts {
                    println!(
                        "{:<10} | {:<35} | {:<16} | {}",
                        alert.severity.to_string(),
                        alert.title,
                        alert.source_ip.as_deref().unwrap_or("-"),
                        alert.event_count
                    );
                    println!("{:<10} |   -> {}", "", alert.message);
                }
            }
            println!();
        }
        Commands::Rules { config } => {
            let config = Config::resolve(config.as_deref())?;
            println!(
                "{:<30} | {:<22} | {:>9} | {:>7} | Severity",
                "Type", "Watches", "Threshold", "Window"
            );
            println!("{:-<30}-|-{:-<22}-|-{:->9}-|-{:->7}-|-{:-<8}", "", "", "", "", "");
            for rule in &config.rules {
                println!(
                    "{:<30} | {:<22} | {:>9} | {:>6}s | {}",
                    rule.rule_type.as_str(),
                    rule.watched_classification,
                    rule.threshold,
                    rule.window_seconds,
                    rule.severity
                );
            }
        }
        Commands::CheckConfig { config } => {
            let config = Config::resolve(config.as_deref())?;
            println!(
                "Configuration OK: {} rules, refresh every {}s, feed {}",
                config.rules.len(),
                config.scheduler.interval_secs,
                config.feed.search_url
            );
        }
    }

    Ok(())
}
