use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use poa_approvals::{
    ApprovalService, SledReportStore, config::ApprovalConfig, http, planning::PlanningFixture,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(short, long, global = true)]
    log_level: Option<String>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the approval API over HTTP
    Serve {
        #[clap(short, long, default_value = "poa.db")]
        database: PathBuf,
        #[clap(short, long)]
        config: Option<PathBuf>,
        #[clap(short, long, default_value = "127.0.0.1:3000")]
        bind: String,
        /// Seconds between outbox deliveries
        #[clap(long, default_value = "30")]
        relay_interval: u64,
    },
    /// Load departments, planning entities and users from a TOML file
    Import {
        #[clap(short, long, default_value = "poa.db")]
        database: PathBuf,
        fixture: PathBuf,
    },
}

const RELAY_BATCH: usize = 100;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    match cli.command {
        Command::Serve {
            database,
            config,
            bind,
            relay_interval,
        } => serve(database, config, bind, relay_interval).await,
        Command::Import { database, fixture } => import(database, fixture),
    }
}

async fn serve(
    database: PathBuf,
    config: Option<PathBuf>,
    bind: String,
    relay_interval: u64,
) -> Result<()> {
    let config = match config {
        Some(path) => ApprovalConfig::load(&path)?,
        None => ApprovalConfig::default(),
    };
    let store = SledReportStore::open(&database)
        .with_context(|| format!("failed to open database {}", database.display()))?;
    let service = Arc::new(ApprovalService::new(Arc::new(store), config));

    {
        let service = service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(relay_interval.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                let service = service.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    let handler = service.effect_handler();
                    service.relay_outbox(&handler, RELAY_BATCH)
                })
                .await;
                match outcome {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::error!("Outbox relay failed: {}", e),
                    Err(e) => tracing::error!("Outbox relay task panicked: {}", e),
                }
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("Serving approvals API on {}", bind);
    axum::serve(listener, http::router(service)).await?;

    Ok(())
}

fn import(database: PathBuf, fixture: PathBuf) -> Result<()> {
    let contents = std::fs::read_to_string(&fixture)
        .with_context(|| format!("failed to read {}", fixture.display()))?;
    let fixture = PlanningFixture::from_toml_str(&contents)?;
    let store = SledReportStore::open(&database)
        .with_context(|| format!("failed to open database {}", database.display()))?;

    let written = store.import(&fixture)?;
    info!("Imported {} records into {}", written, database.display());
    Ok(())
}

fn setup_logging(log_level: &Option<String>) {
    let log_level = match log_level
        .as_ref()
        .unwrap_or(&"info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("sled=warn,{}", log_level)))
        .init();
}
