use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use acestream_scraper::{
    config::Config,
    database::Database,
    epg::EpgService,
    orchestrator::Orchestrator,
    repositories::Repositories,
    sources::ScraperRegistry,
    status::{EngineClient, StatusChecker},
    utils::retry::RetryConfig,
};

#[derive(Parser)]
#[command(name = "acestream-scraper")]
#[command(version)]
#[command(about = "Scrapes acestream channels, checks their liveness and matches EPG data")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Acestream engine URL or port (overrides config file)
    #[arg(short = 'e', long, value_name = "URL")]
    engine_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until interrupted
    Run,
    /// Check the liveness of every active channel once
    Check,
    /// Fetch EPG feeds and reconcile channel metadata once
    RefreshEpg,
    /// Register a source to scrape
    AddSource { url: String },
    /// Register an XMLTV feed
    AddEpgSource {
        url: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Add a name pattern, prefix with '!' to exclude matching channels
    AddMapping {
        pattern: String,
        target_epg_id: Option<String>,
    },
    /// Freeze a channel's EPG fields
    Lock { channel_id: String },
    /// Allow EPG updates on a channel again
    Unlock { channel_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("acestream_scraper={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Acestream Scraper v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config))?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }
    if let Some(engine_url) = cli.engine_url {
        config.engine.url = engine_url;
    }
    config.validate()?;

    info!("Using database: {}", config.database.url);
    let database = Database::open(&config.database).await?;
    info!("Database connection established and migrations applied");

    let repositories = Repositories::from_store(Arc::new(database));
    let retry = RetryConfig::from(&config.scheduler);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config, repositories, retry).await,
        Command::Check => {
            let engine = Arc::new(EngineClient::new(&config.engine)?);
            log_engine_status(&engine).await;
            let checker =
                StatusChecker::new(engine, repositories.channels.clone(), config.checker, retry);
            let channels = repositories.channels.list_active_channels().await?;
            let summary = checker.check_all(&channels, &CancellationToken::new()).await;
            println!(
                "{} channels checked: {} online, {} offline, {} errors",
                summary.total, summary.online, summary.offline, summary.errors
            );
            Ok(())
        }
        Command::RefreshEpg => {
            let service = EpgService::new(repositories, config.epg, retry)?;
            match service.refresh().await? {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => println!("An EPG refresh is already running"),
            }
            Ok(())
        }
        Command::AddSource { url } => {
            let source = repositories.sources.register(&url).await?;
            println!("Source {} is {}", source.url, source.status);
            Ok(())
        }
        Command::AddEpgSource { url, name } => {
            let source = repositories
                .epg_sources
                .add_epg_source(&url, name.as_deref())
                .await?;
            println!("EPG source #{} added: {}", source.id, source.display_name());
            Ok(())
        }
        Command::AddMapping {
            pattern,
            target_epg_id,
        } => {
            let mapping = repositories
                .pattern_mappings
                .add_pattern_mapping(&pattern, target_epg_id.as_deref())
                .await?;
            println!("Pattern mapping #{} added", mapping.id);
            Ok(())
        }
        Command::Lock { channel_id } => {
            let service = EpgService::new(repositories, config.epg, retry)?;
            set_protection(&service, &channel_id, true).await
        }
        Command::Unlock { channel_id } => {
            let service = EpgService::new(repositories, config.epg, retry)?;
            set_protection(&service, &channel_id, false).await
        }
    }
}

async fn run(config: Config, repositories: Repositories, retry: RetryConfig) -> Result<()> {
    let engine = Arc::new(EngineClient::new(&config.engine)?);
    log_engine_status(&engine).await;

    let scraper = Arc::new(ScraperRegistry::with_defaults()?);
    let epg = Arc::new(EpgService::new(repositories.clone(), config.epg.clone(), retry)?);

    let mut orchestrator =
        Orchestrator::new(repositories.clone(), scraper, config.scheduler.clone())
            .with_epg_refresh(epg, config.epg.refresh_interval);
    if let Some(interval) = config.checker.interval {
        let checker = Arc::new(StatusChecker::new(
            engine,
            repositories.channels.clone(),
            config.checker.clone(),
            retry,
        ));
        orchestrator = orchestrator.with_status_checks(checker, interval);
        info!("Scheduled status checks every {:?}", interval);
    }

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal.cancel();
            }
            Err(e) => warn!("Could not listen for shutdown signal: {}", e),
        }
    });

    orchestrator.run(cancel).await?;
    Ok(())
}

async fn log_engine_status(engine: &EngineClient) {
    let status = engine.engine_status().await;
    if status.available {
        info!(
            "{} (platform {}, playlist loaded: {}, connected: {})",
            status.message,
            status.platform.as_deref().unwrap_or("Unknown"),
            status.playlist_loaded.unwrap_or(false),
            status.connected.unwrap_or(false)
        );
    } else {
        warn!("{}", status.message);
    }
}

async fn set_protection(service: &EpgService, channel_id: &str, protected: bool) -> Result<()> {
    service.set_protection(channel_id, protected).await?;
    println!(
        "Channel {} {}",
        channel_id,
        if protected { "locked" } else { "unlocked" }
    );
    Ok(())
}
