use clap::Parser;
use newsbrief::config::Config;
use newsbrief::pipeline::{BriefingOutcome, BriefingService};
use newsbrief::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Run the briefing pipeline from the command line
#[derive(Parser, Debug)]
#[command(name = "newsbrief-worker", version, about)]
struct Args {
    /// Only fetch, enrich and store the search data
    #[arg(long, conflicts_with = "summarise_only")]
    scrape_only: bool,

    /// Only summarize the data already in the sheets
    #[arg(long)]
    summarise_only: bool,

    /// Ignore the cooldown window
    #[arg(long)]
    force: bool,

    /// Repeat the gated run every N minutes instead of exiting
    #[arg(long, value_name = "N", env = "WORKER_EVERY_MINUTES")]
    every_minutes: Option<u64>,
}

async fn run_once(service: &BriefingService, args: &Args) -> anyhow::Result<()> {
    if args.scrape_only {
        let stats = service.retrieve_and_store().await?;
        info!(?stats, "scrape finished");
        return Ok(());
    }
    if args.summarise_only {
        let summary = service.summarize().await?;
        println!("{}", summary);
        return Ok(());
    }

    match service.run_gated(args.force).await? {
        BriefingOutcome::Cached { remaining_hours, .. } => {
            info!("Cooldown active, {:.2} hours remaining; nothing to do", remaining_hours);
        }
        BriefingOutcome::Fresh { summary, .. } => {
            info!("Fresh briefing generated");
            println!("{}", summary);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let service: Arc<BriefingService> = AppState::from_config(config)?.service;

    let Some(minutes) = args.every_minutes else {
        return run_once(&service, &args).await;
    };

    info!("Worker starting; running every {} minutes", minutes);
    let mut ticker = interval(Duration::from_secs(minutes.max(1) * 60));
    loop {
        ticker.tick().await;
        info!("Running scheduled briefing...");
        if let Err(e) = run_once(&service, &args).await {
            error!(?e, "scheduled briefing failed");
        }
    }
}
