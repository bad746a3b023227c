use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use currency_exchange_backend::config::Settings;
use currency_exchange_backend::services::factory::SharedServices;
use currency_exchange_backend::workers::rate_ingestor::RateIngestor;

/// Background worker that continuously fetches exchange rates for the
/// configured pair set and publishes them. Runs independently of the API
/// server so rates stay fresh regardless of user traffic.
#[derive(Parser)]
#[command(name = "rate-ingestor")]
struct Args {
    /// Override WORKER_UPDATE_INTERVAL (seconds)
    #[arg(long)]
    interval: Option<u64>,

    /// Run one update cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut settings = Settings::from_env();
    if let Some(interval) = args.interval {
        settings.worker.update_interval_secs = interval;
    }
    settings
        .worker
        .validate()
        .map_err(|reason| anyhow::anyhow!("Invalid worker configuration: {reason}"))?;

    info!(
        base_currencies = ?settings.worker.base_currencies,
        target_currencies = ?settings.worker.target_currencies,
        total_pairs = settings.worker.total_pairs(),
        update_interval_secs = settings.worker.update_interval_secs,
        "rate ingestor starting"
    );

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL environment variable not set")?;
    let db = sea_orm::Database::connect(&database_url)
        .await
        .context("failed to connect to database")?;

    let worker_settings = settings.worker.clone();
    let services = SharedServices::build(db, settings).await?;
    let ingestor = RateIngestor::new(
        Arc::clone(&services.aggregator),
        Arc::clone(&services.cache),
        worker_settings,
    );

    if args.once {
        let summary = ingestor.run_cycle().await;
        info!(
            pairs_attempted = summary.pairs_attempted,
            pairs_succeeded = summary.pairs_succeeded,
            duration_secs = summary.duration.as_secs_f64(),
            "single cycle completed"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    ingestor.run(shutdown_rx).await;
    info!("rate ingestor exited cleanly");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(_) => {
            let _ = ctrl_c.await;
        }
    }
    info!("shutdown signal received");
}
