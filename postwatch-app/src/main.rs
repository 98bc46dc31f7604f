use anyhow::{Context, Result};
use clap::Parser;
use monitor::{Monitor, MonitorSettings};
use postwatch_common::observability::init_logging;
use postwatch_config::{PostwatchConfig, PostwatchConfigLoader};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiring::{build_feed_client, build_notifier, log_config};

mod discord;
mod monitor;
mod seen;
mod wiring;

/// Watch a Truth Social RSS feed and forward new posts to Discord.
#[derive(Debug, Parser)]
#[command(name = "postwatch", version)]
struct Args {
    /// YAML configuration file; must exist when given.
    #[arg(short, long, env = "POSTWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single cycle and exit. Everything in the feed counts as new.
    #[arg(long)]
    once: bool,

    /// Log posts instead of sending them.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1) Load config (env wins)
    let loader = match &args.config {
        Some(path) => PostwatchConfigLoader::new().with_file(path),
        None => PostwatchConfigLoader::new().with_default_locations(),
    };
    let cfg: PostwatchConfig = loader.load().context("loading configuration")?;

    // 2) Logging from the loaded config
    let log_path = init_logging(log_config(&cfg.log)?)?;
    tracing::info!(
        log = %log_path.display(),
        feed = %cfg.feed.url,
        dry_run = args.dry_run,
        "postwatch.starting"
    );

    // 3) Pipeline
    let feed = Arc::new(build_feed_client(&cfg)?);
    let notifier = build_notifier(&cfg, args.dry_run)?;
    let mut settings = MonitorSettings::from(&cfg.poll);
    settings.notify_on_startup |= args.once;
    let mut monitor = Monitor::new(feed, notifier, settings);

    if args.once {
        let report = monitor.run_cycle().await?;
        tracing::info!(
            fetched = report.fetched,
            delivered = report.delivered,
            failed = report.failed,
            "postwatch.once"
        );
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("postwatch.ctrl_c");
        }
        on_signal.cancel();
    });

    monitor.run(cancel).await;
    Ok(())
}
