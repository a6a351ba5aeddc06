mod cycle;
mod filters;
mod scheduler;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use popwatch_bluesky::BlueskyClient;
use popwatch_core::{load_hashtags, AppConfig, HashtagTable, LedgerStore};
use popwatch_scraper::{ImageStore, StorefrontClient, StorefrontOptions};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::cycle::{CheckCycle, CycleSettings};

#[derive(Debug, Parser)]
#[command(name = "popwatch")]
#[command(about = "Watches the Funko storefront and posts new items to Bluesky")]
struct Cli {
    /// Post from the test account when one is configured.
    #[arg(long)]
    test_mode: bool,

    /// Run a single check cycle and exit.
    #[arg(long)]
    once: bool,

    /// Log what would be posted without posting.
    #[arg(long)]
    dry_run: bool,

    /// Tracing filter, overriding `RUST_LOG` and `LOG_LEVEL`.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match popwatch_core::load_app_config() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(cli.log_level.as_deref().unwrap_or("info"), cli.log_level.is_some());
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    config.test_mode |= cli.test_mode;
    config.dry_run |= cli.dry_run;
    if let Some(level) = &cli.log_level {
        config.log_level.clone_from(level);
    }
    init_tracing(&config.log_level, cli.log_level.is_some());

    match run(config, cli.once).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = format!("{e:#}");
            tracing::error!(error = %message, "fatal error");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_level: &str, cli_override: bool) {
    let from_env = if cli_override {
        None
    } else {
        EnvFilter::try_from_default_env().ok()
    };
    let env_filter = from_env
        .or_else(|| EnvFilter::try_new(log_level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

async fn run(config: AppConfig, once: bool) -> anyhow::Result<()> {
    tracing::info!(?config, "starting popwatch");
    if config.test_mode && config.bluesky_test.is_none() {
        tracing::warn!("test mode requested but no test account configured, using main account");
    }
    if config.dry_run {
        tracing::info!("dry run enabled, nothing will be posted");
    }

    let hashtags = match &config.hashtags_path {
        Some(path) => load_hashtags(path)?,
        None => HashtagTable::bundled(),
    };

    let storefront = StorefrontClient::new(&StorefrontOptions {
        region: config.funko_region.clone(),
        timeout_secs: config.request_timeout_secs,
        delay_min_secs: config.scrape_delay_min_secs,
        delay_max_secs: config.scrape_delay_max_secs,
        ..StorefrontOptions::default()
    })?;
    let images = ImageStore::new(config.images_dir(), config.request_timeout_secs)?;

    let credentials = config.active_credentials();
    let bluesky = BlueskyClient::new(&config.bluesky_service_url, config.request_timeout_secs)?;
    bluesky
        .login(&credentials.handle, &credentials.app_password)
        .await
        .with_context(|| format!("Bluesky login failed for {}", credentials.handle))?;

    let cycle = CheckCycle::new(
        Arc::new(storefront),
        Arc::new(images),
        Arc::new(bluesky),
        LedgerStore::new(config.ledger_path()),
        hashtags,
        CycleSettings::from_config(&config),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let token = shutdown.clone();
        async move {
            shutdown_signal().await;
            token.cancel();
        }
    });

    scheduler::run(
        || cycle.run(Utc::now()),
        config.check_interval(),
        once,
        shutdown,
    )
    .await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, finishing current check before exit");
}
