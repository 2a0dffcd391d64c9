use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tokio::sync::watch;
use tracing::{error, info, warn};

use tg_crossposter::approval::{ApprovalOrchestrator, ApprovalSettings};
use tg_crossposter::channels;
use tg_crossposter::config;
use tg_crossposter::db;
use tg_crossposter::dispatch::{rejected_continuation, DispatchEngine};
use tg_crossposter::notifier::TelegramNotifier;
use tg_crossposter::scheduler::{Scheduler, SchedulerConfig};
use tg_crossposter::telegram;
use tg_crossposter::webhook::{self, AppState};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
    /// Print an example config and exit
    #[arg(long)]
    example_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if args.example_config {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/crossposter.db", cfg.app.data_dir));
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let bot = Bot::new(cfg.telegram.bot_token.clone());
    let notifier = Arc::new(TelegramNotifier::new(bot.clone(), cfg.telegram.chat_id));

    let adapters = channels::build(&cfg);
    info!(channels = ?cfg.enabled_channels(), dry_run = cfg.app.dry_run, "configured publishing channels");

    let engine = Arc::new(DispatchEngine::new(
        pool.clone(),
        adapters,
        notifier.clone(),
        Duration::from_millis(cfg.app.inter_channel_delay_ms),
    ));
    let orchestrator = Arc::new(ApprovalOrchestrator::new(
        pool.clone(),
        notifier,
        ApprovalSettings {
            auto_approve: cfg.approval.auto_approve,
            timeout: Duration::from_secs(cfg.approval.timeout_minutes * 60),
            channels: cfg.enabled_channels(),
        },
    ));

    // Items left pending by a previous run get a fresh approval request.
    for item in db::pending_items(&pool).await? {
        match orchestrator
            .request_approval(
                item.id,
                engine.approved_continuation(),
                rejected_continuation(),
            )
            .await
        {
            Ok(true) => info!(item_id = item.id, "re-requested approval"),
            Ok(false) => warn!(item_id = item.id, "could not re-request approval"),
            Err(err) => error!(?err, item_id = item.id, "approval re-request failed"),
        }
    }

    let scheduler = Scheduler::new(
        pool.clone(),
        engine.clone(),
        SchedulerConfig {
            post_times: cfg.post_times(),
            dispatch_every: Duration::from_secs(cfg.app.dispatch_interval_secs),
            maintenance_every: Duration::from_secs(cfg.app.maintenance_interval_secs),
        },
    )
    .start();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = AppState {
        pool: pool.clone(),
        orchestrator: orchestrator.clone(),
        engine: engine.clone(),
        secret: cfg.webhook.secret.clone(),
        enabled_channels: cfg.enabled_channels(),
    };
    let bind = cfg.webhook.bind.clone();
    let webhook_task = tokio::spawn(async move {
        if let Err(err) = webhook::serve(state, &bind, shutdown_rx).await {
            error!(?err, "webhook server error");
        }
    });

    // Blocks until ctrl-c; decisions flow into the orchestrator meanwhile.
    telegram::run(bot, orchestrator).await;

    info!("shutting down");
    let _ = shutdown_tx.send(true);
    scheduler.stop().await;
    let _ = webhook_task.await;
    Ok(())
}
