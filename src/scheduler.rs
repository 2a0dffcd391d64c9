//! Cadence-driven re-discovery of approved work, plus periodic maintenance.
//! Overlapping fires are safe: the dispatch engine's in-flight guard turns
//! re-driving an already-dispatching item into a no-op.

use crate::db::{self, Pool};
use crate::dispatch::DispatchEngine;
use crate::model::ItemStatus;
use anyhow::Result;
use chrono::{DateTime, Days, NaiveTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Daily posting times, UTC.
    pub post_times: Vec<NaiveTime>,
    pub dispatch_every: Duration,
    pub maintenance_every: Duration,
}

pub struct Scheduler {
    pool: Pool,
    engine: Arc<DispatchEngine>,
    cfg: SchedulerConfig,
}

pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(pool: Pool, engine: Arc<DispatchEngine>, cfg: SchedulerConfig) -> Self {
        Self { pool, engine, cfg }
    }

    /// Spawn the cadence tasks. They stop cooperatively: a stop signal keeps
    /// them from firing again but never interrupts an in-progress cycle.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown, rx) = watch::channel(false);
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(interval_loop(
            self.pool.clone(),
            self.engine.clone(),
            self.cfg.dispatch_every,
            rx.clone(),
        )));
        if !self.cfg.post_times.is_empty() {
            tasks.push(tokio::spawn(clock_loop(
                self.pool.clone(),
                self.engine.clone(),
                self.cfg.post_times.clone(),
                rx.clone(),
            )));
        }
        tasks.push(tokio::spawn(maintenance_loop(
            self.pool,
            self.cfg.maintenance_every,
            rx,
        )));

        info!("scheduler started");
        SchedulerHandle { shutdown, tasks }
    }
}

impl SchedulerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("scheduler stopped");
    }
}

/// Drive every approved-and-ready item through the dispatch engine.
pub async fn drive_ready(pool: &Pool, engine: &DispatchEngine) -> Result<usize> {
    let ready = db::approved_ready(pool, Utc::now()).await?;
    if ready.is_empty() {
        return Ok(0);
    }
    info!(count = ready.len(), "approved items ready to dispatch");
    for item in &ready {
        if let Err(err) = engine.dispatch(item.id).await {
            error!(?err, item_id = item.id, "dispatch failed");
        }
    }
    Ok(ready.len())
}

async fn interval_loop(
    pool: Pool,
    engine: Arc<DispatchEngine>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(every) => {}
        }
        if let Err(err) = drive_ready(&pool, &engine).await {
            error!(?err, "dispatch cycle failed");
        }
    }
}

async fn clock_loop(
    pool: Pool,
    engine: Arc<DispatchEngine>,
    times: Vec<NaiveTime>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let Some(wait) = until_next_post_time(Utc::now(), &times) else {
            break;
        };
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        info!("scheduled posting cycle");
        if let Err(err) = drive_ready(&pool, &engine).await {
            error!(?err, "posting cycle failed");
        }
    }
}

async fn maintenance_loop(pool: Pool, every: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(every) => {}
        }
        match db::stats(&pool).await {
            Ok(stats) => info!(
                total_items = stats.total_items,
                pending = stats.count_for(ItemStatus::Pending),
                posting = stats.count_for(ItemStatus::Posting),
                completed = stats.count_for(ItemStatus::Completed),
                failed = stats.count_for(ItemStatus::Failed),
                "health snapshot"
            ),
            Err(err) => error!(?err, "health check failed"),
        }
    }
}

/// Time until the next occurrence of any configured daily time, strictly
/// after `now`. None when no times are configured.
fn until_next_post_time(now: DateTime<Utc>, times: &[NaiveTime]) -> Option<Duration> {
    let today = now.date_naive();
    times
        .iter()
        .map(|t| {
            let candidate = today.and_time(*t).and_utc();
            if candidate > now {
                candidate
            } else {
                (today + Days::new(1)).and_time(*t).and_utc()
            }
        })
        .min()
        .map(|next| (next - now).to_std().unwrap_or_default())
}
