//! Fan-out of one approved item to every enabled channel, with per-channel
//! outcome recording and partial-failure aggregation.

use crate::approval::Continuation;
use crate::channels::Channel;
use crate::compose;
use crate::db::{self, OutcomeUpdate, Pool, TransitionMeta};
use crate::model::{ChannelStatus, ItemStatus};
use crate::notifier::{AlertLevel, Notifier};
use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub struct DispatchEngine {
    pool: Pool,
    channels: Vec<Arc<dyn Channel>>,
    notifier: Arc<dyn Notifier>,
    inter_channel_delay: Duration,
    in_flight: Mutex<HashSet<i64>>,
}

/// Slot in the in-flight set. Dropping it releases the slot, on every exit
/// path including errors.
struct InFlightSlot<'a> {
    engine: &'a DispatchEngine,
    item_id: i64,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.engine
            .in_flight
            .lock()
            .expect("in-flight set lock")
            .remove(&self.item_id);
    }
}

struct ChannelResult {
    channel: &'static str,
    status: ChannelStatus,
    url: Option<String>,
}

impl DispatchEngine {
    pub fn new(
        pool: Pool,
        channels: Vec<Arc<dyn Channel>>,
        notifier: Arc<dyn Notifier>,
        inter_channel_delay: Duration,
    ) -> Self {
        Self {
            pool,
            channels,
            notifier,
            inter_channel_delay,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Continuation suitable for the approval orchestrator's approved path.
    pub fn approved_continuation(self: &Arc<Self>) -> Continuation {
        let engine = Arc::clone(self);
        Arc::new(move |item_id| -> BoxFuture<'static, ()> {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                if let Err(err) = engine.dispatch(item_id).await {
                    error!(?err, item_id, "dispatch after approval failed");
                }
            })
        })
    }

    /// Publish `item_id` to every channel that got an attempt row at creation.
    /// Re-invoking while a dispatch for the same item is in flight is a no-op.
    #[instrument(skip_all, fields(item_id = item_id))]
    pub async fn dispatch(&self, item_id: i64) -> Result<()> {
        let Some(_slot) = self.claim(item_id) else {
            info!(item_id, "item already dispatching; skipping");
            return Ok(());
        };

        let Some(item) = db::get_item(&self.pool, item_id).await? else {
            warn!(item_id, "item not found; nothing to dispatch");
            return Ok(());
        };

        db::transition(
            &self.pool,
            item_id,
            ItemStatus::Posting,
            &TransitionMeta::default(),
        )
        .await?;

        let attempts = db::channel_attempts(&self.pool, item_id).await?;
        let mut results: Vec<ChannelResult> = Vec::new();

        for channel in &self.channels {
            let name = channel.name();
            if !attempts.iter().any(|a| a.channel == name) {
                // Channels configured after item creation get no retroactive attempt.
                debug!(item_id, channel = name, "no attempt row; skipping channel");
                continue;
            }

            if channel.requires_media() && item.image_url.is_none() {
                let reason = format!("{name} requires an image and none was provided");
                db::record_channel_outcome(
                    &self.pool,
                    item_id,
                    name,
                    ChannelStatus::Skipped,
                    OutcomeUpdate {
                        error: Some(&reason),
                        ..Default::default()
                    },
                )
                .await?;
                info!(item_id, channel = name, "channel skipped: no media");
                results.push(ChannelResult {
                    channel: name,
                    status: ChannelStatus::Skipped,
                    url: None,
                });
                continue;
            }

            db::record_channel_outcome(
                &self.pool,
                item_id,
                name,
                ChannelStatus::Posting,
                OutcomeUpdate::default(),
            )
            .await?;

            let text = compose::render(&item, &channel.profile());
            info!(item_id, channel = name, "publishing");
            let outcome = channel
                .post(&text, item.image_url.as_deref(), item.link.as_deref())
                .await;

            match outcome {
                Ok(outcome) if outcome.success => {
                    db::record_channel_outcome(
                        &self.pool,
                        item_id,
                        name,
                        ChannelStatus::Published,
                        OutcomeUpdate {
                            post_id: outcome.post_id.as_deref(),
                            url: outcome.url.as_deref(),
                            ..Default::default()
                        },
                    )
                    .await?;
                    info!(item_id, channel = name, url = ?outcome.url, "published");
                    results.push(ChannelResult {
                        channel: name,
                        status: ChannelStatus::Published,
                        url: outcome.url,
                    });
                }
                Ok(outcome) => {
                    let error = outcome
                        .error
                        .unwrap_or_else(|| "channel returned failure without detail".into());
                    db::record_channel_outcome(
                        &self.pool,
                        item_id,
                        name,
                        ChannelStatus::Failed,
                        OutcomeUpdate {
                            error: Some(&error),
                            ..Default::default()
                        },
                    )
                    .await?;
                    warn!(item_id, channel = name, %error, "channel failed");
                    self.alert_channel_failure(item_id, name, &error).await;
                    results.push(ChannelResult {
                        channel: name,
                        status: ChannelStatus::Failed,
                        url: None,
                    });
                }
                Err(err) => {
                    // Unexpected adapter error; contain it to this channel.
                    let error = format!("unexpected channel error: {err:#}");
                    db::record_channel_outcome(
                        &self.pool,
                        item_id,
                        name,
                        ChannelStatus::Failed,
                        OutcomeUpdate {
                            error: Some(&error),
                            ..Default::default()
                        },
                    )
                    .await?;
                    warn!(item_id, channel = name, %error, "channel adapter raised");
                    self.alert_channel_failure(item_id, name, &error).await;
                    results.push(ChannelResult {
                        channel: name,
                        status: ChannelStatus::Failed,
                        url: None,
                    });
                }
            }

            if !self.inter_channel_delay.is_zero() {
                tokio::time::sleep(self.inter_channel_delay).await;
            }
        }

        // Skipped channels are excluded from both sides of the aggregation, so
        // an item with only media-requiring channels and no image is not
        // misreported as failed.
        let published = results
            .iter()
            .filter(|r| r.status == ChannelStatus::Published)
            .count();
        let failed = results
            .iter()
            .filter(|r| r.status == ChannelStatus::Failed)
            .count();
        let final_status = if failed == 0 {
            ItemStatus::Completed
        } else if published > 0 {
            ItemStatus::PartialFailure
        } else {
            ItemStatus::Failed
        };

        db::transition(&self.pool, item_id, final_status, &TransitionMeta::default()).await?;
        info!(
            item_id,
            published,
            failed,
            status = final_status.as_str(),
            "dispatch finished"
        );

        let summary = render_summary(item_id, &results);
        if let Err(err) = self.notifier.send_message(&summary).await {
            warn!(?err, item_id, "failed to send dispatch summary");
        }

        if final_status == ItemStatus::Failed {
            if let Err(err) = self
                .notifier
                .send_alert(
                    &format!("Item #{item_id} failed on all channels"),
                    "No channel was able to publish this item. Check the logs.",
                    AlertLevel::Critical,
                )
                .await
            {
                warn!(?err, item_id, "failed to send total-failure alert");
            }
        }

        Ok(())
    }

    fn claim(&self, item_id: i64) -> Option<InFlightSlot<'_>> {
        let mut in_flight = self.in_flight.lock().expect("in-flight set lock");
        if in_flight.insert(item_id) {
            Some(InFlightSlot {
                engine: self,
                item_id,
            })
        } else {
            None
        }
    }

    async fn alert_channel_failure(&self, item_id: i64, channel: &str, error: &str) {
        if let Err(err) = self
            .notifier
            .send_alert(
                &format!("Item #{item_id} failed on {channel}"),
                &format!("Channel: {channel}\nError: {error}"),
                AlertLevel::Error,
            )
            .await
        {
            warn!(?err, item_id, channel, "failed to send channel-failure alert");
        }
    }
}

/// Continuation for the rejected path: nothing to publish.
pub fn rejected_continuation() -> Continuation {
    Arc::new(|item_id| -> BoxFuture<'static, ()> {
        Box::pin(async move {
            info!(item_id, "item rejected; nothing to publish");
        })
    })
}

fn render_summary(item_id: i64, results: &[ChannelResult]) -> String {
    let mut lines = vec![format!("📊 Item #{item_id} results:")];
    for result in results {
        let emoji = match result.status {
            ChannelStatus::Published => "✅",
            ChannelStatus::Skipped => "⏭",
            _ => "❌",
        };
        lines.push(format!("{emoji} {}", result.channel));
        if let Some(url) = &result.url {
            lines.push(format!("   {url}"));
        }
    }
    lines.join("\n")
}
