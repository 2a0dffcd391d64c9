//! Human-in-the-loop approval with a timed auto-approval fallback.
//!
//! Every outstanding request lives in one mutexed map keyed by the outbound
//! message handle. Whichever actor (human decision or timer) removes the entry
//! first owns the decision; the loser finds the map empty and does nothing.
//! That remove-then-act step is the only mechanism resolving the race; it does
//! not rely on the timer being cancellable before it fires.

use crate::compose::truncate_chars;
use crate::db::{self, Pool, TransitionMeta};
use crate::model::{ApprovalKind, Item, ItemStatus};
use crate::notifier::{escape_html, Notifier};
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

pub type Continuation = Arc<dyn Fn(i64) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone)]
pub enum Decision {
    Approve { decided_by: String },
    Reject { decided_by: String, reason: String },
    Timeout,
}

struct PendingApproval {
    item_id: i64,
    on_approved: Continuation,
    on_rejected: Continuation,
    armed_at: DateTime<Utc>,
    timer: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct ApprovalSettings {
    pub auto_approve: bool,
    pub timeout: Duration,
    /// Channel names shown in the preview message.
    pub channels: Vec<String>,
}

pub struct ApprovalOrchestrator {
    pool: Pool,
    notifier: Arc<dyn Notifier>,
    settings: ApprovalSettings,
    pending: Mutex<HashMap<i64, PendingApproval>>,
}

impl ApprovalOrchestrator {
    pub fn new(pool: Pool, notifier: Arc<dyn Notifier>, settings: ApprovalSettings) -> Self {
        Self {
            pool,
            notifier,
            settings,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Present `item_id` for a decision. Returns whether the request went out;
    /// on a send failure the item simply stays `pending`.
    #[instrument(skip_all, fields(item_id = item_id))]
    pub async fn request_approval(
        self: &Arc<Self>,
        item_id: i64,
        on_approved: Continuation,
        on_rejected: Continuation,
    ) -> Result<bool> {
        let Some(item) = db::get_item(&self.pool, item_id).await? else {
            warn!(item_id, "cannot request approval for unknown item");
            return Ok(false);
        };

        let preview = render_preview(&item, &self.settings);
        let handle = match self.notifier.send_approval_request(item_id, &preview).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(?err, item_id, "failed to send approval request");
                return Ok(false);
            }
        };

        // The entry must exist before the timer can possibly fire.
        {
            let mut pending = self.pending.lock().expect("pending approvals lock");
            pending.insert(
                handle,
                PendingApproval {
                    item_id,
                    on_approved,
                    on_rejected,
                    armed_at: Utc::now(),
                    timer: None,
                },
            );
        }

        if self.settings.auto_approve {
            let orchestrator = Arc::clone(self);
            let timeout = self.settings.timeout;
            let timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                match orchestrator.resolve(handle, Decision::Timeout).await {
                    Ok(true) => {}
                    Ok(false) => debug!(handle, "auto-approval timer lost the race"),
                    Err(err) => error!(?err, handle, "auto-approval failed"),
                }
            });
            let mut pending = self.pending.lock().expect("pending approvals lock");
            if let Some(entry) = pending.get_mut(&handle) {
                entry.timer = Some(timer);
            }
            // If the entry is already gone a decision landed first; the timer
            // resolves to a no-op on its own.
        }

        info!(item_id, handle, "approval requested");
        Ok(true)
    }

    /// Apply a decision for the request behind `handle`. Returns whether this
    /// call won the race; a loser never touches the item or runs a
    /// continuation, so duplicate decision delivery is harmless.
    #[instrument(skip_all, fields(handle = handle, decision = ?decision))]
    pub async fn resolve(&self, handle: i64, decision: Decision) -> Result<bool> {
        let entry = {
            let mut pending = self.pending.lock().expect("pending approvals lock");
            pending.remove(&handle)
        };
        let Some(entry) = entry else {
            debug!(handle, "no pending approval for handle; decision dropped");
            return Ok(false);
        };

        if !matches!(decision, Decision::Timeout) {
            if let Some(timer) = &entry.timer {
                timer.abort();
            }
        }

        let item_id = entry.item_id;
        let waited_secs = (Utc::now() - entry.armed_at).num_seconds();
        match &decision {
            Decision::Approve { decided_by } => {
                db::transition(
                    &self.pool,
                    item_id,
                    ItemStatus::Approved,
                    &TransitionMeta {
                        decided_by: Some(decided_by),
                        approval_kind: Some(ApprovalKind::Manual),
                        ..Default::default()
                    },
                )
                .await?;
                info!(item_id, %decided_by, waited_secs, "item approved");
                self.edit_best_effort(
                    handle,
                    &format!("✅ <b>Approved</b>\n\nItem #{item_id} is being published..."),
                )
                .await;
                (entry.on_approved)(item_id).await;
            }
            Decision::Timeout => {
                db::transition(
                    &self.pool,
                    item_id,
                    ItemStatus::AutoApproved,
                    &TransitionMeta {
                        decided_by: Some("system"),
                        approval_kind: Some(ApprovalKind::Timeout),
                        ..Default::default()
                    },
                )
                .await?;
                info!(item_id, waited_secs, "item auto-approved after timeout");
                self.edit_best_effort(
                    handle,
                    &format!(
                        "⏱ <b>Auto-approved</b> (timeout)\n\nItem #{item_id} is being published..."
                    ),
                )
                .await;
                (entry.on_approved)(item_id).await;
            }
            Decision::Reject { decided_by, reason } => {
                db::transition(
                    &self.pool,
                    item_id,
                    ItemStatus::Rejected,
                    &TransitionMeta {
                        decided_by: Some(decided_by),
                        rejection_reason: Some(reason),
                        ..Default::default()
                    },
                )
                .await?;
                info!(item_id, %decided_by, waited_secs, "item rejected");
                self.edit_best_effort(
                    handle,
                    &format!("❌ <b>Rejected</b>\n\nItem #{item_id} will not be published."),
                )
                .await;
                (entry.on_rejected)(item_id).await;
            }
        }
        Ok(true)
    }

    /// Number of requests still awaiting a decision.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending approvals lock").len()
    }

    async fn edit_best_effort(&self, handle: i64, text: &str) {
        if let Err(err) = self.notifier.edit_message(handle, text).await {
            warn!(?err, handle, "failed to edit approval message");
        }
    }
}

fn render_preview(item: &Item, settings: &ApprovalSettings) -> String {
    let mut lines = vec![
        "🚀 <b>New item ready for approval</b>".to_string(),
        String::new(),
        format!("📝 <b>Topic:</b> {}", escape_html(&item.topic)),
        String::new(),
        "📄 <b>Summary:</b>".to_string(),
        escape_html(&truncate_chars(&item.summary, 500)),
        String::new(),
    ];

    if let Some(link) = &item.link {
        lines.push(format!("🔗 <b>Link:</b> {}", escape_html(link)));
    }
    if let Some(image) = &item.image_url {
        lines.push(format!(
            "🖼 <b>Image:</b> {}",
            escape_html(&truncate_chars(image, 80))
        ));
    }
    if item.video_url.is_some() {
        lines.push("🎬 <b>Video:</b> (manual posting required)".to_string());
    }

    lines.push(String::new());
    lines.push(format!(
        "📊 <b>Priority:</b> {}",
        item.priority.as_str().to_uppercase()
    ));
    lines.push(format!(
        "📡 <b>Channels:</b> {}",
        settings.channels.join(", ")
    ));
    if settings.auto_approve {
        lines.push(String::new());
        lines.push(format!(
            "⏱ Auto-approval in <b>{} minutes</b>",
            settings.timeout.as_secs() / 60
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;

    fn sample_item() -> Item {
        Item {
            id: 7,
            topic: "Launch <day>".into(),
            summary: "s".repeat(600),
            body: None,
            link: Some("https://example.com".into()),
            image_url: None,
            video_url: Some("https://example.com/v.mp4".into()),
            status: ItemStatus::Pending,
            priority: Priority::High,
            decided_by: None,
            approval_kind: None,
            approved_at: None,
            rejection_reason: None,
            source: "webhook".into(),
            not_before: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn preview_escapes_and_truncates() {
        let settings = ApprovalSettings {
            auto_approve: true,
            timeout: Duration::from_secs(300),
            channels: vec!["facebook".into(), "twitter".into()],
        };
        let preview = render_preview(&sample_item(), &settings);
        assert!(preview.contains("Launch &lt;day&gt;"));
        assert!(preview.contains("..."));
        assert!(preview.contains("facebook, twitter"));
        assert!(preview.contains("HIGH"));
        assert!(preview.contains("manual posting required"));
        assert!(preview.contains("5 minutes"));
    }

    #[test]
    fn preview_omits_timer_line_when_auto_approve_off() {
        let settings = ApprovalSettings {
            auto_approve: false,
            timeout: Duration::from_secs(0),
            channels: vec!["facebook".into()],
        };
        let preview = render_preview(&sample_item(), &settings);
        assert!(!preview.contains("Auto-approval"));
    }
}
