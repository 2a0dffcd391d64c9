use crate::model::{
    ApprovalKind, AuditEntry, ChannelAttempt, ChannelStatus, Item, ItemStatus, NewItem, Priority,
};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{sqlite::SqliteRow, Sqlite, SqlitePool};
use sqlx::{Row, Transaction};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Decision context attached to a status transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransitionMeta<'a> {
    pub decided_by: Option<&'a str>,
    pub approval_kind: Option<ApprovalKind>,
    pub rejection_reason: Option<&'a str>,
    pub error_message: Option<&'a str>,
}

/// Outcome fields attached to a channel attempt update.
#[derive(Debug, Default, Clone, Copy)]
pub struct OutcomeUpdate<'a> {
    pub post_id: Option<&'a str>,
    pub url: Option<&'a str>,
    pub error: Option<&'a str>,
}

/// Insert an item plus one pending attempt per enabled channel, atomically.
#[instrument(skip_all)]
pub async fn create_item(pool: &Pool, item: &NewItem, enabled_channels: &[String]) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let rec = sqlx::query(
        "INSERT INTO items
            (topic, summary, body, link, image_url, video_url,
             status, priority, source, not_before, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(&item.topic)
    .bind(&item.summary)
    .bind(&item.body)
    .bind(&item.link)
    .bind(&item.image_url)
    .bind(&item.video_url)
    .bind(item.priority.as_str())
    .bind(&item.source)
    .bind(item.not_before)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;
    let id: i64 = rec.get("id");

    for channel in enabled_channels {
        sqlx::query(
            "INSERT INTO channel_attempts (item_id, channel, status, created_at, updated_at)
             VALUES (?, ?, 'pending', ?, ?)",
        )
        .bind(id)
        .bind(channel)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    append_audit_tx(
        &mut tx,
        id,
        "created",
        json!({
            "source": item.source,
            "channels": enabled_channels,
            "priority": item.priority.as_str(),
        }),
        now,
    )
    .await?;

    tx.commit().await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn get_item(pool: &Pool, item_id: i64) -> Result<Option<Item>> {
    let row = sqlx::query("SELECT * FROM items WHERE id = ?")
        .bind(item_id)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => Ok(Some(item_from_row(&row)?)),
        None => Ok(None),
    }
}

/// Move an item to `new_status`, validating reachability against the state
/// machine. Stamps `approved_at` / `completed_at` where applicable and appends
/// one audit entry with the full decision context.
#[instrument(skip_all, fields(item_id = item_id, status = new_status.as_str()))]
pub async fn transition(
    pool: &Pool,
    item_id: i64,
    new_status: ItemStatus,
    meta: &TransitionMeta<'_>,
) -> Result<()> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let current: Option<String> = sqlx::query_scalar("SELECT status FROM items WHERE id = ?")
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(current) = current else {
        return Err(anyhow!("item {} not found", item_id));
    };
    let current = ItemStatus::parse(&current)
        .ok_or_else(|| anyhow!("item {} has unknown status '{}'", item_id, current))?;
    if !current.can_transition(new_status) {
        return Err(anyhow!(
            "invalid transition {} -> {} for item {}",
            current.as_str(),
            new_status.as_str(),
            item_id
        ));
    }

    sqlx::query(
        "UPDATE items SET
            status = ?,
            updated_at = ?,
            decided_by = COALESCE(?, decided_by),
            approval_kind = COALESCE(?, approval_kind),
            rejection_reason = COALESCE(?, rejection_reason),
            error_message = COALESCE(?, error_message),
            approved_at = CASE WHEN ? THEN ? ELSE approved_at END,
            completed_at = CASE WHEN ? THEN ? ELSE completed_at END
         WHERE id = ?",
    )
    .bind(new_status.as_str())
    .bind(now)
    .bind(meta.decided_by)
    .bind(meta.approval_kind.map(|k| k.as_str()))
    .bind(meta.rejection_reason)
    .bind(meta.error_message)
    .bind(new_status.is_approval())
    .bind(now)
    .bind(new_status.is_dispatch_terminal())
    .bind(now)
    .bind(item_id)
    .execute(&mut *tx)
    .await?;

    append_audit_tx(
        &mut tx,
        item_id,
        new_status.as_str(),
        json!({
            "decided_by": meta.decided_by,
            "approval_kind": meta.approval_kind.map(|k| k.as_str()),
            "rejection_reason": meta.rejection_reason,
            "error_message": meta.error_message,
        }),
        now,
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Record the outcome of one channel attempt. Bumps `retry_count` on failure
/// and stamps `posted_at` on publication.
#[instrument(skip_all, fields(item_id = item_id, channel = channel, status = status.as_str()))]
pub async fn record_channel_outcome(
    pool: &Pool,
    item_id: i64,
    channel: &str,
    status: ChannelStatus,
    update: OutcomeUpdate<'_>,
) -> Result<()> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "UPDATE channel_attempts SET
            status = ?,
            updated_at = ?,
            post_id = COALESCE(?, post_id),
            post_url = COALESCE(?, post_url),
            error_message = COALESCE(?, error_message),
            retry_count = retry_count + CASE WHEN ? THEN 1 ELSE 0 END,
            posted_at = CASE WHEN ? THEN ? ELSE posted_at END
         WHERE item_id = ? AND channel = ?",
    )
    .bind(status.as_str())
    .bind(now)
    .bind(update.post_id)
    .bind(update.url)
    .bind(update.error)
    .bind(status == ChannelStatus::Failed)
    .bind(status == ChannelStatus::Published)
    .bind(now)
    .bind(item_id)
    .bind(channel)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(anyhow!(
            "no channel attempt for item {} on '{}'",
            item_id,
            channel
        ));
    }

    append_audit_tx(
        &mut tx,
        item_id,
        &format!("channel_{}", status.as_str()),
        json!({
            "channel": channel,
            "post_id": update.post_id,
            "post_url": update.url,
            "error": update.error,
        }),
        now,
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Items approved (manually or by timeout) whose scheduling gate has passed,
/// ordered high -> normal -> low priority, then oldest first within a tier.
#[instrument(skip_all)]
pub async fn approved_ready(pool: &Pool, now: DateTime<Utc>) -> Result<Vec<Item>> {
    let rows = sqlx::query(
        "SELECT * FROM items
         WHERE status IN ('approved', 'auto_approved')
           AND (not_before IS NULL OR datetime(not_before) <= datetime(?))
         ORDER BY
             CASE priority WHEN 'high' THEN 1 WHEN 'normal' THEN 2 ELSE 3 END,
             created_at ASC",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    rows.iter().map(item_from_row).collect()
}

/// Items still waiting for an approval decision, oldest first.
#[instrument(skip_all)]
pub async fn pending_items(pool: &Pool) -> Result<Vec<Item>> {
    let rows = sqlx::query("SELECT * FROM items WHERE status = 'pending' ORDER BY created_at ASC")
        .fetch_all(pool)
        .await?;
    rows.iter().map(item_from_row).collect()
}

#[instrument(skip_all)]
pub async fn channel_attempts(pool: &Pool, item_id: i64) -> Result<Vec<ChannelAttempt>> {
    let rows = sqlx::query("SELECT * FROM channel_attempts WHERE item_id = ? ORDER BY id ASC")
        .bind(item_id)
        .fetch_all(pool)
        .await?;
    rows.iter().map(attempt_from_row).collect()
}

#[instrument(skip_all)]
pub async fn audit_trail(pool: &Pool, item_id: i64) -> Result<Vec<AuditEntry>> {
    let rows = sqlx::query("SELECT * FROM audit_log WHERE item_id = ? ORDER BY id ASC")
        .bind(item_id)
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|row| {
            let details: Option<String> = row.try_get("details")?;
            Ok(AuditEntry {
                id: row.try_get("id")?,
                item_id: row.try_get("item_id")?,
                action: row.try_get("action")?,
                details: details
                    .and_then(|d| serde_json::from_str(&d).ok())
                    .unwrap_or(Value::Null),
                at: row.try_get("at")?,
            })
        })
        .collect()
}

/// Most recent items with their per-channel attempts.
#[instrument(skip_all)]
pub async fn recent_items(pool: &Pool, limit: i64) -> Result<Vec<(Item, Vec<ChannelAttempt>)>> {
    let rows = sqlx::query("SELECT * FROM items ORDER BY created_at DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await?;
    let mut result = Vec::with_capacity(rows.len());
    for row in &rows {
        let item = item_from_row(row)?;
        let attempts = channel_attempts(pool, item.id).await?;
        result.push((item, attempts));
    }
    Ok(result)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub total_items: i64,
    pub by_status: Vec<StatusCount>,
    pub by_channel: Vec<ChannelStatusCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatusCount {
    pub channel: String,
    pub status: String,
    pub count: i64,
}

impl Stats {
    pub fn count_for(&self, status: ItemStatus) -> i64 {
        self.by_status
            .iter()
            .find(|c| c.status == status.as_str())
            .map(|c| c.count)
            .unwrap_or(0)
    }
}

#[instrument(skip_all)]
pub async fn stats(pool: &Pool) -> Result<Stats> {
    let total_items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
        .fetch_one(pool)
        .await?;

    let by_status = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM items GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(status, count)| StatusCount { status, count })
    .collect();

    let by_channel = sqlx::query_as::<_, (String, String, i64)>(
        "SELECT channel, status, COUNT(*) FROM channel_attempts
         GROUP BY channel, status ORDER BY channel, status",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(channel, status, count)| ChannelStatusCount {
        channel,
        status,
        count,
    })
    .collect();

    Ok(Stats {
        total_items,
        by_status,
        by_channel,
    })
}

async fn append_audit_tx(
    tx: &mut Transaction<'_, Sqlite>,
    item_id: i64,
    action: &str,
    details: Value,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("INSERT INTO audit_log (item_id, action, details, at) VALUES (?, ?, ?, ?)")
        .bind(item_id)
        .bind(action)
        .bind(details.to_string())
        .bind(at)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn item_from_row(row: &SqliteRow) -> Result<Item> {
    let status: String = row.try_get("status")?;
    let priority: String = row.try_get("priority")?;
    let approval_kind: Option<String> = row.try_get("approval_kind")?;
    Ok(Item {
        id: row.try_get("id")?,
        topic: row.try_get("topic")?,
        summary: row.try_get("summary")?,
        body: row.try_get("body")?,
        link: row.try_get("link")?,
        image_url: row.try_get("image_url")?,
        video_url: row.try_get("video_url")?,
        status: ItemStatus::parse(&status).ok_or_else(|| anyhow!("unknown status '{status}'"))?,
        priority: Priority::parse(&priority)
            .ok_or_else(|| anyhow!("unknown priority '{priority}'"))?,
        decided_by: row.try_get("decided_by")?,
        approval_kind: approval_kind.as_deref().and_then(ApprovalKind::parse),
        approved_at: row.try_get("approved_at")?,
        rejection_reason: row.try_get("rejection_reason")?,
        source: row.try_get("source")?,
        not_before: row.try_get("not_before")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn attempt_from_row(row: &SqliteRow) -> Result<ChannelAttempt> {
    let status: String = row.try_get("status")?;
    Ok(ChannelAttempt {
        id: row.try_get("id")?,
        item_id: row.try_get("item_id")?,
        channel: row.try_get("channel")?,
        status: ChannelStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown channel status '{status}'"))?,
        post_id: row.try_get("post_id")?,
        post_url: row.try_get("post_url")?,
        error_message: row.try_get("error_message")?,
        retry_count: row.try_get("retry_count")?,
        posted_at: row.try_get("posted_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn channels() -> Vec<String> {
        vec!["facebook".into(), "twitter".into()]
    }

    fn new_item(topic: &str) -> NewItem {
        NewItem {
            topic: topic.into(),
            summary: "a summary".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_inserts_attempts_and_audit() {
        let pool = setup_pool().await;
        let id = create_item(&pool, &new_item("hello"), &channels())
            .await
            .unwrap();

        let item = get_item(&pool, id).await.unwrap().unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.source, "webhook");

        let attempts = channel_attempts(&pool, id).await.unwrap();
        assert_eq!(attempts.len(), 2);
        assert!(attempts.iter().all(|a| a.status == ChannelStatus::Pending));
        assert_eq!(attempts[0].channel, "facebook");
        assert_eq!(attempts[1].channel, "twitter");

        let trail = audit_trail(&pool, id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, "created");
        assert_eq!(trail[0].details["channels"][0], "facebook");
    }

    #[tokio::test]
    async fn valid_transition_path_stamps_timestamps() {
        let pool = setup_pool().await;
        let id = create_item(&pool, &new_item("x"), &channels())
            .await
            .unwrap();

        transition(
            &pool,
            id,
            ItemStatus::Approved,
            &TransitionMeta {
                decided_by: Some("alice"),
                approval_kind: Some(ApprovalKind::Manual),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let item = get_item(&pool, id).await.unwrap().unwrap();
        assert_eq!(item.status, ItemStatus::Approved);
        assert_eq!(item.decided_by.as_deref(), Some("alice"));
        assert_eq!(item.approval_kind, Some(ApprovalKind::Manual));
        assert!(item.approved_at.is_some());
        assert!(item.completed_at.is_none());

        transition(&pool, id, ItemStatus::Posting, &TransitionMeta::default())
            .await
            .unwrap();
        transition(&pool, id, ItemStatus::Completed, &TransitionMeta::default())
            .await
            .unwrap();
        let item = get_item(&pool, id).await.unwrap().unwrap();
        assert_eq!(item.status, ItemStatus::Completed);
        assert!(item.completed_at.is_some());

        let actions: Vec<String> = audit_trail(&pool, id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["created", "approved", "posting", "completed"]);
    }

    #[tokio::test]
    async fn invalid_transitions_are_rejected() {
        let pool = setup_pool().await;
        let id = create_item(&pool, &new_item("x"), &channels())
            .await
            .unwrap();

        // pending may not skip straight to posting or a terminal state
        assert!(
            transition(&pool, id, ItemStatus::Posting, &TransitionMeta::default())
                .await
                .is_err()
        );
        assert!(transition(
            &pool,
            id,
            ItemStatus::Completed,
            &TransitionMeta::default()
        )
        .await
        .is_err());

        transition(&pool, id, ItemStatus::Rejected, &TransitionMeta::default())
            .await
            .unwrap();
        // rejected is terminal
        assert!(
            transition(&pool, id, ItemStatus::Approved, &TransitionMeta::default())
                .await
                .is_err()
        );

        // the failed attempts left no audit entries behind
        let actions: Vec<String> = audit_trail(&pool, id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["created", "rejected"]);
    }

    #[tokio::test]
    async fn channel_outcomes_update_retry_and_posted_at() {
        let pool = setup_pool().await;
        let id = create_item(&pool, &new_item("x"), &channels())
            .await
            .unwrap();

        record_channel_outcome(
            &pool,
            id,
            "facebook",
            ChannelStatus::Failed,
            OutcomeUpdate {
                error: Some("rate limited"),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        record_channel_outcome(
            &pool,
            id,
            "facebook",
            ChannelStatus::Failed,
            OutcomeUpdate {
                error: Some("rate limited again"),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        record_channel_outcome(
            &pool,
            id,
            "twitter",
            ChannelStatus::Published,
            OutcomeUpdate {
                post_id: Some("t-1"),
                url: Some("https://twitter.com/i/status/t-1"),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let attempts = channel_attempts(&pool, id).await.unwrap();
        let fb = attempts.iter().find(|a| a.channel == "facebook").unwrap();
        assert_eq!(fb.status, ChannelStatus::Failed);
        assert_eq!(fb.retry_count, 2);
        assert!(fb.posted_at.is_none());

        let tw = attempts.iter().find(|a| a.channel == "twitter").unwrap();
        assert_eq!(tw.status, ChannelStatus::Published);
        assert_eq!(tw.post_id.as_deref(), Some("t-1"));
        assert!(tw.posted_at.is_some());

        // unknown channel pair is an error, not a silent no-op
        assert!(record_channel_outcome(
            &pool,
            id,
            "linkedin",
            ChannelStatus::Published,
            OutcomeUpdate::default(),
        )
        .await
        .is_err());
    }

    #[tokio::test]
    async fn approved_ready_orders_by_priority_then_age() {
        let pool = setup_pool().await;

        let low = create_item(
            &pool,
            &NewItem {
                priority: Priority::Low,
                ..new_item("low")
            },
            &channels(),
        )
        .await
        .unwrap();
        let normal_old = create_item(&pool, &new_item("normal old"), &channels())
            .await
            .unwrap();
        let normal_new = create_item(&pool, &new_item("normal new"), &channels())
            .await
            .unwrap();
        let high = create_item(
            &pool,
            &NewItem {
                priority: Priority::High,
                ..new_item("high")
            },
            &channels(),
        )
        .await
        .unwrap();

        for id in [low, normal_old, normal_new, high] {
            transition(&pool, id, ItemStatus::Approved, &TransitionMeta::default())
                .await
                .unwrap();
        }

        let ready = approved_ready(&pool, Utc::now()).await.unwrap();
        let ids: Vec<i64> = ready.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![high, normal_old, normal_new, low]);
    }

    #[tokio::test]
    async fn approved_ready_respects_not_before() {
        let pool = setup_pool().await;
        let now = Utc::now();

        let gated = create_item(
            &pool,
            &NewItem {
                not_before: Some(now + Duration::hours(2)),
                ..new_item("later")
            },
            &channels(),
        )
        .await
        .unwrap();
        let open = create_item(
            &pool,
            &NewItem {
                not_before: Some(now - Duration::hours(2)),
                ..new_item("now")
            },
            &channels(),
        )
        .await
        .unwrap();

        for id in [gated, open] {
            transition(
                &pool,
                id,
                ItemStatus::AutoApproved,
                &TransitionMeta {
                    approval_kind: Some(ApprovalKind::Timeout),
                    decided_by: Some("system"),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let ready = approved_ready(&pool, now).await.unwrap();
        let ids: Vec<i64> = ready.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![open]);

        // once the gate passes, the item shows up
        let ready = approved_ready(&pool, now + Duration::hours(3)).await.unwrap();
        assert_eq!(ready.len(), 2);
    }

    #[tokio::test]
    async fn rejected_items_never_become_ready() {
        let pool = setup_pool().await;
        let id = create_item(&pool, &new_item("no"), &channels())
            .await
            .unwrap();
        transition(
            &pool,
            id,
            ItemStatus::Rejected,
            &TransitionMeta {
                decided_by: Some("bob"),
                rejection_reason: Some("off brand"),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(approved_ready(&pool, Utc::now()).await.unwrap().is_empty());
        let item = get_item(&pool, id).await.unwrap().unwrap();
        assert_eq!(item.rejection_reason.as_deref(), Some("off brand"));
    }

    #[tokio::test]
    async fn stats_counts_by_status_and_channel() {
        let pool = setup_pool().await;
        let a = create_item(&pool, &new_item("a"), &channels()).await.unwrap();
        let _b = create_item(&pool, &new_item("b"), &channels()).await.unwrap();
        transition(&pool, a, ItemStatus::Approved, &TransitionMeta::default())
            .await
            .unwrap();

        let stats = stats(&pool).await.unwrap();
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.count_for(ItemStatus::Pending), 1);
        assert_eq!(stats.count_for(ItemStatus::Approved), 1);
        assert_eq!(stats.by_channel.len(), 2);
    }

    #[test]
    fn sqlite_url_normalization() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            prepare_sqlite_url("postgres://x/y"),
            "postgres://x/y".to_string()
        );
        assert_eq!(
            prepare_sqlite_url("sqlite:///tmp/a/b.db"),
            "sqlite:///tmp/a/b.db"
        );
    }
}
