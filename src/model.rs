use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an item.
///
/// `pending -> {approved, auto_approved} -> posting -> {completed, partial_failure, failed}`
/// `pending -> rejected` (terminal).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Approved,
    AutoApproved,
    Posting,
    Completed,
    PartialFailure,
    Failed,
    Rejected,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Approved => "approved",
            ItemStatus::AutoApproved => "auto_approved",
            ItemStatus::Posting => "posting",
            ItemStatus::Completed => "completed",
            ItemStatus::PartialFailure => "partial_failure",
            ItemStatus::Failed => "failed",
            ItemStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ItemStatus::Pending),
            "approved" => Some(ItemStatus::Approved),
            "auto_approved" => Some(ItemStatus::AutoApproved),
            "posting" => Some(ItemStatus::Posting),
            "completed" => Some(ItemStatus::Completed),
            "partial_failure" => Some(ItemStatus::PartialFailure),
            "failed" => Some(ItemStatus::Failed),
            "rejected" => Some(ItemStatus::Rejected),
            _ => None,
        }
    }

    /// Whether `next` is reachable from `self` in one step.
    pub fn can_transition(self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, next),
            (Pending, Approved | AutoApproved | Rejected)
                | (Approved | AutoApproved, Posting)
                | (Posting, Completed | PartialFailure | Failed)
        )
    }

    pub fn is_approval(self) -> bool {
        matches!(self, ItemStatus::Approved | ItemStatus::AutoApproved)
    }

    /// Terminal dispatch outcomes; entering one stamps `completed_at`.
    pub fn is_dispatch_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::PartialFailure | ItemStatus::Failed
        )
    }
}

/// Per-channel status of one publishing attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Pending,
    Posting,
    Published,
    Failed,
    Skipped,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Pending => "pending",
            ChannelStatus::Posting => "posting",
            ChannelStatus::Published => "published",
            ChannelStatus::Failed => "failed",
            ChannelStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ChannelStatus::Pending),
            "posting" => Some(ChannelStatus::Posting),
            "published" => Some(ChannelStatus::Published),
            "failed" => Some(ChannelStatus::Failed),
            "skipped" => Some(ChannelStatus::Skipped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Priority::High),
            "normal" => Some(Priority::Normal),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

/// How an approval decision was reached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    Manual,
    Timeout,
}

impl ApprovalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalKind::Manual => "manual",
            ApprovalKind::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(ApprovalKind::Manual),
            "timeout" => Some(ApprovalKind::Timeout),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub id: i64,
    pub topic: String,
    pub summary: String,
    pub body: Option<String>,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub status: ItemStatus,
    pub priority: Priority,
    pub decided_by: Option<String>,
    pub approval_kind: Option<ApprovalKind>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub source: String,
    pub not_before: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelAttempt {
    pub id: i64,
    pub item_id: i64,
    pub channel: String,
    pub status: ChannelStatus,
    pub post_id: Option<String>,
    pub post_url: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i64,
    pub posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub item_id: i64,
    pub action: String,
    pub details: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// Fields supplied by an ingress when creating an item.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub topic: String,
    pub summary: String,
    pub body: Option<String>,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub priority: Priority,
    pub source: String,
    pub not_before: Option<DateTime<Utc>>,
}

impl Default for NewItem {
    fn default() -> Self {
        Self {
            topic: String::new(),
            summary: String::new(),
            body: None,
            link: None,
            image_url: None,
            video_url: None,
            priority: Priority::Normal,
            source: "webhook".into(),
            not_before: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [
            ItemStatus::Pending,
            ItemStatus::Approved,
            ItemStatus::AutoApproved,
            ItemStatus::Posting,
            ItemStatus::Completed,
            ItemStatus::PartialFailure,
            ItemStatus::Failed,
            ItemStatus::Rejected,
        ] {
            assert_eq!(ItemStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ItemStatus::parse("bogus"), None);
    }

    #[test]
    fn state_machine_paths() {
        use ItemStatus::*;
        assert!(Pending.can_transition(Approved));
        assert!(Pending.can_transition(AutoApproved));
        assert!(Pending.can_transition(Rejected));
        assert!(Approved.can_transition(Posting));
        assert!(AutoApproved.can_transition(Posting));
        assert!(Posting.can_transition(Completed));
        assert!(Posting.can_transition(PartialFailure));
        assert!(Posting.can_transition(Failed));

        // No skipping or re-opening.
        assert!(!Pending.can_transition(Posting));
        assert!(!Pending.can_transition(Completed));
        assert!(!Approved.can_transition(Completed));
        assert!(!Rejected.can_transition(Approved));
        assert!(!Completed.can_transition(Posting));
        assert!(!Failed.can_transition(Posting));
        assert!(!Posting.can_transition(Approved));
    }

    #[test]
    fn completed_at_stamping_states() {
        assert!(ItemStatus::Completed.is_dispatch_terminal());
        assert!(ItemStatus::PartialFailure.is_dispatch_terminal());
        assert!(ItemStatus::Failed.is_dispatch_terminal());
        assert!(!ItemStatus::Rejected.is_dispatch_terminal());
        assert!(!ItemStatus::Posting.is_dispatch_terminal());
    }
}
