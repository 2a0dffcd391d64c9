#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tg_crossposter::approval::Continuation;
use tg_crossposter::db;
use tg_crossposter::model::{ItemStatus, NewItem};
use tg_crossposter::notifier::{AlertLevel, Notifier};

pub async fn setup_pool() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub async fn insert_item(pool: &SqlitePool, item: &NewItem, channels: &[&str]) -> i64 {
    let channels: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
    db::create_item(pool, item, &channels).await.unwrap()
}

pub async fn insert_approved_item(pool: &SqlitePool, item: &NewItem, channels: &[&str]) -> i64 {
    let id = insert_item(pool, item, channels).await;
    db::transition(pool, id, ItemStatus::Approved, &Default::default())
        .await
        .unwrap();
    id
}

pub fn basic_item(topic: &str) -> NewItem {
    NewItem {
        topic: topic.into(),
        summary: "a short summary".into(),
        ..Default::default()
    }
}

/// Continuation that only counts its invocations.
pub fn counting_continuation(counter: &Arc<AtomicUsize>) -> Continuation {
    let counter = Arc::clone(counter);
    Arc::new(move |_item_id| -> BoxFuture<'static, ()> {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    })
}

#[derive(Debug, Clone)]
pub struct SentApproval {
    pub handle: i64,
    pub item_id: i64,
    pub text: String,
}

/// In-memory notifier that records everything and hands out sequential
/// message handles.
#[derive(Default)]
pub struct RecordingNotifier {
    next_handle: AtomicI64,
    fail_sends: bool,
    approvals: Mutex<Vec<SentApproval>>,
    edits: Mutex<Vec<(i64, String)>>,
    messages: Mutex<Vec<String>>,
    alerts: Mutex<Vec<(String, String, AlertLevel)>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail_sends: true,
            ..Default::default()
        }
    }

    pub fn approvals(&self) -> Vec<SentApproval> {
        self.approvals.lock().unwrap().clone()
    }

    pub fn last_handle(&self) -> i64 {
        self.approvals.lock().unwrap().last().unwrap().handle
    }

    pub fn edits(&self) -> Vec<(i64, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<(String, String, AlertLevel)> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn alerts_at(&self, level: AlertLevel) -> usize {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, l)| *l == level)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_approval_request(&self, item_id: i64, text: &str) -> Result<i64> {
        if self.fail_sends {
            return Err(anyhow!("send failed"));
        }
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        self.approvals.lock().unwrap().push(SentApproval {
            handle,
            item_id,
            text: text.to_string(),
        });
        Ok(handle)
    }

    async fn edit_message(&self, handle: i64, text: &str) -> Result<()> {
        self.edits.lock().unwrap().push((handle, text.to_string()));
        Ok(())
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn send_alert(&self, title: &str, body: &str, level: AlertLevel) -> Result<()> {
        self.alerts
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string(), level));
        Ok(())
    }
}
