//! Outbound notification channel: approval requests with inline buttons,
//! per-item summaries, and failure alerts, all through one Telegram chat.

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertLevel {
    pub fn emoji(&self) -> &'static str {
        match self {
            AlertLevel::Info => "ℹ️",
            AlertLevel::Warning => "⚠️",
            AlertLevel::Error => "❌",
            AlertLevel::Critical => "🚨",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send an approval request with approve/reject buttons for `item_id`.
    /// Returns the handle of the outbound message.
    async fn send_approval_request(&self, item_id: i64, text: &str) -> Result<i64>;

    async fn edit_message(&self, handle: i64, text: &str) -> Result<()>;

    async fn send_message(&self, text: &str) -> Result<()>;

    async fn send_alert(&self, title: &str, body: &str, level: AlertLevel) -> Result<()>;
}

#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, chat_id: i64) -> Self {
        Self {
            bot,
            chat_id: ChatId(chat_id),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_approval_request(&self, item_id: i64, text: &str) -> Result<i64> {
        let keyboard = InlineKeyboardMarkup::new(vec![vec![
            InlineKeyboardButton::callback("✅ Approve & Post", format!("approve:{item_id}")),
            InlineKeyboardButton::callback("❌ Reject", format!("reject:{item_id}")),
        ]]);
        let msg = self
            .bot
            .send_message(self.chat_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await?;
        Ok(msg.id.0 as i64)
    }

    async fn edit_message(&self, handle: i64, text: &str) -> Result<()> {
        self.bot
            .edit_message_text(self.chat_id, MessageId(handle as i32), text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        self.bot
            .send_message(self.chat_id, text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    async fn send_alert(&self, title: &str, body: &str, level: AlertLevel) -> Result<()> {
        let text = format!(
            "{} <b>{}</b>\n\n{}",
            level.emoji(),
            escape_html(title),
            escape_html(body)
        );
        self.bot
            .send_message(self.chat_id, text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }
}

/// Escape the characters Telegram's HTML parse mode treats specially.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
