//! Publishing channel adapters. Each adapter is an independent failure domain:
//! ordinary failures (auth expiry, rate limits, content rejection) come back in
//! the [`PostOutcome`], never as `Err`.

use crate::compose::RenderProfile;
use crate::config::Config;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

mod facebook;
mod instagram;
mod twitter;

pub use facebook::FacebookChannel;
pub use instagram::InstagramChannel;
pub use twitter::TwitterChannel;

/// Structured result of one publishing attempt.
#[derive(Debug, Clone, Default)]
pub struct PostOutcome {
    pub success: bool,
    pub post_id: Option<String>,
    pub url: Option<String>,
    pub error: Option<String>,
}

impl PostOutcome {
    pub fn published(post_id: impl Into<String>, url: Option<String>) -> Self {
        Self {
            success: true,
            post_id: Some(post_id.into()),
            url,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this channel cannot publish without an image.
    fn requires_media(&self) -> bool {
        false
    }

    /// Character limit and link policy used when rendering text for this channel.
    fn profile(&self) -> RenderProfile;

    /// Attempt to publish. Only truly unexpected conditions may return `Err`;
    /// the dispatch engine tolerates that too.
    async fn post(
        &self,
        text: &str,
        image_url: Option<&str>,
        link: Option<&str>,
    ) -> Result<PostOutcome>;
}

/// Build the adapter list from the configured channel sections, in dispatch order.
pub fn build(cfg: &Config) -> Vec<Arc<dyn Channel>> {
    let dry_run = cfg.app.dry_run;
    let mut channels: Vec<Arc<dyn Channel>> = Vec::new();
    if let Some(settings) = &cfg.channels.facebook {
        channels.push(Arc::new(FacebookChannel::new(settings.clone(), dry_run)));
    }
    if let Some(settings) = &cfg.channels.instagram {
        channels.push(Arc::new(InstagramChannel::new(settings.clone(), dry_run)));
    }
    if let Some(settings) = &cfg.channels.twitter {
        channels.push(Arc::new(TwitterChannel::new(settings.clone(), dry_run)));
    }
    channels
}
