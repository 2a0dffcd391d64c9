//! Twitter/X publishing via the v2 API. Posts text-only tweets; attaching
//! media needs the v1.1 upload endpoint and its separate OAuth1 flow.

use super::{Channel, PostOutcome};
use crate::compose::{LinkStyle, RenderProfile};
use crate::config::TwitterSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use tracing::{debug, info};

const TWITTER_API_BASE: &str = "https://api.twitter.com/";

pub struct TwitterChannel {
    http: Client,
    base_url: Url,
    settings: TwitterSettings,
    dry_run: bool,
}

impl TwitterChannel {
    pub fn new(settings: TwitterSettings, dry_run: bool) -> Self {
        let base_url = Url::parse(TWITTER_API_BASE).expect("valid default Twitter API URL");
        Self::with_base_url(settings, dry_run, base_url)
    }

    pub fn with_base_url(settings: TwitterSettings, dry_run: bool, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("tg-crossposter/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            settings,
            dry_run,
        }
    }
}

#[async_trait]
impl Channel for TwitterChannel {
    fn name(&self) -> &'static str {
        "twitter"
    }

    fn profile(&self) -> RenderProfile {
        RenderProfile {
            max_chars: 280,
            link: LinkStyle::Appended,
            include_body: false,
        }
    }

    async fn post(
        &self,
        text: &str,
        _image_url: Option<&str>,
        _link: Option<&str>,
    ) -> Result<PostOutcome> {
        if self.dry_run {
            info!("dry run: would tweet");
            return Ok(PostOutcome::published("dry_run", None));
        }

        let endpoint = self
            .base_url
            .join("2/tweets")
            .context("invalid Twitter API URL")?;
        debug!(url = %endpoint, "sending tweet");
        let res = match self
            .http
            .post(endpoint)
            .bearer_auth(&self.settings.bearer_token)
            .json(&json!({ "text": text }))
            .send()
            .await
        {
            Ok(res) => res,
            Err(err) => {
                return Ok(PostOutcome::failed(format!(
                    "twitter request failed: {err:#}"
                )))
            }
        };

        let status = res.status();
        let payload = match res.json::<Value>().await {
            Ok(payload) => payload,
            Err(err) => {
                return Ok(PostOutcome::failed(format!(
                    "invalid twitter response: {err:#}"
                )))
            }
        };

        if !status.is_success() {
            let detail = payload["detail"]
                .as_str()
                .or_else(|| payload["title"].as_str())
                .unwrap_or("unknown error");
            return Ok(PostOutcome::failed(format!(
                "twitter error {status}: {detail}"
            )));
        }

        let Some(tweet_id) = payload["data"]["id"].as_str() else {
            return Ok(PostOutcome::failed("no tweet id in response"));
        };
        let url = format!("https://twitter.com/i/status/{tweet_id}");
        Ok(PostOutcome::published(tweet_id, Some(url)))
    }
}
