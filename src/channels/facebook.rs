//! Facebook Page publishing via the Graph API.

use super::{Channel, PostOutcome};
use crate::compose::{LinkStyle, RenderProfile};
use crate::config::FacebookSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, info};

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v19.0/";

pub struct FacebookChannel {
    http: Client,
    base_url: Url,
    settings: FacebookSettings,
    dry_run: bool,
}

impl FacebookChannel {
    pub fn new(settings: FacebookSettings, dry_run: bool) -> Self {
        let base_url = Url::parse(GRAPH_API_BASE).expect("valid default Graph API URL");
        Self::with_base_url(settings, dry_run, base_url)
    }

    pub fn with_base_url(settings: FacebookSettings, dry_run: bool, base_url: Url) -> Self {
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

    async fn execute_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Value> {
        let endpoint = self.base_url.join(path).context("invalid Graph API URL")?;
        debug!(url = %endpoint, "sending facebook request");
        let res = self.http.post(endpoint).form(form).send().await?;
        let payload = res.json::<Value>().await?;
        Ok(payload)
    }
}

#[async_trait]
impl Channel for FacebookChannel {
    fn name(&self) -> &'static str {
        "facebook"
    }

    fn profile(&self) -> RenderProfile {
        RenderProfile {
            max_chars: 5000,
            link: LinkStyle::Appended,
            include_body: true,
        }
    }

    async fn post(
        &self,
        text: &str,
        image_url: Option<&str>,
        link: Option<&str>,
    ) -> Result<PostOutcome> {
        if self.dry_run {
            info!("dry run: would post to facebook");
            return Ok(PostOutcome::published("dry_run", None));
        }

        // A photo post carries the image by URL; a plain post goes to the feed
        // with a link attachment when one is present.
        let (path, mut form): (String, Vec<(&str, &str)>) = match image_url {
            Some(image) => (
                format!("{}/photos", self.settings.page_id),
                vec![("message", text), ("url", image)],
            ),
            None => (
                format!("{}/feed", self.settings.page_id),
                vec![("message", text)],
            ),
        };
        if image_url.is_none() {
            if let Some(link) = link {
                form.push(("link", link));
            }
        }
        form.push(("access_token", self.settings.access_token.as_str()));

        let payload = match self.execute_form(&path, &form).await {
            Ok(payload) => payload,
            Err(err) => {
                return Ok(PostOutcome::failed(format!(
                    "facebook request failed: {err:#}"
                )))
            }
        };

        if let Some(message) = payload["error"]["message"].as_str() {
            return Ok(PostOutcome::failed(message));
        }

        let post_id = payload["post_id"]
            .as_str()
            .or_else(|| payload["id"].as_str())
            .unwrap_or_default()
            .to_string();
        let url = format!("https://facebook.com/{post_id}");
        Ok(PostOutcome::published(post_id, Some(url)))
    }
}
