//! Instagram publishing via the Graph API Content Publishing flow.
//! Requires an Instagram Business Account connected to a Facebook Page, and
//! the image must already be reachable by public URL.

use super::{Channel, PostOutcome};
use crate::compose::{LinkStyle, RenderProfile};
use crate::config::InstagramSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, info};

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v19.0/";

pub struct InstagramChannel {
    http: Client,
    base_url: Url,
    settings: InstagramSettings,
    dry_run: bool,
}

impl InstagramChannel {
    pub fn new(settings: InstagramSettings, dry_run: bool) -> Self {
        let base_url = Url::parse(GRAPH_API_BASE).expect("valid default Graph API URL");
        Self::with_base_url(settings, dry_run, base_url)
    }

    pub fn with_base_url(settings: InstagramSettings, dry_run: bool, base_url: Url) -> Self {
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
        debug!(url = %endpoint, "sending instagram request");
        let res = self.http.post(endpoint).form(form).send().await?;
        let payload = res.json::<Value>().await?;
        Ok(payload)
    }
}

#[async_trait]
impl Channel for InstagramChannel {
    fn name(&self) -> &'static str {
        "instagram"
    }

    fn requires_media(&self) -> bool {
        true
    }

    fn profile(&self) -> RenderProfile {
        RenderProfile {
            max_chars: 2200,
            link: LinkStyle::Marker("🔗 Link in bio"),
            include_body: true,
        }
    }

    async fn post(
        &self,
        text: &str,
        image_url: Option<&str>,
        _link: Option<&str>,
    ) -> Result<PostOutcome> {
        if self.dry_run {
            info!("dry run: would post to instagram");
            return Ok(PostOutcome::published("dry_run", None));
        }

        let Some(image) = image_url else {
            return Ok(PostOutcome::failed("instagram requires an image"));
        };

        // Step 1: create the media container.
        let account = &self.settings.business_account_id;
        let create = match self
            .execute_form(
                &format!("{account}/media"),
                &[
                    ("image_url", image),
                    ("caption", text),
                    ("access_token", self.settings.access_token.as_str()),
                ],
            )
            .await
        {
            Ok(payload) => payload,
            Err(err) => {
                return Ok(PostOutcome::failed(format!(
                    "instagram container request failed: {err:#}"
                )))
            }
        };
        if let Some(message) = create["error"]["message"].as_str() {
            return Ok(PostOutcome::failed(message));
        }
        let Some(creation_id) = create["id"].as_str() else {
            return Ok(PostOutcome::failed("no container id in instagram response"));
        };

        // Step 2: publish the container.
        let publish = match self
            .execute_form(
                &format!("{account}/media_publish"),
                &[
                    ("creation_id", creation_id),
                    ("access_token", self.settings.access_token.as_str()),
                ],
            )
            .await
        {
            Ok(payload) => payload,
            Err(err) => {
                return Ok(PostOutcome::failed(format!(
                    "instagram publish request failed: {err:#}"
                )))
            }
        };
        if let Some(message) = publish["error"]["message"].as_str() {
            return Ok(PostOutcome::failed(message));
        }

        let media_id = publish["id"].as_str().unwrap_or_default().to_string();
        Ok(PostOutcome::published(media_id, None))
    }
}
