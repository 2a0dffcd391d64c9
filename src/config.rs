//! Configuration loader and validator for the crossposter service.
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub approval: Approval,
    pub telegram: Telegram,
    pub webhook: Webhook,
    #[serde(default)]
    pub channels: Channels,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Re-scan cadence for approved-but-undispatched items, in seconds.
    pub dispatch_interval_secs: u64,
    pub maintenance_interval_secs: u64,
    /// Politeness pause between channel calls within one dispatch run.
    pub inter_channel_delay_ms: u64,
    /// Daily posting times, "HH:MM", interpreted in UTC.
    pub post_times: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
}

/// Human-in-the-loop approval settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Approval {
    pub auto_approve: bool,
    pub timeout_minutes: u64,
}

/// Telegram bot settings (approval conversation + alerts).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    pub bot_token: String,
    pub chat_id: i64,
}

/// Content ingress settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Webhook {
    pub bind: String,
    pub secret: String,
}

/// Publishing channel credentials. A channel is enabled by the presence of its
/// section; there is no separate toggle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channels {
    #[serde(default)]
    pub facebook: Option<FacebookSettings>,
    #[serde(default)]
    pub instagram: Option<InstagramSettings>,
    #[serde(default)]
    pub twitter: Option<TwitterSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacebookSettings {
    pub page_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstagramSettings {
    pub business_account_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TwitterSettings {
    pub bearer_token: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Names of the configured channels, in dispatch order.
    pub fn enabled_channels(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.channels.facebook.is_some() {
            names.push("facebook".to_string());
        }
        if self.channels.instagram.is_some() {
            names.push("instagram".to_string());
        }
        if self.channels.twitter.is_some() {
            names.push("twitter".to_string());
        }
        names
    }

    /// Parsed daily posting times. Assumes a validated config.
    pub fn post_times(&self) -> Vec<NaiveTime> {
        self.app
            .post_times
            .iter()
            .filter_map(|t| NaiveTime::parse_from_str(t, "%H:%M").ok())
            .collect()
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.dispatch_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.dispatch_interval_secs must be > 0"));
    }
    if cfg.app.maintenance_interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "app.maintenance_interval_secs must be > 0",
        ));
    }
    for time in &cfg.app.post_times {
        if NaiveTime::parse_from_str(time, "%H:%M").is_err() {
            return Err(ConfigError::Invalid("app.post_times entries must be HH:MM"));
        }
    }

    if cfg.approval.auto_approve && cfg.approval.timeout_minutes == 0 {
        return Err(ConfigError::Invalid(
            "approval.timeout_minutes must be > 0 when auto_approve is on",
        ));
    }

    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }
    if cfg.telegram.chat_id == 0 {
        return Err(ConfigError::Invalid("telegram.chat_id must be set"));
    }

    if cfg.webhook.bind.trim().is_empty() {
        return Err(ConfigError::Invalid("webhook.bind must be non-empty"));
    }
    if cfg.webhook.secret.trim().is_empty() {
        return Err(ConfigError::Invalid("webhook.secret must be non-empty"));
    }

    if cfg.enabled_channels().is_empty() {
        return Err(ConfigError::Invalid(
            "at least one channel must be configured",
        ));
    }
    if let Some(fb) = &cfg.channels.facebook {
        if fb.page_id.trim().is_empty() || fb.access_token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "channels.facebook.page_id and access_token must be non-empty",
            ));
        }
    }
    if let Some(ig) = &cfg.channels.instagram {
        if ig.business_account_id.trim().is_empty() || ig.access_token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "channels.instagram.business_account_id and access_token must be non-empty",
            ));
        }
    }
    if let Some(tw) = &cfg.channels.twitter {
        if tw.bearer_token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "channels.twitter.bearer_token must be non-empty",
            ));
        }
    }

    Ok(())
}

/// Example YAML configuration, kept parseable and valid.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  dispatch_interval_secs: 300
  maintenance_interval_secs: 1800
  inter_channel_delay_ms: 2000
  post_times: ["09:00", "13:00", "18:00"]
  dry_run: false

approval:
  auto_approve: true
  timeout_minutes: 5

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
  chat_id: 123456789

webhook:
  bind: "0.0.0.0:5123"
  secret: "YOUR_WEBHOOK_SECRET"

channels:
  facebook:
    page_id: "YOUR_PAGE_ID"
    access_token: "YOUR_PAGE_ACCESS_TOKEN"
  instagram:
    business_account_id: "YOUR_IG_BUSINESS_ACCOUNT_ID"
    access_token: "YOUR_IG_ACCESS_TOKEN"
  twitter:
    bearer_token: "YOUR_TWITTER_BEARER_TOKEN"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(
            cfg.enabled_channels(),
            vec!["facebook", "instagram", "twitter"]
        );
        assert_eq!(cfg.post_times().len(), 3);
    }

    #[test]
    fn channel_detection_follows_configured_sections() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.channels.instagram = None;
        assert_eq!(cfg.enabled_channels(), vec!["facebook", "twitter"]);

        cfg.channels.facebook = None;
        cfg.channels.twitter = None;
        assert!(cfg.enabled_channels().is_empty());
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_bot_token() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.telegram.bot_token = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("telegram.bot_token")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_post_times() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.post_times = vec!["9am".into()];
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("post_times")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn auto_approve_requires_timeout() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.approval.timeout_minutes = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        // with auto-approval off, the timeout is unused and may be zero
        cfg.approval.auto_approve = false;
        validate(&cfg).unwrap();
    }

    #[test]
    fn invalid_channel_credentials() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.channels.facebook.as_mut().unwrap().access_token = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.channels.twitter.as_mut().unwrap().bearer_token = " ".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.telegram.chat_id, 123456789);
    }
}
