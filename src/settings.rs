use std::path::PathBuf;
use std::time::Duration;

use config::Config;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::parser::post_id::UnresolvedIdPolicy;

pub const DEFAULT_CLASSIFIER_URL: &str = "https://api-inference.huggingface.co/models/MoritzLaurer/mDeBERTa-v3-base-xnli-multilingual-nli-2mil7";

/// Runtime settings, read from `AID_*` environment variables (and `.env`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub discord_webhook_url: Option<String>,
    pub discord_username: Option<String>,
    pub dry_run: bool,
    pub registry_path: PathBuf,
    pub scope_selector: String,
    pub anchor_selector: String,
    pub max_links_per_site: usize,
    pub dry_run_limit: usize,
    pub fetch_timeout_secs: u64,
    pub classifier_url: String,
    pub classifier_token: Option<String>,
    pub classifier_timeout_secs: u64,
    pub hypothesis_template: String,
    pub report_unresolved_ids: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            discord_webhook_url: None,
            discord_username: None,
            dry_run: false,
            registry_path: PathBuf::from("data/homepage.json"),
            scope_selector: ".fusion-image-wrapper".into(),
            anchor_selector: "a".into(),
            max_links_per_site: 10,
            dry_run_limit: 3,
            fetch_timeout_secs: 30,
            classifier_url: DEFAULT_CLASSIFIER_URL.into(),
            classifier_token: None,
            classifier_timeout_secs: 60,
            hypothesis_template: "This job is about {}.".into(),
            report_unresolved_ids: false,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let settings = Config::builder()
            .add_source(config::Environment::with_prefix("AID").try_parsing(true))
            .build()?
            .try_deserialize::<Settings>()?;
        Ok(settings.normalized())
    }

    /// Blank strings in the environment count as unset.
    fn normalized(mut self) -> Self {
        for field in [
            &mut self.discord_webhook_url,
            &mut self.discord_username,
            &mut self.classifier_token,
        ] {
            if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *field = None;
            }
        }
        self
    }

    /// The webhook is only optional when nothing will be delivered.
    pub fn require_webhook(&self) -> Result<Option<&str>, ConfigError> {
        match (self.dry_run, self.discord_webhook_url.as_deref()) {
            (true, url) => Ok(url),
            (false, Some(url)) => Ok(Some(url)),
            (false, None) => Err(ConfigError::MissingWebhookUrl),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_secs(self.classifier_timeout_secs)
    }

    pub fn unresolved_id_policy(&self) -> UnresolvedIdPolicy {
        if self.report_unresolved_ids {
            UnresolvedIdPolicy::Report
        } else {
            UnresolvedIdPolicy::DropSilently
        }
    }
}
