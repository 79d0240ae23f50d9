//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, path::PathBuf, sync::Arc, time::Duration};

use serde::Deserialize;

use super::types::{Res, RunMode};

/// Default path of the counter store.
fn default_db_path() -> PathBuf {
    PathBuf::from("reactions.db")
}

/// Default idle delay between two polls of the event stream.
fn default_poll_interval_ms() -> u64 {
    1000
}

/// Default linear backoff step between reconnect attempts.
fn default_retry_step_secs() -> u64 {
    2
}

/// Default source revision reported by `showme version`.
fn default_revision() -> String {
    option_env!("BEEBOT_GIT_REV").unwrap_or(env!("CARGO_PKG_VERSION")).to_string()
}

/// Configuration for the beebot application.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<ConfigInner> for Config {
    fn from(inner: ConfigInner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// Slack app-level token used to open socket mode connections (`SLACK_APP_TOKEN`).
    pub slack_app_token: String,
    /// Slack bot token used for Web API calls (`SLACK_BOT_TOKEN`).
    pub slack_bot_token: String,
    /// Path of the counter store (`DB_PATH`).
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Reply behavior for `showme` commands (`MODE`).
    #[serde(default)]
    pub mode: RunMode,
    /// Log every raw event before it is classified (`DEBUG`).
    #[serde(default)]
    pub debug: bool,
    /// Idle delay between polls of the event stream, in milliseconds (`POLL_INTERVAL_MS`).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Linear backoff step between reconnect attempts, in seconds (`RETRY_STEP_SECS`).
    #[serde(default = "default_retry_step_secs")]
    pub retry_step_secs: u64,
    /// Source revision reported by `showme version` (`REVISION`).
    #[serde(default = "default_revision")]
    pub revision: String,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            slack_app_token: String::new(),
            slack_bot_token: String::new(),
            db_path: default_db_path(),
            mode: RunMode::default(),
            debug: false,
            poll_interval_ms: default_poll_interval_ms(),
            retry_step_secs: default_retry_step_secs(),
            revision: default_revision(),
        }
    }
}

impl ConfigInner {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_step(&self) -> Duration {
        Duration::from_secs(self.retry_step_secs)
    }
}

/// Values given on the command line, which win over file and environment.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub mode: Option<RunMode>,
    pub debug: bool,
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>, overrides: &ConfigOverrides) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("BEEBOT"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        cfg = cfg.set_override_option("mode", overrides.mode.map(|m| m.to_string()))?;

        if overrides.debug {
            cfg = cfg.set_override("debug", true)?;
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    fn validate(&self) -> Res<()> {
        if self.slack_app_token.is_empty() {
            return Err(anyhow::anyhow!("Slack app token must be set."));
        }

        if self.slack_bot_token.is_empty() {
            return Err(anyhow::anyhow!("Slack bot token must be set."));
        }

        if self.poll_interval_ms < 1 || self.poll_interval_ms > 60000 {
            return Err(anyhow::anyhow!("Poll interval must be between 1 and 60000 milliseconds."));
        }

        Ok(())
    }
}
