use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;

/// Runtime settings, from an optional JSON file overridden by flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Only watch readers whose name contains this
    pub reader: Option<String>,

    /// How long one card presence poll waits before printing another dot
    pub poll_timeout_ms: u64,

    /// Pause after a disconnect, giving time to pull the card out
    pub grace_period_secs: u64,

    /// Send SELECT CARD TYPE (SLE4432/4442/4418) after connecting
    pub select_card_type: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reader: None,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            select_card_type: false,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        settings.validate()?;

        log::debug!("Loaded settings from {}: {:?}", path.display(), settings);
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_timeout_ms == 0 {
            bail!("Poll timeout must be greater than zero");
        }
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}
