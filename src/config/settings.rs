//! Provider settings.
//!
//! Maps to the provider settings YAML file:
//!
//! ```yaml
//! region: us-west-2
//! default_tags:
//!   team: networking
//! ignore_tags:
//!   keys: [owner]
//!   key_prefixes: ["kubernetes.io/"]
//! timeouts:
//!   create_secs: 1200
//! wait:
//!   initial_delay_ms: 500
//!   max_delay_ms: 10000
//!   jitter: 0.25
//! state:
//!   path: .lattice/state.json
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::tags::{IgnoreTags, SYSTEM_TAG_PREFIX, TagPolicy, Tags};
use crate::wait::WaitConfig;

/// Default timeout for each lifecycle phase, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 20 * 60;

/// Root provider settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProviderSettings {
    /// AWS region; falls back to the SDK's default chain when unset.
    #[serde(default)]
    pub region: Option<String>,
    /// Tags merged into every resource.
    #[serde(default)]
    pub default_tags: Tags,
    /// Tags never managed.
    #[serde(default)]
    pub ignore_tags: IgnoreTags,
    /// Per-phase timeouts.
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Polling backoff.
    #[serde(default)]
    pub wait: WaitSettings,
    /// State storage.
    #[serde(default)]
    pub state: StateSettings,
}

/// Per-phase timeouts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timeouts {
    /// Create timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub create_secs: u64,
    /// Update timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub update_secs: u64,
    /// Delete timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub delete_secs: u64,
}

/// Polling backoff settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WaitSettings {
    /// Initial delay between probes in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Maximum delay between probes in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor (0.0 - 1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

/// State storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateSettings {
    /// Local state file path; defaults to `.lattice/state.json`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_initial_delay_ms() -> u64 {
    500
}

const fn default_max_delay_ms() -> u64 {
    10_000
}

const fn default_jitter() -> f64 {
    0.25
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create_secs: DEFAULT_TIMEOUT_SECS,
            update_secs: DEFAULT_TIMEOUT_SECS,
            delete_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Timeouts {
    /// Create timeout.
    #[must_use]
    pub const fn create(&self) -> Duration {
        Duration::from_secs(self.create_secs)
    }

    /// Update timeout.
    #[must_use]
    pub const fn update(&self) -> Duration {
        Duration::from_secs(self.update_secs)
    }

    /// Delete timeout.
    #[must_use]
    pub const fn delete(&self) -> Duration {
        Duration::from_secs(self.delete_secs)
    }
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl ProviderSettings {
    /// Builds the tag policy.
    #[must_use]
    pub fn tag_policy(&self) -> TagPolicy {
        TagPolicy::new(self.default_tags.clone(), self.ignore_tags.clone())
    }

    /// Builds the polling backoff configuration.
    #[must_use]
    pub const fn wait_config(&self) -> WaitConfig {
        WaitConfig {
            initial_delay: Duration::from_millis(self.wait.initial_delay_ms),
            max_delay: Duration::from_millis(self.wait.max_delay_ms),
            jitter: self.wait.jitter,
        }
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.wait.jitter) {
            return Err(ConfigError::validation(
                format!("jitter must be between 0 and 1, got {}", self.wait.jitter),
                "wait.jitter",
            ));
        }

        if self.wait.initial_delay_ms == 0 {
            return Err(ConfigError::validation(
                "initial delay must be positive",
                "wait.initial_delay_ms",
            ));
        }

        if self.wait.max_delay_ms < self.wait.initial_delay_ms {
            return Err(ConfigError::validation(
                "max delay must not be below initial delay",
                "wait.max_delay_ms",
            ));
        }

        for (field, secs) in [
            ("timeouts.create_secs", self.timeouts.create_secs),
            ("timeouts.update_secs", self.timeouts.update_secs),
            ("timeouts.delete_secs", self.timeouts.delete_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::validation("timeout must be positive", field));
            }
        }

        for key in self.default_tags.keys() {
            if key.trim().is_empty() {
                return Err(ConfigError::validation("tag key cannot be empty", "default_tags"));
            }
            if key.starts_with(SYSTEM_TAG_PREFIX) {
                return Err(ConfigError::validation(
                    format!("tag key {key} uses the reserved {SYSTEM_TAG_PREFIX} prefix"),
                    "default_tags",
                ));
            }
        }

        if self.ignore_tags.keys.iter().any(|k| k.is_empty())
            || self.ignore_tags.key_prefixes.iter().any(String::is_empty)
        {
            return Err(ConfigError::validation(
                "ignored tag keys and prefixes cannot be empty",
                "ignore_tags",
            ));
        }

        Ok(())
    }
}
