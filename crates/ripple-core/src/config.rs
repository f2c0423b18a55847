//! Core configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (RIPPLE_*)
//! - TOML configuration file

use crate::queue::CollapsePolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Event distribution core configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Queue idle lifetime applied when a client does not request one,
    /// in seconds.
    #[serde(default = "default_queue_lifetime")]
    pub default_queue_lifetime_secs: u64,

    /// Upper bound on client-requested queue lifetimes, in seconds.
    #[serde(default = "default_max_queue_lifetime")]
    pub max_queue_lifetime_secs: u64,

    /// Interval between registry sweep passes, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Maximum simultaneously registered queues per principal.
    #[serde(default = "default_max_queues_per_user")]
    pub max_queues_per_user: usize,

    /// Compaction semantics applied to every queue.
    #[serde(default)]
    pub collapse: CollapsePolicy,
}

// Default value functions
fn default_queue_lifetime() -> u64 {
    std::env::var("RIPPLE_QUEUE_LIFETIME")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(600)
}

fn default_max_queue_lifetime() -> u64 {
    7200
}

fn default_sweep_interval() -> u64 {
    std::env::var("RIPPLE_SWEEP_INTERVAL")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60)
}

fn default_max_queues_per_user() -> usize {
    100
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_queue_lifetime_secs: default_queue_lifetime(),
            max_queue_lifetime_secs: default_max_queue_lifetime(),
            sweep_interval_secs: default_sweep_interval(),
            max_queues_per_user: default_max_queues_per_user(),
            collapse: CollapsePolicy::default(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "ripple.toml",
            "/etc/ripple/ripple.toml",
            "~/.config/ripple/ripple.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: CoreConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Queue lifetime used when a registration requests none.
    #[must_use]
    pub fn default_lifetime(&self) -> Duration {
        Duration::from_secs(self.default_queue_lifetime_secs)
    }

    /// Clamp a client-requested lifetime to the configured maximum.
    #[must_use]
    pub fn clamp_lifetime(&self, requested: Duration) -> Duration {
        requested.min(Duration::from_secs(self.max_queue_lifetime_secs))
    }

    /// Interval between sweep passes.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
