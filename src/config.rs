//! Configuration loading and management.
//!
//! Loads odn configuration from `./odn.toml` (or `$ODN_CONFIG_PATH`).
//! Environment variables override file values; file values override
//! defaults. A missing file is not an error, it just means defaults.
//!
//! The defaults mirror the rates the system was tuned for in production:
//! 2 messages/second globally, a 1.2s per-conversation cooldown, 30
//! queued items per conversation, a 100ms worker tick.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

/// Top-level configuration for the scheduling core.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OdnConfig {
    /// Delivery queue rates and capacities (`[delivery]`).
    pub delivery: DeliveryConfig,
    /// Moderation collaborator settings (`[moderation]`).
    pub moderation: ModerationConfig,
    /// Platform sender settings (`[sender]`).
    pub sender: SenderConfig,
}

/// Rates and capacities for the delivery queue and its worker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Global ceiling on dispatch frequency, messages per second across
    /// all conversations. Zero or negative disables the global limit.
    pub global_rps: f64,
    /// Minimum spacing between two dispatches to the same conversation,
    /// in milliseconds.
    pub cooldown_ms: u64,
    /// Maximum queued items per conversation; further enqueues are
    /// rejected, not blocked.
    pub max_queue_per_conversation: usize,
    /// Worker idle-tick interval in milliseconds.
    pub tick_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            global_rps: 2.0,
            cooldown_ms: 1200,
            max_queue_per_conversation: 30,
            tick_ms: 100,
        }
    }
}

impl DeliveryConfig {
    /// Minimum spacing between any two dispatches (`1 / global_rps`).
    ///
    /// There is no accumulation of unused capacity: this is an
    /// elapsed-time threshold, not a token bucket.
    pub fn global_interval(&self) -> Duration {
        if self.global_rps > 0.0 {
            Duration::from_secs_f64(1.0 / self.global_rps)
        } else {
            Duration::ZERO
        }
    }

    /// Per-conversation cooldown as a [`Duration`].
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Worker idle-tick interval, clamped to at least 1ms.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

/// Settings for the moderation collaborator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Whether outbound text is moderated at all. Off by default.
    pub enabled: bool,
    /// Path of the local keyword blocklist file, if any.
    pub keywords_path: Option<PathBuf>,
}

/// Settings for the platform sender.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// HTTP gateway endpoint. When unset, deliveries go to the JSONL
    /// send log instead.
    pub endpoint: Option<String>,
    /// Bearer token for the gateway.
    pub token: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: f64,
    /// Path of the JSONL send log. Defaults to `send_log.jsonl` under
    /// the platform data directory.
    pub send_log: Option<PathBuf>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            timeout_secs: 3.0,
            send_log: None,
        }
    }
}

impl SenderConfig {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs.max(0.0))
    }

    /// Resolved send-log path: the configured one, or `send_log.jsonl`
    /// under the platform data directory, or the working directory as a
    /// last resort.
    pub fn send_log_path(&self) -> PathBuf {
        if let Some(path) = &self.send_log {
            return path.clone();
        }
        directories::ProjectDirs::from("", "", "odn")
            .map(|dirs| dirs.data_dir().join("send_log.jsonl"))
            .unwrap_or_else(|| PathBuf::from("send_log.jsonl"))
    }
}

impl OdnConfig {
    /// Load configuration with precedence env vars > TOML file > defaults.
    ///
    /// Reads `.env` first so deployments can keep overrides alongside the
    /// process. Config file path: `$ODN_CONFIG_PATH` or `./odn.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed. A missing file is fine.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from the TOML file only, no env overrides.
    fn load_from_file() -> Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                info!(path = %path.display(), "loading config from file");
                toml::from_str(&contents).context("failed to parse config TOML")
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    /// Resolve the config path using a custom env resolver (for testing).
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("ODN_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("odn.toml"))
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability. Invalid values are
    /// logged and ignored, never fatal.
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // Delivery rates.
        if let Some(v) = env("ODN_GLOBAL_RPS") {
            apply_parsed(&mut self.delivery.global_rps, "ODN_GLOBAL_RPS", &v);
        }
        if let Some(v) = env("ODN_COOLDOWN_MS") {
            apply_parsed(&mut self.delivery.cooldown_ms, "ODN_COOLDOWN_MS", &v);
        }
        if let Some(v) = env("ODN_MAX_QUEUE") {
            apply_parsed(
                &mut self.delivery.max_queue_per_conversation,
                "ODN_MAX_QUEUE",
                &v,
            );
        }
        if let Some(v) = env("ODN_TICK_MS") {
            apply_parsed(&mut self.delivery.tick_ms, "ODN_TICK_MS", &v);
        }

        // Moderation.
        if let Some(v) = env("ODN_MODERATION_ENABLED") {
            self.moderation.enabled = v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = env("ODN_KEYWORDS_PATH") {
            self.moderation.keywords_path = Some(PathBuf::from(v));
        }

        // Sender.
        if let Some(v) = env("ODN_SEND_ENDPOINT") {
            self.sender.endpoint = Some(v);
        }
        if let Some(v) = env("ODN_SEND_TOKEN") {
            self.sender.token = Some(v);
        }
        if let Some(v) = env("ODN_SEND_TIMEOUT_SECS") {
            apply_parsed(&mut self.sender.timeout_secs, "ODN_SEND_TIMEOUT_SECS", &v);
        }
        if let Some(v) = env("ODN_SEND_LOG") {
            self.sender.send_log = Some(PathBuf::from(v));
        }
    }
}

/// Parse an override value into `target`, warning and leaving the current
/// value in place when it does not parse.
fn apply_parsed<T: std::str::FromStr>(target: &mut T, var: &str, value: &str) {
    match value.parse() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!(var, value, "ignoring invalid env override"),
    }
}
