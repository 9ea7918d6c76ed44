//! Text moderation seam.
//!
//! The scheduler never decides moderation policy itself — it runs outbound
//! text through a [`Moderator`] and trusts the verdict. The contract is
//! fail-open: implementations absorb provider errors and timeouts and
//! answer "allow", so a moderation outage degrades to unmoderated delivery
//! rather than a stalled queue.
//!
//! Two implementations ship with the crate: [`DisabledModerator`] for the
//! moderation-off path, and [`KeywordModerator`], a local substring
//! blocklist loaded from a text file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ModerationConfig;

/// Which boundary the text is crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStage {
    /// Inbound user text, before processing.
    Input,
    /// Outbound response text, before delivery.
    Output,
}

/// What the moderator wants done with the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationAction {
    /// Deliver as-is.
    Pass,
    /// Do not deliver the original text.
    Block,
}

/// Graded severity attached to a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// No risk detected.
    None,
    /// Low risk.
    Low,
    /// Medium risk.
    Medium,
    /// High risk.
    High,
}

/// Normalized moderation result, provider-independent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationVerdict {
    /// Whether the original text may be delivered.
    pub allow: bool,
    /// Requested handling.
    pub action: ModerationAction,
    /// Severity grade.
    pub risk: RiskLevel,
    /// Machine-readable reason, e.g. `keyword_match: <word>`.
    pub reason: String,
    /// Which provider produced the verdict (`disabled`, `local`, ...).
    pub provider: String,
}

impl ModerationVerdict {
    /// An allowing verdict.
    pub fn pass(reason: &str, provider: &str) -> Self {
        Self {
            allow: true,
            action: ModerationAction::Pass,
            risk: RiskLevel::None,
            reason: reason.to_owned(),
            provider: provider.to_owned(),
        }
    }

    /// A blocking verdict.
    pub fn block(risk: RiskLevel, reason: &str, provider: &str) -> Self {
        Self {
            allow: false,
            action: ModerationAction::Block,
            risk,
            reason: reason.to_owned(),
            provider: provider.to_owned(),
        }
    }
}

/// Asynchronous text classifier consulted before delivery.
///
/// Implementations must fail open: a provider error or timeout is reported
/// as an allowing verdict (with the error in `reason`), never as a Rust
/// error — the scheduler has no fallback of its own and treats every
/// verdict as authoritative.
#[async_trait]
pub trait Moderator: Send + Sync {
    /// Classify `text` at the given stage. `metadata` carries
    /// conversation-scoped context some providers use for routing.
    async fn check(
        &self,
        text: &str,
        stage: ModerationStage,
        metadata: &serde_json::Value,
    ) -> ModerationVerdict;
}

/// Pass-through moderator for deployments with moderation switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledModerator;

#[async_trait]
impl Moderator for DisabledModerator {
    async fn check(
        &self,
        _text: &str,
        _stage: ModerationStage,
        _metadata: &serde_json::Value,
    ) -> ModerationVerdict {
        ModerationVerdict::pass("moderation_disabled", "disabled")
    }
}

/// Local substring blocklist.
///
/// Keywords come from a plain text file, one per line; blank lines and
/// lines starting with `#` are ignored. A missing file means an empty
/// list, which allows everything. The file is read once at construction
/// and again on [`reload`](Self::reload).
#[derive(Debug)]
pub struct KeywordModerator {
    path: PathBuf,
    keywords: RwLock<HashSet<String>>,
}

impl KeywordModerator {
    /// Load the blocklist from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but cannot be read.
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let keywords = read_keywords(&path)?;
        info!(path = %path.display(), count = keywords.len(), "keyword blocklist loaded");
        Ok(Self {
            path,
            keywords: RwLock::new(keywords),
        })
    }

    /// Re-read the blocklist file, replacing the in-memory set.
    ///
    /// Returns the new keyword count.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read; the
    /// previous set stays in effect in that case.
    pub fn reload(&self) -> anyhow::Result<usize> {
        let fresh = read_keywords(&self.path)?;
        let count = fresh.len();
        *self
            .keywords
            .write()
            .unwrap_or_else(PoisonError::into_inner) = fresh;
        info!(path = %self.path.display(), count, "keyword blocklist reloaded");
        Ok(count)
    }

    /// Number of keywords currently loaded.
    pub fn len(&self) -> usize {
        self.keywords
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the blocklist is empty (allows everything).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Moderator for KeywordModerator {
    async fn check(
        &self,
        text: &str,
        _stage: ModerationStage,
        _metadata: &serde_json::Value,
    ) -> ModerationVerdict {
        let keywords = self
            .keywords
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        if keywords.is_empty() {
            return ModerationVerdict::pass("no_keywords_loaded", "local");
        }

        for keyword in keywords.iter() {
            if text.contains(keyword.as_str()) {
                return ModerationVerdict::block(
                    RiskLevel::High,
                    &format!("keyword_match: {keyword}"),
                    "local",
                );
            }
        }

        ModerationVerdict::pass("local_passed", "local")
    }
}

/// Build the configured moderator.
///
/// Keyword blocklist when moderation is enabled and a path is set;
/// pass-through otherwise.
///
/// # Errors
///
/// Returns an error if the keyword file exists but cannot be read.
pub fn from_config(config: &ModerationConfig) -> anyhow::Result<Arc<dyn Moderator>> {
    if config.enabled {
        match &config.keywords_path {
            Some(path) => return Ok(Arc::new(KeywordModerator::load(path.clone())?)),
            None => {
                warn!("moderation enabled but no keywords_path set, passing everything through");
            }
        }
    }
    Ok(Arc::new(DisabledModerator))
}

fn read_keywords(path: &Path) -> anyhow::Result<HashSet<String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(ToOwned::to_owned)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "keyword file missing, blocklist empty");
            Ok(HashSet::new())
        }
        Err(e) => Err(e).with_context(|| format!("failed to read keyword file {}", path.display())),
    }
}
