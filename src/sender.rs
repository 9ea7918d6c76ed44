//! Platform delivery seam.
//!
//! The worker hands every popped item to a [`Sender`]; what lies behind it
//! — a chat platform gateway, a log file, a test recorder — is not the
//! scheduler's business. Senders are expected to fail on transient network
//! trouble; the worker logs the failure and drops the item.
//!
//! [`JsonlSender`] is the development sender (one JSON record per
//! delivery, appended to a local log). [`GatewaySender`] posts to an
//! external HTTP adapter.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use crate::config::SenderConfig;
use crate::moderation::ModerationVerdict;

/// Performs the actual platform send for one outbound item.
///
/// Implementations must be assumed to fail on transient network errors;
/// the caller treats a returned error as a dropped delivery, not a fatal
/// condition.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Deliver `text` to the platform.
    ///
    /// `metadata` is the opaque routing payload attached at enqueue time
    /// (conversation key, group/user ids). `moderation` is the verdict the
    /// text was delivered under, for audit trails on the receiving side.
    ///
    /// # Errors
    ///
    /// Returns an error when delivery failed; the item will not be retried.
    async fn send(
        &self,
        text: &str,
        metadata: &serde_json::Value,
        item_id: &str,
        moderation: &ModerationVerdict,
    ) -> anyhow::Result<()>;
}

/// Appends one JSON record per delivery to a local JSONL log.
///
/// Stands in for the platform during development and in tests; the log is
/// also a serviceable audit trail of what left the system.
#[derive(Debug, Clone)]
pub struct JsonlSender {
    path: PathBuf,
}

impl JsonlSender {
    /// Create a sender writing to `path`. Parent directories are created
    /// on first send.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the send log.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl Sender for JsonlSender {
    async fn send(
        &self,
        text: &str,
        metadata: &serde_json::Value,
        item_id: &str,
        moderation: &ModerationVerdict,
    ) -> anyhow::Result<()> {
        let now = Utc::now();
        let record = serde_json::json!({
            "ts": now.timestamp(),
            "iso_ts": now.to_rfc3339(),
            "send_item_id": item_id,
            "conversation_key": metadata.get("conversation_key"),
            "text": text,
            "moderation": moderation,
            "meta": metadata,
        });

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut line = serde_json::to_string(&record).context("failed to encode send record")?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open send log {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .context("failed to append send record")?;

        debug!(item_id = %item_id, path = %self.path.display(), "delivery logged");
        Ok(())
    }
}

/// Posts deliveries to an external HTTP gateway.
///
/// The gateway owns the platform wire format; this sender ships a JSON
/// payload with the text, item id, routing metadata, and the moderation
/// verdict, with optional bearer authentication.
#[derive(Debug, Clone)]
pub struct GatewaySender {
    endpoint: Url,
    token: Option<String>,
    client: reqwest::Client,
}

impl GatewaySender {
    /// Build a sender for `endpoint` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL or the HTTP
    /// client cannot be constructed.
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("invalid gateway endpoint: {endpoint}"))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build gateway HTTP client")?;
        Ok(Self {
            endpoint,
            token,
            client,
        })
    }
}

#[async_trait]
impl Sender for GatewaySender {
    async fn send(
        &self,
        text: &str,
        metadata: &serde_json::Value,
        item_id: &str,
        moderation: &ModerationVerdict,
    ) -> anyhow::Result<()> {
        let payload = serde_json::json!({
            "text": text,
            "send_item_id": item_id,
            "meta": metadata,
            "moderation": moderation,
        });

        let mut request = self.client.post(self.endpoint.clone()).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        request
            .send()
            .await
            .context("gateway request failed")?
            .error_for_status()
            .context("gateway rejected delivery")?;

        debug!(item_id = %item_id, "delivered to gateway");
        Ok(())
    }
}

/// Build the configured sender: the HTTP gateway when an endpoint is set,
/// the JSONL send log otherwise.
///
/// # Errors
///
/// Returns an error if the configured endpoint is invalid.
pub fn from_config(config: &SenderConfig) -> anyhow::Result<Arc<dyn Sender>> {
    match &config.endpoint {
        Some(endpoint) => Ok(Arc::new(GatewaySender::new(
            endpoint,
            config.token.clone(),
            config.timeout(),
        )?)),
        None => Ok(Arc::new(JsonlSender::new(config.send_log_path()))),
    }
}
