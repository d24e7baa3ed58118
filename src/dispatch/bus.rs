//! Durable event bus client.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("event bus endpoint is not configured")]
    NotConfigured,

    #[error("event bus transport error: {0}")]
    Transport(String),

    #[error("event bus rejected event with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Accepts named events for asynchronous, retried execution elsewhere.
#[async_trait::async_trait]
pub trait EventBus: Send + Sync {
    async fn send(&self, name: &str, data: Value) -> Result<(), BusError>;
}

/// Posts `{name, data, ts}` to an HTTP ingest endpoint.
///
/// Without an endpoint every send fails with [`BusError::NotConfigured`], so
/// all dispatches fall back to inline execution.
pub struct HttpEventBus {
    client: Client,
    endpoint: Option<String>,
    event_key: Option<Zeroizing<String>>,
}

impl HttpEventBus {
    pub fn new(
        endpoint: Option<String>,
        event_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build event bus HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.filter(|e| !e.is_empty()),
            event_key: event_key.filter(|k| !k.is_empty()).map(Zeroizing::new),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }
}

#[async_trait::async_trait]
impl EventBus for HttpEventBus {
    async fn send(&self, name: &str, data: Value) -> Result<(), BusError> {
        let endpoint = self.endpoint.as_deref().ok_or(BusError::NotConfigured)?;

        let body = json!({
            "name": name,
            "data": data,
            "ts": Utc::now().timestamp_millis(),
        });

        let mut request = self.client.post(endpoint).json(&body);
        if let Some(key) = &self.event_key {
            request = request.bearer_auth(key.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BusError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(event = %name, "event accepted by bus");
        Ok(())
    }
}
