//! Webhook notifications
//!
//! Posts each engine event as JSON: `{"text": "<summary>", "event": {...}}`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{DeployError, Result};
use crate::notify::{EngineEvent, Notifier};

#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    text: String,
    event: &'a EngineEvent,
}

impl WebhookNotifier {
    /// Create from the `DIPDEPLOY_WEBHOOK_URL` environment variable
    pub fn from_env() -> Option<Arc<Self>> {
        std::env::var("DIPDEPLOY_WEBHOOK_URL").ok().map(|url| {
            info!("Webhook notifications enabled");
            Arc::new(Self::build(url))
        })
    }

    pub fn new(webhook_url: String) -> Arc<Self> {
        Arc::new(Self::build(webhook_url))
    }

    fn build(webhook_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            webhook_url,
        }
    }

    pub async fn send(&self, event: &EngineEvent) -> Result<()> {
        let message = WebhookMessage {
            text: event.summary(),
            event,
        };

        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&message)
            .send()
            .await?;

        if resp.status().is_success() {
            debug!("Webhook notification sent");
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(DeployError::Internal(format!("webhook HTTP {}: {}", status, body)))
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &EngineEvent) {
        if let Err(e) = self.send(event).await {
            error!("Failed to send webhook notification: {}", e);
        }
    }
}
