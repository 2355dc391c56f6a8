use crate::error::{Result, SinkError};
use crate::sink::AlertSink;
use async_trait::async_trait;
use kpi_types::AlertPayload;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,

    /// 请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_secs: default_timeout_secs(),
            headers: HashMap::new(),
        }
    }
}

/// 以 JSON POST 投递告警
pub struct WebhookSink {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn send(&self, payload: &AlertPayload) -> Result<()> {
        let mut request = self
            .client
            .post(&self.config.url)
            .timeout(Duration::from_secs(self.config.timeout_secs));

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.json(payload).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        info!(
            node_type = %payload.node_type,
            entries = payload.data.len(),
            status = status.as_u16(),
            body = %body,
            "Webhook responded"
        );

        if status.is_success() {
            Ok(())
        } else {
            Err(SinkError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
