use crate::file::FileSink;
use crate::sink::AlertSink;
use crate::webhook::{WebhookConfig, WebhookSink};
use kpi_types::AlertPayload;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info};

/// 告警投递配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub webhook: Option<WebhookConfig>,

    /// `<TYPE>_signals.json` 的输出目录
    pub signals_dir: Option<PathBuf>,
}

/// 一次投递的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub sent: usize,
    pub failed: usize,
}

/// 告警投递管理器：把载荷发给所有启用的目标，失败只记录
#[derive(Default)]
pub struct SinkManager {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl SinkManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AlertConfig) -> Self {
        let mut manager = Self::new();
        if let Some(webhook) = &config.webhook {
            manager.register(Box::new(WebhookSink::new(webhook.clone())));
        }
        if let Some(dir) = &config.signals_dir {
            manager.register(Box::new(FileSink::new(dir.clone())));
        }
        manager
    }

    /// 注册投递目标
    pub fn register(&mut self, sink: Box<dyn AlertSink>) {
        info!("Registered alert sink: {}", sink.name());
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: Box<dyn AlertSink>) -> Self {
        self.register(sink);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// 投递到所有目标
    pub async fn deliver(&self, payload: &AlertPayload) -> DeliveryStats {
        let mut stats = DeliveryStats::default();

        for sink in self.sinks.iter().filter(|s| s.is_enabled()) {
            match sink.send(payload).await {
                Ok(()) => {
                    info!(
                        sink = sink.name(),
                        node_type = %payload.node_type,
                        entries = payload.data.len(),
                        "Alert delivered"
                    );
                    stats.sent += 1;
                }
                Err(e) => {
                    error!(sink = sink.name(), node_type = %payload.node_type, error = %e, "Alert delivery failed");
                    stats.failed += 1;
                }
            }
        }

        stats
    }
}
