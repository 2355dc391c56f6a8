use crate::error::{Result, SinkError};
use crate::sink::AlertSink;
use async_trait::async_trait;
use kpi_types::AlertPayload;
use std::sync::Arc;
use tokio::sync::Mutex;

/// 记录所有投递内容的告警目标，用于测试与演练模式
#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<AlertPayload>>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录后返回失败
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<AlertPayload> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send(&self, payload: &AlertPayload) -> Result<()> {
        self.sent.lock().await.push(payload.clone());
        if self.fail {
            return Err(SinkError::Other("delivery refused".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
