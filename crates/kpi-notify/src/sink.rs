use crate::error::Result;
use async_trait::async_trait;
use kpi_types::AlertPayload;

/// 告警投递目标
///
/// 投递是一次性的：失败只记录日志，不重试，也不影响已经完成的检测结果。
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// 投递告警载荷
    async fn send(&self, payload: &AlertPayload) -> Result<()>;

    /// 名称
    fn name(&self) -> &str;

    /// 是否启用
    fn is_enabled(&self) -> bool {
        true
    }
}
