use crate::cli::{CliCounterCollector, CliOptions};
use crate::delta::{DeltaCounterCollector, DeltaOptions};
use crate::error::Result;
use crate::session_stat::{SessionStatCollector, SessionStatOptions};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use kpi_logging::JobLog;
use kpi_remote::{RemoteSession, SessionOptions};
use kpi_types::{KpiSample, NodeConfig, NodeType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 一次采集的上下文
#[derive(Clone)]
pub struct CollectContext {
    /// 需要采集的 KPI 名称（来自启用的门限配置）
    pub kpi_names: Vec<String>,

    /// 采集时刻（网元本地时间）
    pub now: NaiveDateTime,

    pub job: JobLog,
}

impl CollectContext {
    pub fn new(kpi_names: Vec<String>, job: JobLog) -> Self {
        Self {
            kpi_names,
            now: Local::now().naive_local(),
            job,
        }
    }

    pub fn at(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }
}

/// 网元 KPI 采集器
///
/// 实现只负责解析；会话由调用方打开并在任何情况下关闭。
/// 格式错误的记录通过 [`JobLog::record_skipped`] 记录后跳过，只有传输错误会返回 `Err`。
#[async_trait]
pub trait NodeCollector: Send + Sync {
    /// 适用的网元类型
    fn node_type(&self) -> NodeType;

    /// 采集一个网元
    async fn collect(
        &self,
        session: &mut dyn RemoteSession,
        node: &NodeConfig,
        ctx: &CollectContext,
    ) -> Result<Vec<KpiSample>>;
}

/// 各类采集器的参数
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorOptions {
    pub mme: CliOptions,
    pub pgw: DeltaOptions,
    pub sbg: SessionStatOptions,
}

impl CollectorOptions {
    /// 某类网元的会话参数：SBG 需要提权启动 sftp-server
    pub fn session_options(&self, node_type: NodeType, base: &SessionOptions) -> SessionOptions {
        let mut options = base.clone();
        if node_type == NodeType::Sbg && options.sftp_command.is_none() {
            options.sftp_command = self.sbg.sftp_command.clone();
        }
        options
    }
}

/// 按网元类型创建采集器
pub fn collector_for(node_type: NodeType, options: &CollectorOptions) -> Arc<dyn NodeCollector> {
    match node_type {
        NodeType::Mme => Arc::new(CliCounterCollector::new(options.mme.clone())),
        NodeType::Pgw => Arc::new(DeltaCounterCollector::new(options.pgw.clone())),
        NodeType::Sbg => Arc::new(SessionStatCollector::new(options.sbg.clone())),
    }
}
