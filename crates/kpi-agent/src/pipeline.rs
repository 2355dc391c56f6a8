use anyhow::Result;
use kpi_collector::collector_for;
use kpi_config::AgentConfig;
use kpi_detect::SignalDetector;
use kpi_dispatch::ParallelDispatcher;
use kpi_logging::CycleReport;
use kpi_notify::{RecordingSink, SinkManager};
use kpi_remote::{SessionFactory, SshSessionFactory};
use kpi_timeseries::{KpiStore, MemoryStore, QuestStore};
use kpi_types::NodeType;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

struct Lane {
    dispatcher: ParallelDispatcher,
    running: Mutex<()>,
}

/// 按网元类型组装好的采集流水线
pub struct Pipeline {
    config: Arc<AgentConfig>,
    lanes: HashMap<NodeType, Lane>,
}

impl Pipeline {
    /// 连接时序库并为每类网元建立 SSH 会话工厂
    pub async fn connect(config: AgentConfig) -> Result<Self> {
        let store: Arc<dyn KpiStore> = Arc::new(QuestStore::connect(config.store.clone()).await?);
        store.ensure_tables().await?;

        let collectors = config.collector_options();
        let remote = config.remote.clone();
        let ssh = SshSessionFactory::new(remote.clone());
        let alert = config.alert.clone();

        Ok(Self::with_parts(
            config,
            store,
            |node_type| -> Arc<dyn SessionFactory> {
                let options = collectors.session_options(node_type, &remote);
                Arc::new(ssh.with_options(options))
            },
            |_| SinkManager::from_config(&alert),
        ))
    }

    /// 演练模式：真实采集，数据只写入内存，告警只记录不投递
    pub fn dry_run(config: AgentConfig, sink: RecordingSink) -> Self {
        let collectors = config.collector_options();
        let remote = config.remote.clone();
        let ssh = SshSessionFactory::new(remote.clone());

        Self::with_parts(
            config,
            Arc::new(MemoryStore::new()),
            |node_type| -> Arc<dyn SessionFactory> {
                let options = collectors.session_options(node_type, &remote);
                Arc::new(ssh.with_options(options))
            },
            |_| SinkManager::new().with_sink(Box::new(sink.clone())),
        )
    }

    pub fn with_parts<S, A>(
        config: AgentConfig,
        store: Arc<dyn KpiStore>,
        sessions: S,
        sinks: A,
    ) -> Self
    where
        S: Fn(NodeType) -> Arc<dyn SessionFactory>,
        A: Fn(NodeType) -> SinkManager,
    {
        let lanes = NodeType::ALL
            .into_iter()
            .map(|node_type| {
                let dispatcher = ParallelDispatcher::new(
                    config.collection.clone(),
                    sessions(node_type),
                    store.clone(),
                    SignalDetector::new(config.detector.clone()),
                    sinks(node_type),
                )
                .with_report_dir(config.logging.log_dir.clone());

                let lane = Lane {
                    dispatcher,
                    running: Mutex::new(()),
                };
                (node_type, lane)
            })
            .collect();

        Self {
            config: Arc::new(config),
            lanes,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// 运行一个周期；同类网元的上一个周期仍在运行时等待其结束
    pub async fn run_cycle(&self, node_type: NodeType) -> Option<CycleReport> {
        let lane = self.lanes.get(&node_type)?;
        let _guard = lane.running.lock().await;
        Some(self.run_lane(node_type, lane).await)
    }

    /// 运行一个周期；同类网元的上一个周期仍在运行时直接跳过
    pub async fn try_run_cycle(&self, node_type: NodeType) -> Option<CycleReport> {
        let lane = self.lanes.get(&node_type)?;
        let Ok(_guard) = lane.running.try_lock() else {
            warn!(node_type = %node_type, "Previous cycle still running, skipped");
            return None;
        };
        Some(self.run_lane(node_type, lane).await)
    }

    async fn run_lane(&self, node_type: NodeType, lane: &Lane) -> CycleReport {
        let collector = collector_for(node_type, &self.config.collector_options());
        let report = lane
            .dispatcher
            .run_cycle(collector, &self.config.nodes, &self.config.thresholds)
            .await;

        info!(
            node_type = %node_type,
            run_id = %report.run_id,
            succeeded = report.succeeded,
            failed = report.failed,
            ingested = report.ingested,
            alert_entries = report.alert_entries,
            "Cycle complete"
        );
        report
    }
}
