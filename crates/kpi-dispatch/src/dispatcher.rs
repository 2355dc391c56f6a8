use kpi_collector::{CollectContext, CollectError, NodeCollector};
use kpi_detect::SignalDetector;
use kpi_logging::{CycleReport, JobLog};
use kpi_notify::SinkManager;
use kpi_remote::SessionFactory;
use kpi_timeseries::KpiStore;
use kpi_types::{KpiSample, KpiThreshold, NodeConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::timeout_at;
use tracing::{debug, info, warn};

/// 关闭会话的等待上限
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// 调度参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// 并发采集的网元数上限
    pub max_workers: usize,

    /// 单个网元从建立会话到采集完成的超时（秒）
    pub node_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_workers: 32,
            node_timeout_secs: 60,
        }
    }
}

impl DispatchConfig {
    pub fn node_timeout(&self) -> Duration {
        Duration::from_secs(self.node_timeout_secs)
    }
}

/// 实际并发数：`min(网元数, 2 × CPU 数, max_workers)`，至少为 1
pub fn worker_count(nodes: usize, max_workers: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    bounded_workers(nodes, cpus, max_workers)
}

fn bounded_workers(nodes: usize, cpus: usize, max_workers: usize) -> usize {
    nodes.min(cpus.saturating_mul(2)).min(max_workers).max(1)
}

/// 并行采集调度器
pub struct ParallelDispatcher {
    config: DispatchConfig,
    sessions: Arc<dyn SessionFactory>,
    store: Arc<dyn KpiStore>,
    detector: SignalDetector,
    sinks: SinkManager,
    report_dir: Option<PathBuf>,
}

impl ParallelDispatcher {
    pub fn new(
        config: DispatchConfig,
        sessions: Arc<dyn SessionFactory>,
        store: Arc<dyn KpiStore>,
        detector: SignalDetector,
        sinks: SinkManager,
    ) -> Self {
        Self {
            config,
            sessions,
            store,
            detector,
            sinks,
            report_dir: None,
        }
    }

    /// 每个周期结束后把 `last_job_<TYPE>.json` 写入该目录
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    /// 运行一个周期
    ///
    /// `nodes` 中只处理与采集器类型一致且启用的网元。任何网元、入库、检测或投递
    /// 的失败都只记录，不会使周期失败。
    pub async fn run_cycle(
        &self,
        collector: Arc<dyn NodeCollector>,
        nodes: &[NodeConfig],
        thresholds: &[KpiThreshold],
    ) -> CycleReport {
        let node_type = collector.node_type();
        let job = JobLog::new(node_type);

        let nodes: Vec<NodeConfig> = nodes
            .iter()
            .filter(|n| n.enabled && n.node_type == node_type)
            .cloned()
            .collect();
        let kpi_names: Vec<String> = thresholds
            .iter()
            .filter(|t| t.enabled && t.node_type == node_type)
            .map(|t| t.kpi_name.clone())
            .collect();

        let workers = worker_count(nodes.len(), self.config.max_workers);
        job.span().in_scope(|| {
            info!(nodes = nodes.len(), workers, "Starting collection cycle");
        });

        let ctx = CollectContext::new(kpi_names, job.clone());
        let collected = self.collect_all(collector, &nodes, ctx, workers).await;

        // 入库只在全部采集结束之后进行
        let mut ingested = 0;
        let mut ingest_failures = Vec::new();
        for (node, samples) in &collected {
            if samples.is_empty() {
                continue;
            }
            match self.store.ingest(node_type, samples).await {
                Ok(count) => ingested += count,
                Err(e) => {
                    job.ingest_failed(node, &e);
                    ingest_failures.push(node.clone());
                }
            }
        }

        let node_ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        let detection = self
            .detector
            .run(node_type, thresholds, &node_ids, self.store.as_ref(), &job)
            .await;

        let mut alert_sent = false;
        if detection.payload.is_empty() {
            job.span().in_scope(|| {
                debug!("No anomalies detected, alert suppressed");
            });
        } else {
            let stats = self.sinks.deliver(&detection.payload).await;
            alert_sent = stats.sent > 0;
            if stats.failed > 0 {
                let total = stats.sent + stats.failed;
                job.alert_failed(&format_args!("{} of {} sinks failed", stats.failed, total));
            }
        }

        let mut report = job.cycle_finished();
        report.ingested = ingested;
        report.ingest_failures = ingest_failures;
        report.alert_entries = detection.payload.data.len();
        report.alert_sent = alert_sent;

        if let Some(dir) = &self.report_dir {
            if let Err(e) = report.write_to(dir) {
                warn!(node_type = %node_type, error = %e, "Failed to write cycle report");
            }
        }

        report
    }

    /// 并发采集，返回每个网元的数据点（失败的网元为空）
    async fn collect_all(
        &self,
        collector: Arc<dyn NodeCollector>,
        nodes: &[NodeConfig],
        ctx: CollectContext,
        workers: usize,
    ) -> Vec<(String, Vec<KpiSample>)> {
        let semaphore = Arc::new(Semaphore::new(workers));
        let node_timeout = self.config.node_timeout();
        let mut tasks = Vec::with_capacity(nodes.len());

        for node in nodes {
            let node = node.clone();
            let node_id = node.id.clone();
            let collector = collector.clone();
            let sessions = self.sessions.clone();
            let semaphore = semaphore.clone();
            let ctx = ctx.clone();

            let task = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return Vec::new();
                };

                let started = Instant::now();
                let result =
                    collect_node(sessions.as_ref(), collector.as_ref(), &node, &ctx, node_timeout)
                        .await;

                match result {
                    Ok(samples) => {
                        ctx.job.node_ok(&node.id, samples.len(), started.elapsed());
                        samples
                    }
                    Err(e) => {
                        ctx.job.node_failed(&node.id, &e, started.elapsed());
                        Vec::new()
                    }
                }
            });

            tasks.push((node_id, task));
        }

        // 等待全部任务结束
        let mut collected = Vec::with_capacity(tasks.len());
        for (node, task) in tasks {
            match task.await {
                Ok(samples) => collected.push((node, samples)),
                Err(e) => {
                    let reason = format!("collector task aborted: {}", e);
                    ctx.job.node_failed(&node, &reason, Duration::ZERO);
                    collected.push((node, Vec::new()));
                }
            }
        }

        collected
    }
}

/// 采集单个网元；建立会话与采集共用一个截止时间，会话在任何情况下都会关闭
async fn collect_node(
    sessions: &dyn SessionFactory,
    collector: &dyn NodeCollector,
    node: &NodeConfig,
    ctx: &CollectContext,
    node_timeout: Duration,
) -> Result<Vec<KpiSample>, CollectError> {
    let deadline = tokio::time::Instant::now() + node_timeout;
    let timed_out = || CollectError::Timeout(node_timeout.as_secs());

    let mut session = timeout_at(deadline, sessions.open(node))
        .await
        .map_err(|_| timed_out())??;

    let result = match timeout_at(deadline, collector.collect(session.as_mut(), node, ctx)).await {
        Ok(result) => result,
        Err(_) => Err(timed_out()),
    };

    match tokio::time::timeout(CLOSE_TIMEOUT, session.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(node = %node.id, error = %e, "Failed to close session"),
        Err(_) => warn!(node = %node.id, "Timed out closing session"),
    }

    result
}
