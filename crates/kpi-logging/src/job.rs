//! 每个网元类型、每个周期一份的运行日志句柄
//!
//! `JobLog` 在周期开始时创建，克隆后传给各个采集任务、入库和检测步骤。
//! 所有事件都挂在同一个 `job` span 下，同时累积成 [`CycleReport`]。

use crate::report::{CycleReport, OutcomeEntry, OutcomeStatus};
use chrono::{DateTime, Utc};
use kpi_types::NodeType;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Span};
use uuid::Uuid;

#[derive(Default)]
struct JobState {
    outcomes: Vec<OutcomeEntry>,
    skipped: HashMap<String, usize>,
}

struct JobInner {
    node_type: NodeType,
    run_id: Uuid,
    span: Span,
    started: Instant,
    started_at: DateTime<Utc>,
    state: Mutex<JobState>,
}

/// 周期运行日志
#[derive(Clone)]
pub struct JobLog {
    inner: Arc<JobInner>,
}

impl JobLog {
    pub fn new(node_type: NodeType) -> Self {
        let run_id = Uuid::new_v4();
        let span = info_span!("job", node_type = %node_type, run_id = %run_id);

        Self {
            inner: Arc::new(JobInner {
                node_type,
                run_id,
                span,
                started: Instant::now(),
                started_at: Utc::now(),
                state: Mutex::new(JobState::default()),
            }),
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.inner.node_type
    }

    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    /// 周期 span，可用于 `Instrument`
    pub fn span(&self) -> &Span {
        &self.inner.span
    }

    /// 网元采集成功
    pub fn node_ok(&self, node: &str, samples: usize, duration: Duration) {
        let duration_ms = duration.as_millis() as u64;
        self.inner.span.in_scope(|| {
            info!(node, samples, duration_ms, "Node collected");
        });
        self.push_outcome(node, OutcomeStatus::Success, samples, duration_ms, None);
    }

    /// 网元采集失败（连接、认证、超时等）
    pub fn node_failed(&self, node: &str, err: &dyn Display, duration: Duration) {
        let duration_ms = duration.as_millis() as u64;
        let message = err.to_string();
        self.inner.span.in_scope(|| {
            error!(node, duration_ms, error = %message, "Node collection failed");
        });
        self.push_outcome(node, OutcomeStatus::Failed, 0, duration_ms, Some(message));
    }

    /// 跳过一条记录（格式错误的行、缺失的文件等），不影响其它记录
    pub fn record_skipped(&self, node: &str, reason: &dyn Display) {
        self.inner.span.in_scope(|| {
            warn!(node, reason = %reason, "Record skipped");
        });
        *self.state().skipped.entry(node.to_string()).or_insert(0) += 1;
    }

    /// 写入时序库失败
    pub fn ingest_failed(&self, node: &str, err: &dyn Display) {
        self.inner.span.in_scope(|| {
            error!(node, error = %err, "Ingest failed");
        });
    }

    /// 检测阶段的信息性事件
    pub fn detection_finished(&self, groups: usize, alerts: usize) {
        self.inner.span.in_scope(|| {
            info!(groups, alerts, "Signal detection finished");
        });
    }

    /// 检测查询失败，本周期按零告警处理
    pub fn detection_failed(&self, err: &dyn Display) {
        self.inner.span.in_scope(|| {
            error!(error = %err, "Signal detection query failed");
        });
    }

    /// 告警投递失败
    pub fn alert_failed(&self, err: &dyn Display) {
        self.inner.span.in_scope(|| {
            warn!(error = %err, "Alert delivery failed");
        });
    }

    /// 周期结束：输出汇总日志并生成报告
    pub fn cycle_finished(&self) -> CycleReport {
        let duration_ms = self.inner.started.elapsed().as_millis() as u64;

        let mut outcomes = self.state().outcomes.clone();
        outcomes.sort_by(|a, b| a.node.cmp(&b.node));

        let succeeded = outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Success)
            .count();
        let failed = outcomes.len() - succeeded;

        self.inner.span.in_scope(|| {
            info!(
                duration_ms,
                total = outcomes.len(),
                succeeded,
                failed,
                "Collection cycle finished"
            );
        });

        CycleReport {
            node_type: self.inner.node_type,
            run_id: self.inner.run_id,
            started_at: self.inner.started_at,
            finished_at: Utc::now(),
            duration_ms,
            total: outcomes.len(),
            succeeded,
            failed,
            ingested: 0,
            ingest_failures: Vec::new(),
            alert_entries: 0,
            alert_sent: false,
            outcomes,
        }
    }

    fn push_outcome(
        &self,
        node: &str,
        status: OutcomeStatus,
        samples: usize,
        duration_ms: u64,
        error: Option<String>,
    ) {
        let mut state = self.state();
        let skipped_records = state.skipped.get(node).copied().unwrap_or(0);
        state.outcomes.push(OutcomeEntry {
            node: node.to_string(),
            status,
            samples,
            duration_ms,
            skipped_records,
            error,
        });
    }

    fn state(&self) -> MutexGuard<'_, JobState> {
        // 日志记录不应因其它任务 panic 而中断
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
