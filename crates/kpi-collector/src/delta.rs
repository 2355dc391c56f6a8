//! 增量计数器日志采集（PGW）
//!
//! 日志第二行是 `|` 分隔的表头，其后每行是一次累计计数器快照。
//! 取最后 K+1 行，对相邻两行求增量：`completed_delta * 100 / attempted_delta`，
//! 按 KPI 求平均，时间取最后一行。

use crate::collector::{CollectContext, NodeCollector};
use crate::error::{ParseError, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use kpi_remote::RemoteSession;
use kpi_types::{KpiSample, NodeConfig, NodeType};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 一个增量比率 KPI：完成计数器 / 尝试计数器
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaKpi {
    pub name: String,
    pub completed: String,
    pub attempted: String,
}

impl DeltaKpi {
    pub fn new(
        name: impl Into<String>,
        completed: impl Into<String>,
        attempted: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            completed: completed.into(),
            attempted: attempted.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaOptions {
    /// 参与计算的相邻行对数（读取最后 `intervals + 1` 行）
    pub intervals: usize,

    /// 表头所在行（从 1 开始）
    pub header_line: usize,

    pub separator: String,

    /// 第一列时间的格式
    pub time_format: String,

    pub kpis: Vec<DeltaKpi>,
}

impl Default for DeltaOptions {
    fn default() -> Self {
        Self {
            intervals: 3,
            header_line: 2,
            separator: "|".to_string(),
            time_format: "%Y-%m-%d %H:%M:%S".to_string(),
            kpis: vec![
                DeltaKpi::new(
                    "PgwS5CreateSessionFR",
                    "pgw-completed-eps-bearer-stats:pgw-completed-eps-bearer-activation",
                    "pgw-attempted-eps-bearer-stats:pgw-attempted-eps-bearer-activation",
                ),
                DeltaKpi::new(
                    "SgwS4S11CreateSessionFR",
                    "sgw-gtp-tunnel-mgmt-s4-s11:sm-create-session-resp-acc-sent",
                    "sgw-gtp-tunnel-mgmt-s4-s11:sm-create-session-req-rcvd",
                ),
                DeltaKpi::new(
                    "GgsnCreatePdpCtxFR",
                    "ggsn-pdp-contexts-stats-completed:ggsn-completed-activation",
                    "ggsn-pdp-contexts-stats-attempted:ggsn-attempted-activation",
                ),
            ],
        }
    }
}

/// 单个 KPI 的平均结果
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DeltaAverage {
    pub kpi_name: String,
    pub ratio: f64,
    pub attempted: f64,
}

/// 一次计算的结果
#[derive(Debug, Default)]
pub(crate) struct DeltaOutcome {
    pub time: Option<NaiveDateTime>,
    pub averages: Vec<DeltaAverage>,
    pub errors: Vec<ParseError>,
}

/// 增量比率；尝试次数没有增长（为 0 或计数器回绕为负）时定义为 0
pub fn delta_ratio(completed_delta: i64, attempted_delta: i64) -> f64 {
    if attempted_delta > 0 {
        completed_delta as f64 * 100.0 / attempted_delta as f64
    } else {
        0.0
    }
}

fn counter(parts: &[&str], idx: usize, name: &str) -> std::result::Result<i64, ParseError> {
    let raw = parts.get(idx).map(|s| s.trim()).unwrap_or("");
    raw.parse::<i64>()
        .map_err(|_| ParseError::invalid_number(name, raw))
}

pub(crate) fn compute_deltas(
    header: &str,
    lines: &[String],
    options: &DeltaOptions,
) -> DeltaOutcome {
    let sep = options.separator.as_str();
    let header_parts: Vec<&str> = header.split(sep).map(str::trim).collect();
    let mut outcome = DeltaOutcome::default();

    // 列位置只需查一次
    let mut columns = Vec::with_capacity(options.kpis.len());
    for kpi in &options.kpis {
        let find = |name: &str| header_parts.iter().position(|h| *h == name);
        match (find(&kpi.completed), find(&kpi.attempted)) {
            (Some(c), Some(a)) => columns.push((kpi, c, a)),
            (None, _) => outcome.errors.push(ParseError::MissingColumn(kpi.completed.clone())),
            (_, None) => outcome.errors.push(ParseError::MissingColumn(kpi.attempted.clone())),
        }
    }

    let mut sums = vec![(0.0f64, 0usize, 0.0f64); columns.len()];
    let rows: Vec<Vec<&str>> = lines.iter().map(|l| l.split(sep).collect()).collect();

    for pair in rows.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);

        for (slot, (kpi, c_idx, a_idx)) in sums.iter_mut().zip(columns.iter()) {
            let parsed = (|| {
                let completed = counter(curr, *c_idx, &kpi.completed)?
                    - counter(prev, *c_idx, &kpi.completed)?;
                let attempted = counter(curr, *a_idx, &kpi.attempted)?
                    - counter(prev, *a_idx, &kpi.attempted)?;
                Ok::<_, ParseError>((completed, attempted))
            })();

            match parsed {
                Ok((completed, attempted)) => {
                    slot.0 += delta_ratio(completed, attempted);
                    slot.1 += 1;
                    slot.2 += attempted.max(0) as f64;
                }
                Err(e) => outcome.errors.push(e),
            }
        }
    }

    // 时间只取最新一行；解析失败则整次结果不入库
    if rows.len() >= 2 {
        let time_str = rows
            .last()
            .and_then(|row| row.first())
            .map(|s| s.trim())
            .unwrap_or("");
        match NaiveDateTime::parse_from_str(time_str, &options.time_format) {
            Ok(time) => outcome.time = Some(time),
            Err(_) => outcome
                .errors
                .push(ParseError::InvalidTimestamp(time_str.to_string())),
        }
    }

    outcome.averages = columns
        .iter()
        .zip(sums)
        .filter(|(_, (_, count, _))| *count > 0)
        .map(|((kpi, _, _), (sum, count, attempted))| DeltaAverage {
            kpi_name: kpi.name.clone(),
            ratio: sum / count as f64,
            attempted,
        })
        .collect();

    outcome
}

/// PGW 采集器
pub struct DeltaCounterCollector {
    options: DeltaOptions,
}

impl DeltaCounterCollector {
    pub fn new(options: DeltaOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl NodeCollector for DeltaCounterCollector {
    fn node_type(&self) -> NodeType {
        NodeType::Pgw
    }

    async fn collect(
        &self,
        session: &mut dyn RemoteSession,
        node: &NodeConfig,
        ctx: &CollectContext,
    ) -> Result<Vec<KpiSample>> {
        let path = node.remote_path.as_str();

        let head = match session.head_lines(path, self.options.header_line).await {
            Ok(head) => head,
            Err(e) if e.is_not_found() => {
                warn!(node = %node.id, path, "Counter log not found");
                ctx.job.record_skipped(&node.id, &e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let header = match head.get(self.options.header_line.saturating_sub(1)) {
            Some(header) if !header.trim().is_empty() => header.clone(),
            _ => {
                warn!(node = %node.id, path, "Counter log is empty or has no header");
                return Ok(Vec::new());
            }
        };

        // 文件很短时尾部会包含表头
        let lines: Vec<String> = session
            .tail_lines(path, self.options.intervals + 1)
            .await?
            .into_iter()
            .filter(|line| !head.contains(line))
            .collect();

        let outcome = compute_deltas(&header, &lines, &self.options);
        for err in &outcome.errors {
            ctx.job.record_skipped(&node.id, err);
        }

        let Some(time) = outcome.time else {
            debug!(node = %node.id, lines = lines.len(), "No complete interval in counter log");
            return Ok(Vec::new());
        };
        let timestamp = time.and_utc();

        Ok(outcome
            .averages
            .into_iter()
            .filter_map(|avg| {
                KpiSample::new(&node.id, avg.kpi_name, avg.ratio, timestamp)
                    .map(|s| s.with_secondary(avg.attempted))
            })
            .collect())
    }
}
