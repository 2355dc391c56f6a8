use crate::config::DetectorConfig;
use crate::ema::ema;
use crate::trend::evaluate_trend;
use chrono::{DateTime, Utc};
use kpi_logging::JobLog;
use kpi_timeseries::{KpiQuery, KpiStore};
use kpi_types::{AlertEntry, AlertPayload, AlertRecord, KpiSeries, KpiThreshold, NodeType};
use std::collections::HashMap;
use tracing::debug;

/// 一次检测的结果
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionOutcome {
    /// 每个 (node, kpi) 的最新一行判定
    pub records: Vec<AlertRecord>,
    pub payload: AlertPayload,
}

impl DetectionOutcome {
    pub fn empty(node_type: NodeType) -> Self {
        Self {
            records: Vec::new(),
            payload: AlertPayload::empty(node_type),
        }
    }

    pub fn alerts(&self) -> impl Iterator<Item = &AlertRecord> {
        self.records.iter().filter(|r| r.anomaly_detected)
    }
}

/// 单个序列的逐行评估结果
struct RowEval {
    ema: f64,
    floor: Option<f64>,
    reason: String,
    trend_flag: bool,
}

/// KPI 异常检测器
///
/// 在本周期入库全部完成后运行；查询失败或无数据时返回空结果，从不报错。
pub struct SignalDetector {
    config: DetectorConfig,
}

impl SignalDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub async fn run(
        &self,
        node_type: NodeType,
        thresholds: &[KpiThreshold],
        nodes: &[String],
        store: &dyn KpiStore,
        job: &JobLog,
    ) -> DetectionOutcome {
        self.run_at(node_type, thresholds, nodes, store, job, Utc::now())
            .await
    }

    /// 以给定时刻为基准计算回看窗口
    pub async fn run_at(
        &self,
        node_type: NodeType,
        thresholds: &[KpiThreshold],
        nodes: &[String],
        store: &dyn KpiStore,
        job: &JobLog,
        now: DateTime<Utc>,
    ) -> DetectionOutcome {
        let limits: HashMap<&str, f64> = thresholds
            .iter()
            .filter(|t| t.enabled && t.node_type == node_type)
            .map(|t| (t.kpi_name.as_str(), t.threshold))
            .collect();

        let since = now
            .checked_sub_signed(self.config.lookback())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let query = KpiQuery::new(node_type, since)
        .with_kpis(limits.keys().copied())
        .with_nodes(nodes.iter().cloned());

        if query.is_empty() {
            debug!(node_type = %node_type, "No KPIs or nodes configured, skipping detection");
            job.detection_finished(0, 0);
            return DetectionOutcome::empty(node_type);
        }

        let samples = match store.query(&query).await {
            Ok(samples) => samples,
            Err(e) => {
                job.detection_failed(&e);
                return DetectionOutcome::empty(node_type);
            }
        };

        let mut groups = KpiSeries::group(&samples);
        for series in &mut groups {
            series.keep_recent(self.config.window);
        }

        let mut records = Vec::with_capacity(groups.len());
        let mut payload = AlertPayload::empty(node_type);

        for series in &groups {
            let threshold = limits.get(series.kpi_name.as_str()).copied();
            let rows = self.evaluate_rows(series);
            let Some((record, rows)) = self.decide(series, threshold, rows) else {
                continue;
            };

            if record.anomaly_detected {
                if !payload.affected_kpis.contains(&series.kpi_name) {
                    payload.affected_kpis.push(series.kpi_name.clone());
                }
                payload
                    .data
                    .extend(history_entries(series, &rows, record.anomaly_detected));
            }
            records.push(record);
        }

        let alerts = records.iter().filter(|r| r.anomaly_detected).count();
        job.detection_finished(records.len(), alerts);

        DetectionOutcome { records, payload }
    }

    fn evaluate_rows(&self, series: &KpiSeries) -> Vec<RowEval> {
        let values = series.values();
        let averages = ema(&values, self.config.ema_span);

        averages
            .into_iter()
            .enumerate()
            .map(|(t, ema)| {
                let trend = evaluate_trend(&values, t, self.config.max_n, self.config.policy);
                RowEval {
                    ema,
                    trend_flag: trend.is_match(),
                    floor: trend.floor,
                    reason: trend.reason,
                }
            })
            .collect()
    }

    /// 以最新一行生成判定记录
    fn decide(
        &self,
        series: &KpiSeries,
        threshold: Option<f64>,
        rows: Vec<RowEval>,
    ) -> Option<(AlertRecord, Vec<RowEval>)> {
        let (timestamp, value) = *series.points.last()?;
        let last = rows.last()?;

        let baseline_breach = value < last.ema || threshold.is_some_and(|limit| value < limit);
        let anomaly_detected =
            series.len() >= 2 && self.config.decide(last.trend_flag, baseline_breach);

        let record = AlertRecord {
            node: series.node.clone(),
            kpi_name: series.kpi_name.clone(),
            value,
            ema: last.ema,
            floor: last.floor,
            threshold,
            timestamp,
            reason: last.reason.clone(),
            trend_flag: last.trend_flag,
            baseline_breach,
            anomaly_detected,
        };

        Some((record, rows))
    }
}

/// 告警组的完整近期历史
fn history_entries(series: &KpiSeries, rows: &[RowEval], anomaly: bool) -> Vec<AlertEntry> {
    series
        .points
        .iter()
        .zip(rows)
        .map(|((timestamp, value), row)| AlertEntry {
            timestamp: timestamp.format("%Y-%m-%d %H:%M").to_string(),
            node_kpi_key: series.node_kpi_key(),
            node: series.node.clone(),
            kpi_name: series.kpi_name.clone(),
            value: *value,
            reason: row.reason.clone(),
            floor: row.floor,
            anomaly_detected: anomaly,
        })
        .collect()
}
