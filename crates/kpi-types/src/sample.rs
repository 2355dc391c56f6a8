use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// KPI 数据点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSample {
    pub timestamp: DateTime<Utc>,
    pub node: String,
    pub kpi_name: String,
    pub value: f64,

    /// 次要数值（例如 PGW 的尝试次数增量）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<f64>,
}

impl KpiSample {
    /// 创建数据点；非有限数值（NaN/Inf）直接丢弃
    pub fn new(
        node: impl Into<String>,
        kpi_name: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }

        Some(Self {
            timestamp,
            node: node.into(),
            kpi_name: kpi_name.into(),
            value,
            secondary: None,
        })
    }

    pub fn with_secondary(mut self, secondary: f64) -> Self {
        self.secondary = secondary.is_finite().then_some(secondary);
        self
    }

    /// `<node>-<kpi>` 组合键
    pub fn node_kpi_key(&self) -> String {
        format!("{}-{}", self.node, self.kpi_name)
    }
}

/// 单个 (node, kpi) 的时间序列，按时间升序
#[derive(Debug, Clone, PartialEq)]
pub struct KpiSeries {
    pub node: String,
    pub kpi_name: String,
    pub points: Vec<(DateTime<Utc>, f64)>,
}

impl KpiSeries {
    pub fn new(node: impl Into<String>, kpi_name: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            kpi_name: kpi_name.into(),
            points: Vec::new(),
        }
    }

    /// 按 (node, kpi) 分组，组内按时间升序
    pub fn group(samples: &[KpiSample]) -> Vec<KpiSeries> {
        let mut groups: BTreeMap<(String, String), KpiSeries> = BTreeMap::new();

        for sample in samples {
            groups
                .entry((sample.node.clone(), sample.kpi_name.clone()))
                .or_insert_with(|| KpiSeries::new(sample.node.clone(), sample.kpi_name.clone()))
                .points
                .push((sample.timestamp, sample.value));
        }

        groups
            .into_values()
            .map(|mut series| {
                series.points.sort_by_key(|(ts, _)| *ts);
                series
            })
            .collect()
    }

    /// 只保留最近 `window` 个不同时间戳的数据点（同一时间戳保留最先出现的一条）
    pub fn keep_recent(&mut self, window: usize) {
        self.points.dedup_by_key(|(ts, _)| *ts);
        if self.points.len() > window {
            let drop = self.points.len() - window;
            self.points.drain(..drop);
        }
    }

    pub fn node_kpi_key(&self) -> String {
        format!("{}-{}", self.node, self.kpi_name)
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|(_, v)| *v).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    #[test]
    fn test_non_finite_values_are_dropped() {
        assert!(KpiSample::new("N1", "attach_lte", f64::NAN, ts(0)).is_none());
        assert!(KpiSample::new("N1", "attach_lte", f64::INFINITY, ts(0)).is_none());

        let sample = KpiSample::new("N1", "attach_lte", 99.5, ts(0)).unwrap();
        assert_eq!(sample.node_kpi_key(), "N1-attach_lte");
    }

    #[test]
    fn test_group_sorts_and_dedups() {
        let samples = vec![
            KpiSample::new("N1", "k", 3.0, ts(10)).unwrap(),
            KpiSample::new("N1", "k", 1.0, ts(0)).unwrap(),
            KpiSample::new("N1", "k", 2.0, ts(5)).unwrap(),
            KpiSample::new("N1", "k", 2.5, ts(5)).unwrap(),
            KpiSample::new("N2", "k", 7.0, ts(0)).unwrap(),
        ];

        let mut groups = KpiSeries::group(&samples);
        assert_eq!(groups.len(), 2);

        let n1 = &mut groups[0];
        assert_eq!(n1.node, "N1");
        n1.keep_recent(2);
        assert_eq!(n1.values(), vec![2.0, 3.0]);
    }
}
