use crate::node::NodeType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

/// KPI 固定门限
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiThreshold {
    pub node_type: NodeType,
    pub kpi_name: String,
    pub threshold: f64,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl KpiThreshold {
    pub fn new(node_type: NodeType, kpi_name: impl Into<String>, threshold: f64) -> Self {
        Self {
            node_type,
            kpi_name: kpi_name.into(),
            threshold,
            enabled: true,
        }
    }
}

/// 单个 (node, kpi) 的判定结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub node: String,
    pub kpi_name: String,
    pub value: f64,
    pub ema: f64,

    /// 趋势规则使用的基准值
    pub floor: Option<f64>,

    pub threshold: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub reason: String,

    /// 趋势规则命中
    pub trend_flag: bool,

    /// `value < ema` 或 `value < threshold`
    pub baseline_breach: bool,

    pub anomaly_detected: bool,
}

impl AlertRecord {
    pub fn node_kpi_key(&self) -> String {
        format!("{}-{}", self.node, self.kpi_name)
    }
}

/// 告警载荷中的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEntry {
    /// `%Y-%m-%d %H:%M`
    pub timestamp: String,
    pub node_kpi_key: String,
    pub node: String,
    pub kpi_name: String,
    pub value: f64,
    pub reason: String,
    pub floor: Option<f64>,
    pub anomaly_detected: bool,
}

/// 每个网元类型、每次检测生成的告警载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub affected_kpis: Vec<String>,
    pub data: Vec<AlertEntry>,
}

impl AlertPayload {
    pub fn empty(node_type: NodeType) -> Self {
        Self {
            node_type,
            affected_kpis: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_is_well_formed() {
        let payload = AlertPayload::empty(NodeType::Mme);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(
            json,
            serde_json::json!({ "type": "MME", "affected_kpis": [], "data": [] })
        );
        assert!(payload.is_empty());
    }
}
