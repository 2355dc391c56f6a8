use crate::init::LoggingError;
use chrono::{DateTime, Utc};
use kpi_types::NodeType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// 单个网元的采集结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// 单个网元的结果记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeEntry {
    pub node: String,
    pub status: OutcomeStatus,
    pub samples: usize,
    pub duration_ms: u64,

    /// 被跳过的记录数（格式错误的行、空文件等）
    #[serde(default)]
    pub skipped_records: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 一次采集周期的报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub node_type: NodeType,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,

    /// 成功写入时序库的数据点数
    pub ingested: usize,

    /// 写入失败的网元
    pub ingest_failures: Vec<String>,

    /// 告警载荷中的条目数
    pub alert_entries: usize,

    /// 告警是否已投递
    pub alert_sent: bool,

    pub outcomes: Vec<OutcomeEntry>,
}

impl CycleReport {
    /// 报告文件路径 `<dir>/last_job_<TYPE>.json`
    pub fn path_in(dir: &Path, node_type: NodeType) -> PathBuf {
        dir.join(format!("last_job_{}.json", node_type))
    }

    /// 写入（覆盖）报告文件
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, LoggingError> {
        std::fs::create_dir_all(dir)?;
        let path = Self::path_in(dir, self.node_type);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn outcome(&self, node: &str) -> Option<&OutcomeEntry> {
        self.outcomes.iter().find(|o| o.node == node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn report() -> CycleReport {
        CycleReport {
            node_type: NodeType::Pgw,
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration_ms: 1200,
            total: 2,
            succeeded: 1,
            failed: 1,
            ingested: 3,
            ingest_failures: Vec::new(),
            alert_entries: 0,
            alert_sent: false,
            outcomes: vec![
                OutcomeEntry {
                    node: "PGW01".to_string(),
                    status: OutcomeStatus::Success,
                    samples: 3,
                    duration_ms: 800,
                    skipped_records: 0,
                    error: None,
                },
                OutcomeEntry {
                    node: "PGW02".to_string(),
                    status: OutcomeStatus::Failed,
                    samples: 0,
                    duration_ms: 1100,
                    skipped_records: 0,
                    error: Some("connection refused".to_string()),
                },
            ],
        }
    }

    #[test]
    fn test_report_overwrites_previous_run() {
        let dir = tempdir().unwrap();

        let first = report();
        first.write_to(dir.path()).unwrap();

        let mut second = report();
        second.failed = 0;
        let path = second.write_to(dir.path()).unwrap();

        assert_eq!(path, dir.path().join("last_job_PGW.json"));
        let saved: CycleReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.run_id, second.run_id);
        assert_eq!(saved.failed, 0);
        assert_eq!(
            saved.outcome("PGW02").unwrap().error.as_deref(),
            Some("connection refused")
        );
    }
}
