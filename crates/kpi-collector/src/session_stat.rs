//! 会话统计 CSV 日志采集（SBG）
//!
//! 日志目录中最新的文件里，最后一个表头之后的 `IPv*` + `access` 行是当前周期的统计。
//! 每个周期按 IPv4、IPv6 与合计三个维度汇总成 15 个指标。

use crate::collector::{CollectContext, NodeCollector};
use crate::error::{ParseError, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Timelike};
use kpi_remote::RemoteSession;
use kpi_types::{KpiSample, NodeConfig, NodeType};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const FIELD_IP_VERSION: usize = 4;
const FIELD_SUBSCRIBERS: usize = 5;
const FIELD_REG_RATIO: usize = 6;
const FIELD_INIT_REG_TIME: usize = 7;
const FIELD_INC_SESSION_RATE: usize = 13;
const FIELD_OUT_SESSION_RATE: usize = 14;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStatOptions {
    /// 节点未配置路径时使用的日志目录
    pub directory: String,

    /// 统计块的表头
    pub marker: String,

    /// 提权启动 sftp-server 的命令
    pub sftp_command: Option<String>,

    pub ip_tag: String,
    pub access_tag: String,
    pub min_fields: usize,

    /// 三个比率同时为 0 视为未上报，跳过该行
    pub skip_all_zero_ratios: bool,
}

impl Default for SessionStatOptions {
    fn default() -> Self {
        Self {
            directory: "/storage/no-backup/coremw/var/log/saflog/sbgLog/sbgKPIsLog".to_string(),
            marker: "Timestamp,PmpId,CpuLoadCh,CpuLoadSb,MemoryLoadCh,MemoryLoadSb,CpRegUsers,CpSessions"
                .to_string(),
            sftp_command: Some("sudo -n su -c /usr/lib/ssh/sftp-server 2>/dev/null".to_string()),
            ip_tag: "IPv".to_string(),
            access_tag: "access".to_string(),
            min_fields: 15,
            skip_all_zero_ratios: true,
        }
    }
}

#[derive(Debug, Default)]
struct Bucket {
    subscribers: i64,
    init_reg_time: f64,
    reg_ratio: Vec<f64>,
    inc_rate: Vec<f64>,
    out_rate: Vec<f64>,
}

impl Bucket {
    fn add(&mut self, row: &StatRow) {
        self.subscribers += row.subscribers;
        self.init_reg_time += row.init_reg_time;
        self.reg_ratio.push(row.reg_ratio);
        self.inc_rate.push(row.inc_rate);
        self.out_rate.push(row.out_rate);
    }
}

/// 一个周期的汇总
#[derive(Debug, Default)]
pub(crate) struct Rollup {
    v4: Bucket,
    v6: Bucket,
    all: Bucket,
    pub accepted: usize,
    pub errors: Vec<ParseError>,
}

#[derive(Debug, PartialEq)]
struct StatRow {
    ip_version: String,
    subscribers: i64,
    reg_ratio: f64,
    init_reg_time: f64,
    inc_rate: f64,
    out_rate: f64,
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn number(fields: &[&str], idx: usize, name: &str) -> std::result::Result<f64, ParseError> {
    let raw = fields[idx];
    if raw.is_empty() {
        return Ok(0.0);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::invalid_number(name, raw))
}

fn parse_row(line: &str, min_fields: usize) -> std::result::Result<StatRow, ParseError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let expected = min_fields.max(FIELD_OUT_SESSION_RATE + 1);
    if fields.len() < expected {
        return Err(ParseError::TooFewFields {
            expected,
            actual: fields.len(),
        });
    }

    Ok(StatRow {
        ip_version: fields[FIELD_IP_VERSION].to_string(),
        subscribers: number(&fields, FIELD_SUBSCRIBERS, "subscribers")?.trunc() as i64,
        reg_ratio: number(&fields, FIELD_REG_RATIO, "reg_ratio")?,
        init_reg_time: number(&fields, FIELD_INIT_REG_TIME, "init_reg_time")?,
        inc_rate: number(&fields, FIELD_INC_SESSION_RATE, "inc_session_rate")?,
        out_rate: number(&fields, FIELD_OUT_SESSION_RATE, "out_session_rate")?,
    })
}

impl Rollup {
    pub(crate) fn from_block(block: &str, options: &SessionStatOptions) -> Self {
        let mut rollup = Rollup::default();

        let lines = block
            .split('\n')
            .map(str::trim)
            .filter(|line| line.contains(&options.ip_tag) && line.contains(&options.access_tag));

        for line in lines {
            let row = match parse_row(line, options.min_fields) {
                Ok(row) => row,
                Err(e) => {
                    rollup.errors.push(e);
                    continue;
                }
            };

            if row.subscribers == 0 {
                continue;
            }
            if options.skip_all_zero_ratios
                && row.reg_ratio == 0.0
                && row.inc_rate == 0.0
                && row.out_rate == 0.0
            {
                continue;
            }

            match row.ip_version.as_str() {
                "IPv4" => rollup.v4.add(&row),
                "IPv6" => rollup.v6.add(&row),
                _ => {}
            }
            rollup.all.add(&row);
            rollup.accepted += 1;
        }

        rollup
    }

    /// 15 个汇总指标，顺序固定
    pub(crate) fn metrics(&self) -> Vec<(&'static str, f64)> {
        let (v4, v6, all) = (&self.v4, &self.v6, &self.all);
        vec![
            ("subIPv4", v4.subscribers as f64),
            ("subIPv6", v6.subscribers as f64),
            ("InitRegTimeIPv4", v4.init_reg_time.round()),
            ("InitRegTimeIPv6", v6.init_reg_time.round()),
            ("RegRatioV4", round2(average(&v4.reg_ratio))),
            ("RegRatioV6", round2(average(&v6.reg_ratio))),
            ("IncSessionRateIv4", round2(average(&v4.inc_rate))),
            ("IncSessionRateIv6", round2(average(&v6.inc_rate))),
            ("OutSessionRateIv4", round2(average(&v4.out_rate))),
            ("OutSessionRateIv6", round2(average(&v6.out_rate))),
            ("sub", all.subscribers as f64),
            ("InitRegTime_", all.init_reg_time.round()),
            ("succRegis", round2(average(&all.reg_ratio))),
            ("IncSessionRate", round2(average(&all.inc_rate))),
            ("OutSessionRate", round2(average(&all.out_rate))),
        ]
    }
}

fn truncate_to_minute(now: NaiveDateTime) -> NaiveDateTime {
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

/// SBG 采集器
pub struct SessionStatCollector {
    options: SessionStatOptions,
}

impl SessionStatCollector {
    pub fn new(options: SessionStatOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl NodeCollector for SessionStatCollector {
    fn node_type(&self) -> NodeType {
        NodeType::Sbg
    }

    async fn collect(
        &self,
        session: &mut dyn RemoteSession,
        node: &NodeConfig,
        ctx: &CollectContext,
    ) -> Result<Vec<KpiSample>> {
        let dir = if node.remote_path.is_empty() {
            self.options.directory.as_str()
        } else {
            node.remote_path.as_str()
        };

        let newest = match session.newest_file(dir).await {
            Ok(newest) => newest,
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        let Some(path) = newest else {
            warn!(node = %node.id, dir, "No file found in log directory");
            return Ok(Vec::new());
        };

        let block = session
            .read_from_last_marker(&path, &self.options.marker)
            .await?;
        if block.is_empty() {
            warn!(node = %node.id, path = %path, "No header found in scanned region");
            return Ok(Vec::new());
        }

        let rollup = Rollup::from_block(&block, &self.options);
        for err in &rollup.errors {
            ctx.job.record_skipped(&node.id, err);
        }

        debug!(node = %node.id, path = %path, accepted = rollup.accepted, "Aggregated session stats");
        if rollup.accepted == 0 {
            return Ok(Vec::new());
        }

        let timestamp = truncate_to_minute(ctx.now).and_utc();
        Ok(rollup
            .metrics()
            .into_iter()
            .filter_map(|(name, value)| KpiSample::new(&node.id, name, value, timestamp))
            .collect())
    }
}
