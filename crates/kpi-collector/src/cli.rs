//! 交互式 CLI 计数器采集（MME）
//!
//! 第一条命令输出 `name: value%` 形式的计数器以及 `Day:` / `Time:` 字段，
//! 第二条命令输出按列排布的表格。原始值是失败率，入库的是成功率 `100 - p`。

use crate::collector::{CollectContext, NodeCollector};
use crate::error::{ParseError, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use kpi_remote::RemoteSession;
use kpi_types::{KpiSample, NodeConfig, NodeType};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 表格中的行：按含 `%` 的行序号，或按首列标签
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowRef {
    Index(usize),
    Label(String),
}

/// 表格中的列：按字段序号，或按表头名称
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Index(usize),
    Header(String),
}

/// 表格形式的 KPI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularKpi {
    pub kpi_name: String,
    pub row: RowRef,
    pub column: ColumnRef,
}

impl TabularKpi {
    pub fn new(kpi_name: impl Into<String>, row: RowRef, column: ColumnRef) -> Self {
        Self {
            kpi_name: kpi_name.into(),
            row,
            column,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliOptions {
    /// 输出计数器列表的命令
    pub list_command: String,

    /// 输出 QCI 表格的命令
    pub table_command: Option<String>,

    /// 只有全部解析成功时才入库
    pub tabular: Vec<TabularKpi>,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            list_command: "pdc_kpi.pl -i 3 -l".to_string(),
            table_command: Some("pdc_kpi.pl -q 1,5 -i 3 | grep %".to_string()),
            tabular: vec![
                TabularKpi::new("qci1", RowRef::Index(2), ColumnRef::Index(4)),
                TabularKpi::new("qci5", RowRef::Index(3), ColumnRef::Index(3)),
            ],
        }
    }
}

/// MME 采集器
pub struct CliCounterCollector {
    options: CliOptions,
}

impl CliCounterCollector {
    pub fn new(options: CliOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl NodeCollector for CliCounterCollector {
    fn node_type(&self) -> NodeType {
        NodeType::Mme
    }

    async fn collect(
        &self,
        session: &mut dyn RemoteSession,
        node: &NodeConfig,
        ctx: &CollectContext,
    ) -> Result<Vec<KpiSample>> {
        let listing = session.run_command(&self.options.list_command).await?;

        let timestamp = match parse_timestamp(&listing, ctx.now) {
            Some(ts) => ts.and_utc(),
            None => {
                ctx.job.record_skipped(
                    &node.id,
                    &ParseError::InvalidTimestamp("Day/Time missing from output".to_string()),
                );
                return Ok(Vec::new());
            }
        };

        let (mut values, mut errors) = parse_counter_lines(&listing, &ctx.kpi_names);

        if let Some(command) = &self.options.table_command {
            if !self.options.tabular.is_empty() {
                let table = session.run_command(command).await?;
                let (table_values, table_errors) = parse_table(&table, &self.options.tabular);
                // 表格 KPI 成组入库，缺任何一项则整组丢弃
                if table_errors.is_empty() {
                    values.extend(table_values);
                }
                errors.extend(table_errors);
            }
        }

        for err in &errors {
            ctx.job.record_skipped(&node.id, err);
        }

        let samples: Vec<KpiSample> = values
            .into_iter()
            .filter_map(|(kpi, value)| KpiSample::new(&node.id, kpi, value, timestamp))
            .collect();

        debug!(node = %node.id, samples = samples.len(), skipped = errors.len(), "Parsed CLI counters");
        Ok(samples)
    }
}

/// 失败率转成功率
fn success_ratio(raw: &str, field: &str) -> std::result::Result<f64, ParseError> {
    let trimmed = raw.trim().trim_end_matches('%').trim();
    trimmed
        .parse::<f64>()
        .map(|failure| 100.0 - failure)
        .map_err(|_| ParseError::invalid_number(field, raw.trim()))
}

/// 从 `Day:` 与 `Time:` 字段推出采集时间
///
/// `Day` 只有日；年月取自 `now`，日期在未来时回退到上个月。`Time` 截断到分钟。
pub(crate) fn parse_timestamp(output: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let mut day: Option<u32> = None;
    let mut time: Option<NaiveTime> = None;

    for line in output.lines() {
        let Some((key, raw)) = line.split_once(':') else {
            continue;
        };
        let raw = raw.trim();

        match key.trim().to_ascii_lowercase().as_str() {
            "day" => day = raw.parse::<u32>().ok(),
            "time" => {
                time = NaiveTime::parse_from_str(raw, "%H:%M:%S")
                    .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
                    .ok()
                    .and_then(|t| t.with_second(0))
            }
            _ => {}
        }
    }

    let date = resolve_day(day?, now.date())?;
    Some(date.and_time(time?))
}

fn resolve_day(day: u32, today: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(today.year(), today.month(), day)
        .filter(|date| *date <= today)
        .or_else(|| {
            let last_month = today.with_day(1)?.pred_opt()?;
            NaiveDate::from_ymd_opt(last_month.year(), last_month.month(), day)
        })
}

/// 解析 `name: value%` 行，名称按配置（忽略大小写）精确匹配
pub(crate) fn parse_counter_lines(
    output: &str,
    kpi_names: &[String],
) -> (Vec<(String, f64)>, Vec<ParseError>) {
    let mut values = Vec::new();
    let mut errors = Vec::new();

    for line in output.lines() {
        let Some((name, raw)) = line.trim().split_once(':') else {
            continue;
        };
        let name = name.trim();

        if let Some(kpi) = kpi_names.iter().find(|k| k.eq_ignore_ascii_case(name)) {
            match success_ratio(raw, kpi) {
                Ok(value) => values.push((kpi.clone(), value)),
                Err(e) => errors.push(e),
            }
        }
    }

    (values, errors)
}

/// 解析表格形式的 KPI
pub(crate) fn parse_table(
    output: &str,
    kpis: &[TabularKpi],
) -> (Vec<(String, f64)>, Vec<ParseError>) {
    let rows: Vec<Vec<&str>> = output
        .lines()
        .map(|line| line.split_whitespace().collect())
        .collect();
    let percent_rows: Vec<&Vec<&str>> = output
        .lines()
        .zip(rows.iter())
        .filter(|(line, _)| line.contains('%'))
        .map(|(_, fields)| fields)
        .collect();

    let mut values = Vec::new();
    let mut errors = Vec::new();

    for kpi in kpis {
        let (header_idx, column) = match &kpi.column {
            ColumnRef::Index(i) => (None, Some(*i)),
            ColumnRef::Header(name) => rows
                .iter()
                .enumerate()
                .find_map(|(idx, fields)| {
                    fields
                        .iter()
                        .position(|f| f == name)
                        .map(|col| (Some(idx), Some(col)))
                })
                .unwrap_or((None, None)),
        };

        let Some(column) = column else {
            errors.push(ParseError::MissingColumn(format!("{:?}", kpi.column)));
            continue;
        };

        let row = match &kpi.row {
            RowRef::Index(i) => percent_rows.get(*i).copied(),
            RowRef::Label(label) => rows
                .iter()
                .skip(header_idx.map_or(0, |h| h + 1))
                .find(|fields| fields.first() == Some(&label.as_str())),
        };

        match row.and_then(|fields| fields.get(column)) {
            Some(raw) => match success_ratio(raw, &kpi.kpi_name) {
                Ok(value) => values.push((kpi.kpi_name.clone(), value)),
                Err(e) => errors.push(e),
            },
            None => errors.push(ParseError::TooFewFields {
                expected: column + 1,
                actual: row.map_or(0, |fields| fields.len()),
            }),
        }
    }

    (values, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 15)
            .unwrap()
            .and_hms_opt(10, 40, 0)
            .unwrap()
    }

    const LISTING: &str = "pdc_kpi.pl -i 3 -l\n\
        Day: 15\n\
        Time: 10:35:07\n\
        attach_lte: 0.50%\n\
        paging_lte : 2.25%\n\
        attach_wcdma: n/a%\n\
        attach_lte_extra: 9.00%\n\
        MME01#";

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp(LISTING, now()).unwrap();
        assert_eq!(ts.to_string(), "2025-03-15 10:35:00");
    }

    #[test]
    fn test_day_in_future_rolls_back_one_month() {
        let ts = parse_timestamp("Day: 28\nTime: 23:59:59", now()).unwrap();
        assert_eq!(ts.to_string(), "2025-02-28 23:59:00");

        // 1 月 31 日在 3 月 1 日前一个月不存在
        let march_first = NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(0, 5, 0)
            .unwrap();
        assert!(parse_timestamp("Day: 31\nTime: 23:59", march_first).is_none());
    }

    #[test]
    fn test_single_digit_hour_and_lookalike_keys() {
        let output = "Day: 15\n\
            Time: 9:35:07\n\
            daily_attach: 0.50%\n\
            timeout_ratio: 1.25%\n";
        let ts = parse_timestamp(output, now()).unwrap();
        assert_eq!(ts.to_string(), "2025-03-15 09:35:00");

        let ts = parse_timestamp("Day: 14\nTime: 23:07", now()).unwrap();
        assert_eq!(ts.to_string(), "2025-03-14 23:07:00");
    }

    #[test]
    fn test_missing_time_yields_none() {
        assert!(parse_timestamp("Day: 15\nattach_lte: 0.5%", now()).is_none());
    }

    #[test]
    fn test_parse_counter_lines() {
        let kpis = vec![
            "attach_lte".to_string(),
            "paging_lte".to_string(),
            "attach_wcdma".to_string(),
        ];
        let (values, errors) = parse_counter_lines(LISTING, &kpis);

        assert_eq!(
            values,
            vec![
                ("attach_lte".to_string(), 99.5),
                ("paging_lte".to_string(), 97.75)
            ]
        );
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ParseError::InvalidNumber { .. }));
    }

    #[test]
    fn test_parse_table_by_position() {
        let output = "pdc_kpi.pl -q 1,5 -i 3 | grep %\n\
            x  QCI1  100  0.00%  0.40%\n\
            x  QCI1  120  0.10%  1.50%\n\
            x  QCI5  300  2.00%  0.70%\n\
            MME01#";
        let (values, errors) = parse_table(output, &CliOptions::default().tabular);

        assert!(errors.is_empty());
        assert_eq!(
            values,
            vec![("qci1".to_string(), 98.5), ("qci5".to_string(), 98.0)]
        );
    }

    #[test]
    fn test_parse_table_by_header() {
        let output = "QCI   Att   Fail%   Drop%\n\
            1     100   0.25%   0.10%\n\
            5     300   1.00%   0.50%\n";
        let kpis = vec![
            TabularKpi::new("qci1", RowRef::Label("1".into()), ColumnRef::Header("Fail%".into())),
            TabularKpi::new("qci5", RowRef::Label("5".into()), ColumnRef::Header("Drop%".into())),
            TabularKpi::new("qci9", RowRef::Label("9".into()), ColumnRef::Header("Drop%".into())),
            TabularKpi::new("qciX", RowRef::Label("1".into()), ColumnRef::Header("Nope".into())),
        ];
        let (values, errors) = parse_table(output, &kpis);

        assert_eq!(
            values,
            vec![("qci1".to_string(), 99.75), ("qci5".to_string(), 99.5)]
        );
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_tabular_config_accepts_numbers_and_names() {
        let kpi: TabularKpi = serde_json::from_value(serde_json::json!({
            "kpi_name": "qci1", "row": "1", "column": 4
        }))
        .unwrap();
        assert_eq!(kpi.row, RowRef::Label("1".to_string()));
        assert_eq!(kpi.column, ColumnRef::Index(4));
    }
}
