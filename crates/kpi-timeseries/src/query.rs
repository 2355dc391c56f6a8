use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use kpi_types::NodeType;
use sea_orm::Value;
use serde::{Deserialize, Serialize};

/// KPI 查询：限定网元类型、KPI 集合、网元集合与时间下限
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiQuery {
    pub node_type: NodeType,
    pub kpi_names: Vec<String>,
    pub nodes: Vec<String>,
    pub since: DateTime<Utc>,
}

impl KpiQuery {
    pub fn new(node_type: NodeType, since: DateTime<Utc>) -> Self {
        Self {
            node_type,
            kpi_names: Vec::new(),
            nodes: Vec::new(),
            since,
        }
    }

    pub fn with_kpis<I, S>(mut self, kpis: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kpi_names = kpis.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// KPI 或网元集合为空时不可能有结果
    pub fn is_empty(&self) -> bool {
        self.kpi_names.is_empty() || self.nodes.is_empty()
    }

    pub fn matches(&self, node: &str, kpi_name: &str, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.since
            && self.nodes.iter().any(|n| n == node)
            && self.kpi_names.iter().any(|k| k == kpi_name)
    }
}

/// 命名参数的取值：单值或值列表（用于 `IN (...)`）
#[derive(Debug, Clone)]
pub enum ParamValue {
    One(Value),
    List(Vec<Value>),
}

impl ParamValue {
    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        ParamValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// 把 `:name` 占位符展开为 `$1, $2, ...`，返回 SQL 与按位置排列的参数
///
/// 列表参数展开为逗号分隔的多个占位符；`::` 类型转换不视为占位符。
pub fn bind_named(sql: &str, params: &[(&str, ParamValue)]) -> Result<(String, Vec<Value>)> {
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let chars: Vec<char> = sql.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let is_placeholder = c == ':'
            && chars.get(i + 1).map_or(false, |n| n.is_ascii_alphabetic() || *n == '_')
            && (i == 0 || chars[i - 1] != ':');

        if !is_placeholder {
            out.push(c);
            i += 1;
            continue;
        }

        let start = i + 1;
        let mut end = start;
        while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
            end += 1;
        }
        let name: String = chars[start..end].iter().collect();

        let value = params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
            .ok_or_else(|| StoreError::InvalidQuery(format!("unbound parameter :{}", name)))?;

        match value {
            ParamValue::One(v) => {
                values.push(v.clone());
                out.push_str(&format!("${}", values.len()));
            }
            ParamValue::List(list) => {
                if list.is_empty() {
                    return Err(StoreError::InvalidQuery(format!(
                        "empty list for parameter :{}",
                        name
                    )));
                }
                let placeholders: Vec<String> = list
                    .iter()
                    .map(|v| {
                        values.push(v.clone());
                        format!("${}", values.len())
                    })
                    .collect();
                out.push_str(&placeholders.join(", "));
            }
        }

        i = end;
    }

    Ok((out, values))
}

/// 表名只允许字母、数字与下划线
pub fn validate_table(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());

    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidTable(name.to_string()))
    }
}
