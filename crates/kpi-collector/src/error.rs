use kpi_remote::TransportError;
use thiserror::Error;

/// 采集错误：只有传输层故障会让整个网元失败
#[derive(Error, Debug)]
pub enum CollectError {
    /// 连接、认证、读取失败
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// 采集超时
    #[error("Collection timed out after {0}s")]
    Timeout(u64),
}

pub type Result<T> = std::result::Result<T, CollectError>;

/// 单条记录的解析错误，记录被跳过，不中断其余记录
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// 表头中找不到计数器列
    #[error("Column not found in header: {0}")]
    MissingColumn(String),

    /// 字段不是数值
    #[error("Invalid number in field {field}: {value:?}")]
    InvalidNumber { field: String, value: String },

    /// 字段数不足
    #[error("Expected at least {expected} fields, got {actual}")]
    TooFewFields { expected: usize, actual: usize },

    /// 时间格式错误
    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
}

impl ParseError {
    pub fn invalid_number(field: impl Into<String>, value: impl Into<String>) -> Self {
        ParseError::InvalidNumber {
            field: field.into(),
            value: value.into(),
        }
    }
}
