use thiserror::Error;

/// 告警投递错误
#[derive(Error, Debug)]
pub enum SinkError {
    /// HTTP 请求失败（含超时）
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// 对端返回非成功状态码
    #[error("Webhook returned {status}: {body}")]
    Status { status: u16, body: String },

    /// 文件写入失败
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化失败
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 其它错误
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SinkError>;
