use thiserror::Error;

/// 远程会话错误
#[derive(Error, Debug)]
pub enum TransportError {
    /// 连接失败
    #[error("Connection to {addr} failed: {message}")]
    Connect { addr: String, message: String },

    /// 认证失败
    #[error("Authentication failed for {user}@{addr}")]
    Auth { user: String, addr: String },

    /// 超时
    #[error("Timed out: {0}")]
    Timeout(String),

    /// 远端文件不存在
    #[error("Remote file not found: {0}")]
    NotFound(String),

    /// SSH 协议错误
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// SFTP 错误
    #[error("SFTP error: {0}")]
    Sftp(String),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    pub fn sftp(err: impl std::fmt::Display) -> Self {
        TransportError::Sftp(err.to_string())
    }

    /// 文件不存在属于空结果，而非传输故障
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }
}
