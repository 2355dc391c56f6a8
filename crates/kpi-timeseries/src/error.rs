use thiserror::Error;

/// 时序库错误
#[derive(Error, Debug)]
pub enum StoreError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// 表名不合法
    #[error("Invalid table name: {0:?}")]
    InvalidTable(String),

    /// 查询构造错误
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// 存储不可用
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
