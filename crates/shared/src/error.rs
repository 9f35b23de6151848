//! 共享错误类型
//!
//! 基础设施层（配置、数据库、迁移）的错误定义。
//! 各服务的业务错误由服务自己的错误类型承载。

use thiserror::Error;

/// 基础设施错误
#[derive(Debug, Error)]
pub enum LabError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, LabError>;
