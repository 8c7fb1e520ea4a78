//! 统一错误处理模块
//!
//! 定义基础设施层共享的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum CartError {
    // ==================== 数据库错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库迁移失败: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // ==================== Kafka 错误 ====================
    #[error("Kafka 错误: {0}")]
    Kafka(String),

    // ==================== 配置错误 ====================
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, CartError>;

impl CartError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::Migration(_) => "MIGRATION_ERROR",
            Self::Kafka(_) => "KAFKA_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// Kafka 故障与瞬时的数据库故障（连接、连接池、事务冲突、资源不足）重试有机会成功；
    /// 数据库因数据本身拒绝的错误（约束、编码、类型）重试只会得到同样的结果。
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(e) => is_transient_db_error(e),
            Self::Kafka(_) => true,
            _ => false,
        }
    }
}

/// 数据库错误是否为瞬时故障
pub fn is_transient_db_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| is_transient_sqlstate(&code)),
        _ => false,
    }
}

/// SQLSTATE 是否属于瞬时故障类别
///
/// 08 连接异常、40 事务回滚（序列化失败、死锁）、53 资源不足、57 管理员干预（关闭、取消）。
pub fn is_transient_sqlstate(code: &str) -> bool {
    matches!(code.get(..2), Some("08" | "40" | "53" | "57"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = CartError::Config(config::ConfigError::Message("缺少 database.url".to_string()));
        assert_eq!(err.code(), "CONFIG_ERROR");
        assert_eq!(err.to_string(), "配置错误: 缺少 database.url");
    }

    #[test]
    fn test_is_retryable() {
        let db_err = CartError::Database(sqlx::Error::PoolTimedOut);
        assert!(db_err.is_retryable());
        assert_eq!(db_err.code(), "DATABASE_ERROR");

        let kafka_err = CartError::Kafka("broker 不可达".to_string());
        assert!(kafka_err.is_retryable());

        let config_err = CartError::Config(config::ConfigError::Message("x".to_string()));
        assert!(!config_err.is_retryable());
    }

    #[test]
    fn test_permanent_database_errors_are_not_retryable() {
        let protocol = CartError::Database(sqlx::Error::Protocol("unexpected message".to_string()));
        assert!(!protocol.is_retryable());
        assert!(!CartError::Database(sqlx::Error::RowNotFound).is_retryable());
        assert!(CartError::Database(sqlx::Error::PoolClosed).is_retryable());
    }

    #[test]
    fn test_transient_sqlstate_classes() {
        // 连接中断、序列化失败、死锁、连接数耗尽、管理员关闭
        for code in ["08006", "40001", "40P01", "53300", "57P01"] {
            assert!(is_transient_sqlstate(code), "{code} 应可重试");
        }
        // 非法字节序列（如 NUL）、唯一约束、非空约束、数值越界
        for code in ["22021", "23505", "23502", "22003", ""] {
            assert!(!is_transient_sqlstate(code), "{code} 不应重试");
        }
    }
}
