//! 购物车消息处理错误类型
//!
//! 在共享库 CartError 基础上区分"消息本身有问题"与"存储暂时不可用"两类错误：
//! 前者重试无意义，确认后丢弃；后者交还给 Kafka 重新投递。

use cart_shared::error::CartError;

/// 消息处理错误
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// 负载不是合法 JSON，或顶层结构与 topic 约定不符
    #[error("消息解码失败: {0}")]
    Decode(String),

    /// 缺少必填字段，列出全部缺失的键
    #[error("缺少必填字段: {}", .fields.join(", "))]
    MissingFields { fields: Vec<&'static str> },

    /// 价格或购物车 ID 无法解析为整数
    #[error("字段不是合法整数: {field}={value}")]
    InvalidNumber { field: &'static str, value: String },

    /// 透传共享库错误（数据库、Kafka 等）
    #[error(transparent)]
    Shared(#[from] CartError),
}

impl HandlerError {
    /// 稳定的错误分类码，用于结构化日志与指标标签
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "DECODE_ERROR",
            Self::MissingFields { .. } => "MISSING_FIELDS",
            Self::InvalidNumber { .. } => "INVALID_NUMBER",
            Self::Shared(e @ CartError::Database(_)) if e.is_retryable() => "PERSISTENCE_ERROR",
            Self::Shared(CartError::Database(_)) => "PERSISTENCE_REJECTED",
            Self::Shared(e) => e.code(),
        }
    }

    /// 重新投递是否有机会成功
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Shared(e) => e.is_retryable(),
            Self::Decode(_) | Self::MissingFields { .. } | Self::InvalidNumber { .. } => false,
        }
    }
}
