//! 消息拒绝事件
//!
//! 处理失败的消息不会回传给任何调用方，日志是唯一的错误通道。
//! 这里把每次失败整理成结构化事件：错误分类、消息位置、负载摘录和处置方式，
//! 以固定字段写入日志并计入指标。

use cart_shared::kafka::ConsumerMessage;
use cart_shared::observability::metrics::record_rejection;
use serde::Serialize;
use tracing::{error, warn};

use crate::error::HandlerError;

/// 负载摘录的最大字符数
pub const EXCERPT_LIMIT: usize = 256;

/// 失败消息的处置方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    /// 已确认并丢弃
    Dropped,
    /// 未确认，等待重新投递
    Redelivered,
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Dropped => "DROPPED",
            Self::Redelivered => "REDELIVERED",
        };
        write!(f, "{s}")
    }
}

/// 结构化的消息拒绝事件
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRejection {
    pub kind: &'static str,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub reason: String,
    pub excerpt: String,
    pub disposition: Disposition,
}

impl MessageRejection {
    pub fn new(err: &HandlerError, msg: &ConsumerMessage) -> Self {
        let disposition = if err.is_retryable() {
            Disposition::Redelivered
        } else {
            Disposition::Dropped
        };

        Self {
            kind: err.kind(),
            topic: msg.topic.clone(),
            partition: msg.partition,
            offset: msg.offset,
            reason: err.to_string(),
            excerpt: excerpt(&msg.payload, EXCERPT_LIMIT),
            disposition,
        }
    }

    /// 写入日志并计数
    ///
    /// 坏消息记 warn；存储故障记 error，它意味着消费进度停滞。
    pub fn emit(&self) {
        record_rejection(&self.topic, self.kind);

        match self.disposition {
            Disposition::Dropped => warn!(
                kind = self.kind,
                topic = %self.topic,
                partition = self.partition,
                offset = self.offset,
                reason = %self.reason,
                excerpt = %self.excerpt,
                disposition = %self.disposition,
                "消息被拒绝，已确认并丢弃"
            ),
            Disposition::Redelivered => error!(
                kind = self.kind,
                topic = %self.topic,
                partition = self.partition,
                offset = self.offset,
                reason = %self.reason,
                excerpt = %self.excerpt,
                disposition = %self.disposition,
                "消息处理失败，等待重新投递"
            ),
        }
    }
}

/// 截取负载前 `limit` 个字符，非 UTF-8 字节以替换字符呈现
pub fn excerpt(payload: &[u8], limit: usize) -> String {
    let text = String::from_utf8_lossy(payload);
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.into_owned(),
    }
}
