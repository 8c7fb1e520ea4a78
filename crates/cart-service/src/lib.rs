//! 购物车更新服务
//!
//! 消费 Kafka 中的加购事件与删除事件：加购消息经解码、必填字段校验、映射后写入 carts 表，
//! 删除消息按 cartId 逐个删除对应条目。坏消息确认后丢弃，存储故障交给 Kafka 重新投递。

pub mod consumer;
pub mod error;
pub mod events;
pub mod mapping;
pub mod models;
pub mod repository;
pub mod service;

pub use error::HandlerError;
pub use models::{CartRecord, NewCartRecord, SaveOutcome};
pub use service::{CartUpdateService, RemovalSummary};
