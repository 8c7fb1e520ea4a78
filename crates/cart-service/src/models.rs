//! 购物车实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 购物车条目
///
/// 用户购物车中的一行商品。`cart_id` 由数据库在插入时分配，是删除时唯一使用的键。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CartRecord {
    pub cart_id: i64,
    pub user_id: String,
    pub product_id: String,
    pub product_name: String,
    /// 生产商
    pub made_by: String,
    /// 商品图片地址
    pub image: String,
    pub quantity: i32,
    pub unit_price: i32,
    /// 产生该行的 Kafka 消息位置（topic/partition/offset）
    #[sqlx(default)]
    pub source_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 待插入的购物车条目，尚未分配 `cart_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCartRecord {
    pub user_id: String,
    pub product_id: String,
    pub product_name: String,
    pub made_by: String,
    pub image: String,
    pub quantity: i32,
    pub unit_price: i32,
    pub source_ref: Option<String>,
}

impl NewCartRecord {
    /// 补齐存储层分配的字段，得到完整实体
    pub fn into_record(self, cart_id: i64, created_at: DateTime<Utc>) -> CartRecord {
        CartRecord {
            cart_id,
            user_id: self.user_id,
            product_id: self.product_id,
            product_name: self.product_name,
            made_by: self.made_by,
            image: self.image,
            quantity: self.quantity,
            unit_price: self.unit_price,
            source_ref: self.source_ref,
            created_at,
        }
    }
}

/// 一次保存的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// 新插入的行
    Inserted(CartRecord),
    /// 同一条消息此前已写入过，`cart_id` 为当时分配的 ID
    ///
    /// 对应的行可能已被删除；重复投递不会恢复已删除的条目。
    Duplicate { cart_id: i64 },
}

impl SaveOutcome {
    pub fn cart_id(&self) -> i64 {
        match self {
            Self::Inserted(record) => record.cart_id,
            Self::Duplicate { cart_id } => *cart_id,
        }
    }

    /// 新插入的行，重复消息返回 None
    pub fn inserted(&self) -> Option<&CartRecord> {
        match self {
            Self::Inserted(record) => Some(record),
            Self::Duplicate { .. } => None,
        }
    }
}
