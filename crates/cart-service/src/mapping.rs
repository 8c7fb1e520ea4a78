//! 消息解码、校验与实体映射
//!
//! 两段式处理：先把文本解码成无类型的键值结构，再按必填字段集合校验，
//! 校验通过后才构造强类型的 `CartLineRequest`，最后逐字段映射为待插入实体。

use serde_json::{Map, Value};

use crate::error::HandlerError;
use crate::models::NewCartRecord;

/// 无类型的 JSON 对象负载
pub type Payload = Map<String, Value>;

/// 加购消息必须携带的键
pub const REQUIRED_ADDITION_KEYS: [&str; 6] = [
    "userId",
    "productId",
    "productName",
    "productMadeBy",
    "productImage",
    "productPrice",
];

/// 删除消息中每个条目携带的购物车 ID 键
pub const CART_ID_KEY: &str = "cartId";

/// 加购消息固定的购买数量
const ADDITION_QUANTITY: i32 = 1;

/// 加购请求
///
/// 仅在校验通过后构造，构造后不再修改，由映射步骤消费一次。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLineRequest {
    pub user_id: String,
    pub product_id: String,
    pub product_name: String,
    pub made_by: String,
    pub image: String,
    pub quantity: i32,
    pub unit_price: i32,
}

/// 必填字段校验的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdditionCheck {
    Accepted(CartLineRequest),
    /// 缺失的键，按 `REQUIRED_ADDITION_KEYS` 的顺序列出
    MissingFields(Vec<&'static str>),
}

/// 删除请求：按消息中出现的顺序排列的购物车 ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalRequest {
    pub cart_ids: Vec<i64>,
}

/// 将 JSON 值转换为文本：字符串原样返回，其余值取其 JSON 文本（如 `1999`、`null`）
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 解码加购消息，顶层必须是 JSON 对象
pub fn decode_addition(text: &str) -> Result<Payload, HandlerError> {
    serde_json::from_str(text).map_err(|e| HandlerError::Decode(e.to_string()))
}

/// 列出负载中缺失的必填键；值为 null 的键视为存在
pub fn missing_keys(payload: &Payload) -> Vec<&'static str> {
    REQUIRED_ADDITION_KEYS
        .iter()
        .copied()
        .filter(|key| !payload.contains_key(*key))
        .collect()
}

/// 校验加购负载并构造 `CartLineRequest`
///
/// 缺少字段属于正常的拒绝分支，以 `AdditionCheck::MissingFields` 返回；
/// 价格无法解析为整数时返回 `HandlerError::InvalidNumber`。
pub fn validate_addition(payload: &Payload) -> Result<AdditionCheck, HandlerError> {
    let missing = missing_keys(payload);
    if !missing.is_empty() {
        return Ok(AdditionCheck::MissingFields(missing));
    }

    let text = |key: &str| payload.get(key).map(stringify).unwrap_or_default();

    let price = text("productPrice");
    let unit_price = price
        .parse::<i32>()
        .map_err(|_| HandlerError::InvalidNumber {
            field: "productPrice",
            value: price.clone(),
        })?;

    Ok(AdditionCheck::Accepted(CartLineRequest {
        user_id: text("userId"),
        product_id: text("productId"),
        product_name: text("productName"),
        made_by: text("productMadeBy"),
        image: text("productImage"),
        quantity: ADDITION_QUANTITY,
        unit_price,
    }))
}

/// 加购请求到待插入实体的逐字段映射
pub fn to_new_record(request: CartLineRequest, source_ref: Option<String>) -> NewCartRecord {
    NewCartRecord {
        user_id: request.user_id,
        product_id: request.product_id,
        product_name: request.product_name,
        made_by: request.made_by,
        image: request.image,
        quantity: request.quantity,
        unit_price: request.unit_price,
        source_ref,
    }
}

/// 解码删除消息，顶层必须是由 JSON 对象组成的数组
pub fn decode_removal(text: &str) -> Result<Vec<Payload>, HandlerError> {
    serde_json::from_str(text).map_err(|e| HandlerError::Decode(e.to_string()))
}

/// 解析全部条目的购物车 ID
///
/// 任一条目缺少 `cartId` 或无法解析为整数时整条消息被拒绝，此时尚未发出任何删除。
pub fn parse_removal(entries: &[Payload]) -> Result<RemovalRequest, HandlerError> {
    let cart_ids = entries
        .iter()
        .map(|entry| {
            let raw = entry
                .get(CART_ID_KEY)
                .map(stringify)
                .ok_or_else(|| HandlerError::MissingFields {
                    fields: vec![CART_ID_KEY],
                })?;
            raw.parse::<i64>()
                .map_err(|_| HandlerError::InvalidNumber {
                    field: CART_ID_KEY,
                    value: raw,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RemovalRequest { cart_ids })
}
