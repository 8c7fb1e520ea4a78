//! 仓储 Trait 定义
//!
//! 定义仓储接口，便于服务层依赖抽象而非具体实现，支持 mock 测试

use async_trait::async_trait;
use cart_shared::error::Result;

use crate::models::{CartRecord, NewCartRecord, SaveOutcome};

/// 购物车仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CartRepositoryTrait: Send + Sync {
    /// 插入一行并返回分配了 `cart_id` 的实体
    ///
    /// `source_ref` 此前已写入过时不插入，返回 `SaveOutcome::Duplicate`，
    /// 即使当时插入的行已被删除。
    async fn save(&self, record: &NewCartRecord) -> Result<SaveOutcome>;

    /// 按 ID 删除，返回受影响行数；ID 不存在时返回 0
    async fn delete_by_id(&self, cart_id: i64) -> Result<u64>;

    async fn find_by_id(&self, cart_id: i64) -> Result<Option<CartRecord>>;

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<CartRecord>>;
}
