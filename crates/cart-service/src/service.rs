//! 购物车更新服务
//!
//! 加购与删除两条处理管道：解码 → 校验 → 映射 → 持久化。
//! 不依赖 Kafka，输入为消息文本，便于在测试中直接驱动。

use std::sync::Arc;

use cart_shared::observability::metrics::{record_cart_deleted, record_cart_saved};
use tracing::{debug, info, instrument};

use crate::error::HandlerError;
use crate::mapping::{self, AdditionCheck};
use crate::models::SaveOutcome;
use crate::repository::CartRepositoryTrait;

/// 一条删除消息的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalSummary {
    /// 消息中列出的购物车 ID，保持原顺序
    pub requested: Vec<i64>,
    /// 实际删除的行数（重复删除或 ID 不存在时小于请求数）
    pub removed: u64,
}

/// 购物车更新服务
pub struct CartUpdateService<R: CartRepositoryTrait + ?Sized> {
    repo: Arc<R>,
}

impl<R: CartRepositoryTrait + ?Sized> CartUpdateService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// 处理一条加购消息
    ///
    /// 成功时插入一行；`source_ref` 用于识别同一条消息的重复投递，
    /// 重复投递返回 `SaveOutcome::Duplicate` 且不计入新增指标。
    #[instrument(skip(self, text))]
    pub async fn add_to_cart(
        &self,
        text: &str,
        source_ref: Option<&str>,
    ) -> Result<SaveOutcome, HandlerError> {
        let payload = mapping::decode_addition(text)?;

        let request = match mapping::validate_addition(&payload)? {
            AdditionCheck::Accepted(request) => request,
            AdditionCheck::MissingFields(fields) => {
                return Err(HandlerError::MissingFields { fields });
            }
        };

        let record = mapping::to_new_record(request, source_ref.map(str::to_string));
        let outcome = self.repo.save(&record).await?;

        match &outcome {
            SaveOutcome::Inserted(saved) => {
                record_cart_saved();
                info!(
                    cart_id = saved.cart_id,
                    user_id = %saved.user_id,
                    product_id = %saved.product_id,
                    unit_price = saved.unit_price,
                    "购物车条目已保存"
                );
            }
            SaveOutcome::Duplicate { cart_id } => info!(
                cart_id,
                source_ref = ?record.source_ref,
                "消息此前已写入，跳过"
            ),
        }

        Ok(outcome)
    }

    /// 处理一条删除消息
    ///
    /// 先解析全部 ID，再按消息顺序逐个删除。任一删除失败立即返回，
    /// 此前已删除的行已计入指标；重新投递时这些 ID 再删一次只会影响 0 行。
    #[instrument(skip(self, text))]
    pub async fn remove_from_cart(&self, text: &str) -> Result<RemovalSummary, HandlerError> {
        let entries = mapping::decode_removal(text)?;
        let request = mapping::parse_removal(&entries)?;

        info!(cart_ids = ?request.cart_ids, "收到购物车删除请求");

        let mut removed = 0;
        for &cart_id in &request.cart_ids {
            let rows = self.repo.delete_by_id(cart_id).await?;
            if rows == 0 {
                debug!(cart_id, "购物车条目不存在，跳过");
            } else {
                record_cart_deleted(rows);
            }
            removed += rows;
        }

        Ok(RemovalSummary {
            requested: request.cart_ids,
            removed,
        })
    }
}
