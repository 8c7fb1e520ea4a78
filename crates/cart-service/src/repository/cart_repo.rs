//! 购物车仓储
//!
//! 提供 carts 表的插入、删除与查询，以及基于 cart_source_refs 的加购消息去重

use async_trait::async_trait;
use cart_shared::error::Result;
use sqlx::PgPool;
use tracing::instrument;

use super::traits::CartRepositoryTrait;
use crate::models::{CartRecord, NewCartRecord, SaveOutcome};

/// PostgreSQL 购物车仓储
pub struct CartRepository {
    pool: PgPool,
}

impl CartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 插入购物车条目
    ///
    /// 带 `source_ref` 的条目在同一事务中登记到 cart_source_refs。该登记在条目被删除后仍保留，
    /// 同一条 Kafka 消息再次投递时返回 `Duplicate`，不会产生重复条目，也不会恢复已删除的条目。
    /// 并发写入同一 `source_ref` 时，后提交的一方在登记冲突后回滚自己插入的行。
    #[instrument(skip(self, record), fields(user_id = %record.user_id))]
    pub async fn save(&self, record: &NewCartRecord) -> Result<SaveOutcome> {
        if let Some(source_ref) = &record.source_ref
            && let Some(cart_id) = self.find_applied(source_ref).await?
        {
            return Ok(SaveOutcome::Duplicate { cart_id });
        }

        let mut tx = self.pool.begin().await?;

        let saved = sqlx::query_as::<_, CartRecord>(
            r#"
            INSERT INTO carts (user_id, product_id, product_name, made_by, image,
                               quantity, unit_price, source_ref)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING cart_id, user_id, product_id, product_name, made_by, image,
                      quantity, unit_price, source_ref, created_at
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.product_id)
        .bind(&record.product_name)
        .bind(&record.made_by)
        .bind(&record.image)
        .bind(record.quantity)
        .bind(record.unit_price)
        .bind(&record.source_ref)
        .fetch_one(&mut *tx)
        .await?;

        let Some(source_ref) = &record.source_ref else {
            tx.commit().await?;
            return Ok(SaveOutcome::Inserted(saved));
        };

        let claimed = sqlx::query(
            r#"
            INSERT INTO cart_source_refs (source_ref, cart_id)
            VALUES ($1, $2)
            ON CONFLICT (source_ref) DO NOTHING
            "#,
        )
        .bind(source_ref)
        .bind(saved.cart_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 1 {
            tx.commit().await?;
            return Ok(SaveOutcome::Inserted(saved));
        }

        tx.rollback().await?;
        match self.find_applied(source_ref).await? {
            Some(cart_id) => Ok(SaveOutcome::Duplicate { cart_id }),
            None => Err(sqlx::Error::RowNotFound.into()),
        }
    }

    /// 查询某条消息此前写入的购物车 ID
    async fn find_applied(&self, source_ref: &str) -> Result<Option<i64>> {
        let cart_id = sqlx::query_scalar::<_, i64>(
            "SELECT cart_id FROM cart_source_refs WHERE source_ref = $1",
        )
        .bind(source_ref)
        .fetch_optional(&self.pool)
        .await?;

        Ok(cart_id)
    }

    /// 按 ID 删除购物车条目
    #[instrument(skip(self))]
    pub async fn delete_by_id(&self, cart_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM carts WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// 获取单个购物车条目
    pub async fn find_by_id(&self, cart_id: i64) -> Result<Option<CartRecord>> {
        let record = sqlx::query_as::<_, CartRecord>(
            r#"
            SELECT cart_id, user_id, product_id, product_name, made_by, image,
                   quantity, unit_price, source_ref, created_at
            FROM carts
            WHERE cart_id = $1
            "#,
        )
        .bind(cart_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// 列出用户的全部购物车条目，按加入顺序排列
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<CartRecord>> {
        let records = sqlx::query_as::<_, CartRecord>(
            r#"
            SELECT cart_id, user_id, product_id, product_name, made_by, image,
                   quantity, unit_price, source_ref, created_at
            FROM carts
            WHERE user_id = $1
            ORDER BY cart_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

#[async_trait]
impl CartRepositoryTrait for CartRepository {
    async fn save(&self, record: &NewCartRecord) -> Result<SaveOutcome> {
        self.save(record).await
    }

    async fn delete_by_id(&self, cart_id: i64) -> Result<u64> {
        self.delete_by_id(cart_id).await
    }

    async fn find_by_id(&self, cart_id: i64) -> Result<Option<CartRecord>> {
        self.find_by_id(cart_id).await
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<CartRecord>> {
        self.list_by_user(user_id).await
    }
}
