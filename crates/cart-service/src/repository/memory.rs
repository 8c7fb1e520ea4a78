//! 内存购物车仓储
//!
//! 使用 DashMap 保存购物车条目，语义与 PostgreSQL 实现一致：自增 ID；
//! 已写入的 source_ref 在条目删除后仍保留，重复投递返回 `Duplicate`；
//! 删除不存在的 ID 返回 0。适用于测试和本地开发。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use cart_shared::error::{CartError, Result};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::traits::CartRepositoryTrait;
use crate::models::{CartRecord, NewCartRecord, SaveOutcome};

/// 内存购物车仓储
///
/// 可通过 `set_available(false)` 模拟数据库不可用，所有操作返回连接池超时错误。
#[derive(Debug, Clone)]
pub struct InMemoryCartRepository {
    records: Arc<DashMap<i64, CartRecord>>,
    /// 已写入的 source_ref → cart_id，对应 cart_source_refs 表
    applied: Arc<DashMap<String, i64>>,
    next_id: Arc<AtomicI64>,
    available: Arc<AtomicBool>,
}

impl Default for InMemoryCartRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCartRepository {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            applied: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicI64::new(1)),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// 切换存储可用性
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// 当前条目数
    pub fn count(&self) -> usize {
        self.records.len()
    }

    fn insert(&self, record: &NewCartRecord) -> CartRecord {
        let cart_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let saved = record.clone().into_record(cart_id, Utc::now());
        self.records.insert(cart_id, saved.clone());
        saved
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CartError::Database(sqlx::Error::PoolTimedOut))
        }
    }
}

#[async_trait]
impl CartRepositoryTrait for InMemoryCartRepository {
    async fn save(&self, record: &NewCartRecord) -> Result<SaveOutcome> {
        self.ensure_available()?;

        let Some(source_ref) = &record.source_ref else {
            return Ok(SaveOutcome::Inserted(self.insert(record)));
        };

        // entry 持有分片锁，同一 source_ref 只会插入一次
        match self.applied.entry(source_ref.clone()) {
            Entry::Occupied(entry) => Ok(SaveOutcome::Duplicate {
                cart_id: *entry.get(),
            }),
            Entry::Vacant(entry) => {
                let saved = self.insert(record);
                entry.insert(saved.cart_id);
                Ok(SaveOutcome::Inserted(saved))
            }
        }
    }

    async fn delete_by_id(&self, cart_id: i64) -> Result<u64> {
        self.ensure_available()?;
        Ok(self.records.remove(&cart_id).map_or(0, |_| 1))
    }

    async fn find_by_id(&self, cart_id: i64) -> Result<Option<CartRecord>> {
        self.ensure_available()?;
        Ok(self.records.get(&cart_id).map(|r| r.clone()))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<CartRecord>> {
        self.ensure_available()?;
        let mut records: Vec<CartRecord> = self
            .records
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|r| r.cart_id);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(source_ref: Option<&str>) -> NewCartRecord {
        NewCartRecord {
            user_id: "u1".to_string(),
            product_id: "p1".to_string(),
            product_name: "Widget".to_string(),
            made_by: "Acme".to_string(),
            image: "img.png".to_string(),
            quantity: 1,
            unit_price: 1999,
            source_ref: source_ref.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_save_assigns_increasing_ids() {
        let repo = InMemoryCartRepository::new();
        let first = repo.save(&new_record(None)).await.unwrap();
        let second = repo.save(&new_record(None)).await.unwrap();

        assert_eq!(first.cart_id(), 1);
        assert_eq!(second.cart_id(), 2);
        assert_eq!(repo.list_by_user("u1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_save_same_source_ref_returns_existing() {
        let repo = InMemoryCartRepository::new();
        let first = repo.save(&new_record(Some("t/0/1"))).await.unwrap();
        let again = repo.save(&new_record(Some("t/0/1"))).await.unwrap();

        assert!(first.inserted().is_some());
        assert_eq!(
            again,
            SaveOutcome::Duplicate {
                cart_id: first.cart_id()
            }
        );
        assert_eq!(repo.count(), 1);
    }

    #[tokio::test]
    async fn test_deleted_row_is_not_restored_by_same_source_ref() {
        let repo = InMemoryCartRepository::new();
        let first = repo.save(&new_record(Some("t/0/1"))).await.unwrap();
        assert_eq!(repo.delete_by_id(first.cart_id()).await.unwrap(), 1);

        let again = repo.save(&new_record(Some("t/0/1"))).await.unwrap();

        assert_eq!(
            again,
            SaveOutcome::Duplicate {
                cart_id: first.cart_id()
            }
        );
        assert_eq!(repo.count(), 0);
    }

    #[tokio::test]
    async fn test_delete_missing_id_is_noop() {
        let repo = InMemoryCartRepository::new();
        let cart_id = repo.save(&new_record(None)).await.unwrap().cart_id();

        assert_eq!(repo.delete_by_id(cart_id).await.unwrap(), 1);
        assert_eq!(repo.delete_by_id(cart_id).await.unwrap(), 0);
        assert!(repo.find_by_id(cart_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_retryably() {
        let repo = InMemoryCartRepository::new();
        repo.set_available(false);

        let err = repo.save(&new_record(None)).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(repo.count(), 0);
    }
}
