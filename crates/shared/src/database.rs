//! 数据库连接管理模块
//!
//! 负责 carts 库的连接池创建、启动期连接重试、健康检查和内置迁移。

use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument, warn};

use crate::config::DatabaseConfig;
use crate::error::{CartError, Result};

/// 编译期嵌入的迁移脚本，来自仓库根目录的 migrations/
static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// 启动期连接重试的首次等待时间
const RETRY_INITIAL_DELAY: Duration = Duration::from_secs(1);
/// 启动期连接重试的等待上限
const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// 第 `attempt` 次重试前的等待时间（从 0 开始），每次翻倍直到上限
pub fn retry_delay(attempt: u32) -> Duration {
    RETRY_INITIAL_DELAY
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(RETRY_MAX_DELAY)
}

/// 连接池当前状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub size: u32,
    pub idle: usize,
}

/// 数据库连接池包装
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 创建数据库连接池，失败立即返回
    #[instrument(skip(config))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// 服务启动时连接数据库
    ///
    /// 与 Kafka 一同部署时数据库可能尚未就绪，连接失败会按指数退避重试
    /// `connect_retries` 次，仍失败则返回最后一次的错误。
    pub async fn connect_with_retry(config: &DatabaseConfig) -> Result<Self> {
        let mut attempt = 0;
        loop {
            match Self::connect(config).await {
                Ok(db) => {
                    let status = db.status();
                    info!(attempt, pool_size = status.size, "数据库连接池已创建");
                    return Ok(db);
                }
                Err(e) if e.is_retryable() && attempt < config.connect_retries => {
                    let delay = retry_delay(attempt);
                    warn!(
                        attempt,
                        max_retries = config.connect_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "数据库连接失败，稍后重试"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
        }
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(CartError::from)
    }

    /// 应用尚未执行的迁移
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        info!(known_migrations = MIGRATOR.iter().count(), "数据库迁移已应用");
        Ok(())
    }

    /// 关闭连接池，等待借出的连接归还
    pub async fn close(&self) {
        self.pool.close().await;
        info!("数据库连接池已关闭");
    }
}
