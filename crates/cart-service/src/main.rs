//! 购物车更新服务
//!
//! 消费加购与删除事件，维护 carts 表。

use std::sync::Arc;

use anyhow::Result;
use cart_shared::{config::AppConfig, database::Database, observability};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use cart_service::{CartUpdateService, consumer::CartConsumers, repository::CartRepository};

const SERVICE_NAME: &str = "cart-service";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置：config/ 目录下的分层文件 + CART_ 前缀环境变量
    let config = AppConfig::load(SERVICE_NAME)?;

    // 2. 初始化日志与指标
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(environment = %config.environment, "Starting cart-service...");

    // 3. 初始化数据库连接
    let db = Database::connect_with_retry(&config.database).await?;
    db.health_check().await?;
    if config.database.run_migrations {
        db.run_migrations().await?;
    }

    // 4. 组装服务与消费者
    let repo = Arc::new(CartRepository::new(db.pool().clone()));
    let service = Arc::new(CartUpdateService::new(repo));
    let consumers = CartConsumers::new(&config, service)?;

    // 5. 关闭信号：Ctrl+C / SIGTERM 置为 true，两个消费循环随之退出
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    consumers.run(shutdown_rx).await?;

    db.close().await;
    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号，用于 Kubernetes 优雅关闭
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
