//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册通用指标
///
/// 这些描述会出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "cart_messages_total",
        "Total number of consumed cart messages by outcome"
    );
    metrics::describe_counter!(
        "cart_message_rejections_total",
        "Total number of rejected cart messages by error kind"
    );
    metrics::describe_histogram!(
        "cart_message_duration_seconds",
        "Cart message handling duration in seconds"
    );
    metrics::describe_counter!("cart_records_saved_total", "Total number of saved cart records");
    metrics::describe_counter!(
        "cart_records_deleted_total",
        "Total number of deleted cart records"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一条消息的处理结果与耗时
#[inline]
pub fn record_message(topic: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "cart_messages_total",
        "topic" => topic.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "cart_message_duration_seconds",
        "topic" => topic.to_string()
    )
    .record(duration_secs);
}

/// 记录被拒绝的消息
#[inline]
pub fn record_rejection(topic: &str, kind: &str) {
    metrics::counter!(
        "cart_message_rejections_total",
        "topic" => topic.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// 记录新增的购物车条目
#[inline]
pub fn record_cart_saved() {
    metrics::counter!("cart_records_saved_total").increment(1);
}

/// 记录删除的购物车条目数
#[inline]
pub fn record_cart_deleted(rows: u64) {
    metrics::counter!("cart_records_deleted_total").increment(rows);
}
