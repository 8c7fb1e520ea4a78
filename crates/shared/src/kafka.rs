//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为业务友好的 Consumer 抽象，
//! 统一消息拷贝、偏移量确认、重新投递和优雅关闭语义，避免各服务重复编写样板代码。

use std::collections::HashMap;
use std::time::Duration;

use rdkafka::Offset;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::error::CartError;

// ---------------------------------------------------------------------------
// Topic 常量
// ---------------------------------------------------------------------------

/// 集中管理所有 Kafka topic 名称，防止字符串散落在各服务中导致拼写不一致
pub mod topics {
    /// 商品加入购物车事件
    pub const CART_PRODUCT_INFO: &str = "cart-product-info";
    /// 购物车条目删除事件
    pub const CART_REMOVAL: &str = "cart-info-topic";
}

/// seek 操作的超时时间
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// 去重键中摘要的字节数
const SOURCE_REF_DIGEST_BYTES: usize = 8;

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的 Kafka 消息的统一表示
///
/// 将 rdkafka 的 `BorrowedMessage`（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以安全地跨 await 点传递给异步处理函数。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
    pub headers: HashMap<String, String>,
}

impl ConsumerMessage {
    /// 从 rdkafka 的借用消息构造，提取并拥有所有字段
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

        let timestamp = msg.timestamp().to_millis();

        let mut headers = HashMap::new();
        if let Some(h) = msg.headers() {
            for idx in 0..h.count() {
                let header = h.get(idx);
                if let Some(raw) = header.value
                    && let Ok(value) = std::str::from_utf8(raw)
                {
                    headers.insert(header.key.to_string(), value.to_string());
                }
            }
        }

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload,
            timestamp,
            headers,
        }
    }

    /// 将负载视为 UTF-8 字符串返回
    pub fn payload_str(&self) -> Result<&str, CartError> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| CartError::Kafka(format!("负载非 UTF-8 编码: {e}")))
    }

    /// 消息的去重键，格式为 `topic/partition/offset/digest`
    ///
    /// topic 删除重建后偏移量会从 0 重新开始，仅凭位置会把新消息误认为旧消息。
    /// digest 取时间戳与负载的 SHA-256 前 8 字节，同一条消息重复投递时保持不变。
    pub fn source_ref(&self) -> String {
        let mut hasher = Sha256::new();
        if let Some(ts) = self.timestamp {
            hasher.update(ts.to_be_bytes());
        }
        hasher.update(&self.payload);
        let digest: String = hasher.finalize()[..SOURCE_REF_DIGEST_BYTES]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();

        format!("{}/{}/{}/{digest}", self.topic, self.partition, self.offset)
    }
}

// ---------------------------------------------------------------------------
// Acknowledgement
// ---------------------------------------------------------------------------

/// 消息处理完成后对 Kafka 的答复
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// 存储偏移量，消息视为已消费（包括被丢弃的坏消息）
    Commit,
    /// 不存储偏移量，回退到该消息等待重新投递
    Redeliver,
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 消费者
///
/// 封装 `StreamConsumer` 并提供基于 `watch` channel 的优雅关闭语义。
/// 关闭了自动存储偏移量：只有 handler 返回 `Commit` 的消息才会随下一次自动提交确认，
/// 返回 `Redeliver` 的消息会在退避后重新拉取。
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    redelivery_backoff: Duration,
}

impl KafkaConsumer {
    /// 创建消费者
    ///
    /// `group_id_suffix` 允许同一服务内不同消费逻辑使用独立的消费组，
    /// 例如 "cart-service.product-info" 和 "cart-service.removal"。
    pub fn new(config: &KafkaConfig, group_id_suffix: Option<&str>) -> Result<Self, CartError> {
        let group_id = match group_id_suffix {
            Some(suffix) => format!("{}.{}", config.consumer_group, suffix),
            None => config.consumer_group.clone(),
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .create()
            .map_err(|e| CartError::Kafka(format!("创建消费者失败: {e}")))?;

        info!(brokers = %config.brokers, group_id, "Kafka 消费者已初始化");
        Ok(Self {
            consumer,
            redelivery_backoff: Duration::from_millis(config.redelivery_backoff_ms),
        })
    }

    /// 订阅指定的 topic 列表
    pub fn subscribe(&self, topics: &[&str]) -> Result<(), CartError> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| CartError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, "已订阅 Kafka topics");
        Ok(())
    }

    /// 启动消费循环
    ///
    /// 使用 `tokio::select!` 同时监听消息流和关闭信号：
    /// - 收到消息时调用 handler 处理，并按其返回的 `Acknowledgement` 存储偏移量或回退。
    /// - 关闭信号变为 `true` 时退出循环，正在执行的 handler 会先完成。
    pub async fn start<F, Fut>(self, mut shutdown: watch::Receiver<bool>, handler: F)
    where
        F: Fn(ConsumerMessage) -> Fut,
        Fut: std::future::Future<Output = Acknowledgement>,
    {
        use futures::StreamExt;

        let stream = self.consumer.stream();
        futures::pin_mut!(stream);

        info!("Kafka 消费循环已启动");

        loop {
            tokio::select! {
                // 偏向关闭信号，保证收到关闭时能尽快退出
                biased;

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("收到关闭信号，Kafka 消费循环退出");
                        break;
                    }
                }

                msg_result = stream.next() => {
                    let Some(msg_result) = msg_result else {
                        warn!("Kafka 消息流意外结束");
                        break;
                    };

                    // 借用消息不能跨 await，先转换为拥有所有权的结构
                    let msg = match msg_result {
                        Ok(borrowed_msg) => ConsumerMessage::from_borrowed(&borrowed_msg),
                        Err(e) => {
                            error!(error = %e, "接收 Kafka 消息出错");
                            continue;
                        }
                    };

                    debug!(
                        topic = %msg.topic,
                        partition = msg.partition,
                        offset = msg.offset,
                        "收到 Kafka 消息"
                    );

                    let (topic, partition, offset) = (msg.topic.clone(), msg.partition, msg.offset);
                    match handler(msg).await {
                        Acknowledgement::Commit => self.store_offset(&topic, partition, offset),
                        Acknowledgement::Redeliver => {
                            if wait_or_shutdown(self.redelivery_backoff, &mut shutdown).await {
                                // 偏移量未存储，重启后从该消息继续
                                info!(
                                    topic = %topic,
                                    partition,
                                    offset,
                                    "退避期间收到关闭信号，Kafka 消费循环退出"
                                );
                                break;
                            }
                            self.rewind(&topic, partition, offset);
                        }
                    }
                }
            }
        }
    }

    /// 存储下一条待消费的偏移量，由自动提交周期性地提交到集群
    fn store_offset(&self, topic: &str, partition: i32, offset: i64) {
        if let Err(e) = self.consumer.store_offset(topic, partition, offset + 1) {
            warn!(topic, partition, offset, error = %e, "存储偏移量失败，消息可能被重复投递");
        }
    }

    /// 回退到指定消息，下一次拉取会再次得到它
    fn rewind(&self, topic: &str, partition: i32, offset: i64) {
        match self
            .consumer
            .seek(topic, partition, Offset::Offset(offset), SEEK_TIMEOUT)
        {
            Ok(()) => info!(topic, partition, offset, "已回退到消息位置，等待重新投递"),
            Err(e) => error!(
                topic,
                partition,
                offset,
                error = %e,
                "回退消息位置失败，该消息将在消费组重平衡后重新投递"
            ),
        }
    }
}

/// 等待 `delay`，期间收到关闭信号则提前返回 true
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }

    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // 发送端已释放，不会再有关闭信号
                    (&mut sleep).await;
                    return false;
                }
                if *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
