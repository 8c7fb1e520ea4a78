//! Kafka 消费者与消息分发
//!
//! 每个 topic 使用独立的消费组与消费循环，两个循环在同一任务中并发运行，
//! 共用一个关闭信号。消息按 topic 路由到 CartUpdateService 对应的处理管道，
//! 处理结果映射为偏移量确认或重新投递。

use std::sync::Arc;
use std::time::Instant;

use cart_shared::config::AppConfig;
use cart_shared::kafka::{Acknowledgement, ConsumerMessage, KafkaConsumer, topics};
use cart_shared::observability::metrics::record_message;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::HandlerError;
use crate::events::MessageRejection;
use crate::repository::CartRepositoryTrait;
use crate::service::CartUpdateService;

/// 消息所属的处理管道
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartTopic {
    /// 商品加入购物车
    ProductInfo,
    /// 删除购物车条目
    Removal,
}

impl CartTopic {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProductInfo => topics::CART_PRODUCT_INFO,
            Self::Removal => topics::CART_REMOVAL,
        }
    }

    /// 消费组后缀，与 `KafkaConfig::consumer_group` 拼接成完整的消费组
    pub fn group_suffix(&self) -> &'static str {
        match self {
            Self::ProductInfo => "product-info",
            Self::Removal => "removal",
        }
    }
}

/// 购物车消费者
///
/// 组合两个 KafkaConsumer（加购、删除）与共享的 CartUpdateService。
pub struct CartConsumers<R: CartRepositoryTrait + ?Sized> {
    additions: KafkaConsumer,
    removals: KafkaConsumer,
    service: Arc<CartUpdateService<R>>,
}

impl<R: CartRepositoryTrait + ?Sized> CartConsumers<R> {
    pub fn new(config: &AppConfig, service: Arc<CartUpdateService<R>>) -> Result<Self, HandlerError> {
        let additions =
            KafkaConsumer::new(&config.kafka, Some(CartTopic::ProductInfo.group_suffix()))?;
        let removals = KafkaConsumer::new(&config.kafka, Some(CartTopic::Removal.group_suffix()))?;
        Ok(Self {
            additions,
            removals,
            service,
        })
    }

    /// 启动两个消费循环，直到收到 shutdown 信号
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), HandlerError> {
        let Self {
            additions,
            removals,
            service,
        } = self;

        additions.subscribe(&[CartTopic::ProductInfo.name()])?;
        removals.subscribe(&[CartTopic::Removal.name()])?;

        info!(
            product_info_topic = CartTopic::ProductInfo.name(),
            removal_topic = CartTopic::Removal.name(),
            "购物车消费者已启动"
        );

        let service = &service;
        let addition_loop = additions.start(shutdown.clone(), |msg| async move {
            handle_message(service, CartTopic::ProductInfo, &msg).await
        });
        let removal_loop = removals.start(shutdown, |msg| async move {
            handle_message(service, CartTopic::Removal, &msg).await
        });

        tokio::join!(addition_loop, removal_loop);

        info!("购物车消费者已停止");
        Ok(())
    }
}

/// 处理单条 Kafka 消息
///
/// 消息本身的问题（解码、缺字段、非法数字）确认后丢弃；存储故障交给 Kafka 重新投递。
pub async fn handle_message<R: CartRepositoryTrait + ?Sized>(
    service: &CartUpdateService<R>,
    topic: CartTopic,
    msg: &ConsumerMessage,
) -> Acknowledgement {
    let start = Instant::now();

    let result = match msg.payload_str() {
        Ok(text) => dispatch(service, topic, text, msg).await,
        Err(e) => Err(HandlerError::Decode(e.to_string())),
    };

    let (ack, outcome) = match result {
        Ok(()) => (Acknowledgement::Commit, "applied"),
        Err(e) => {
            let rejection = MessageRejection::new(&e, msg);
            rejection.emit();
            if e.is_retryable() {
                (Acknowledgement::Redeliver, "redelivered")
            } else {
                (Acknowledgement::Commit, "dropped")
            }
        }
    };

    record_message(&msg.topic, outcome, start.elapsed().as_secs_f64());
    debug!(
        topic = %msg.topic,
        partition = msg.partition,
        offset = msg.offset,
        outcome,
        "消息处理结束"
    );

    ack
}

async fn dispatch<R: CartRepositoryTrait + ?Sized>(
    service: &CartUpdateService<R>,
    topic: CartTopic,
    text: &str,
    msg: &ConsumerMessage,
) -> Result<(), HandlerError> {
    match topic {
        CartTopic::ProductInfo => {
            let source_ref = msg.source_ref();
            service.add_to_cart(text, Some(&source_ref)).await?;
        }
        CartTopic::Removal => {
            let summary = service.remove_from_cart(text).await?;
            info!(
                requested = summary.requested.len(),
                removed = summary.removed,
                "购物车删除请求处理完成"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryCartRepository, MockCartRepositoryTrait};
    use cart_shared::error::CartError;
    use std::collections::HashMap;

    fn make_message(topic: CartTopic, offset: i64, payload: &[u8]) -> ConsumerMessage {
        ConsumerMessage {
            topic: topic.name().to_string(),
            partition: 0,
            offset,
            key: None,
            payload: payload.to_vec(),
            timestamp: None,
            headers: HashMap::new(),
        }
    }

    fn setup() -> (InMemoryCartRepository, CartUpdateService<InMemoryCartRepository>) {
        let repo = InMemoryCartRepository::new();
        let service = CartUpdateService::new(Arc::new(repo.clone()));
        (repo, service)
    }

    #[test]
    fn test_topic_routing_names() {
        assert_eq!(CartTopic::ProductInfo.name(), "cart-product-info");
        assert_eq!(CartTopic::Removal.name(), "cart-info-topic");
        assert_eq!(CartTopic::ProductInfo.group_suffix(), "product-info");
        assert_eq!(CartTopic::Removal.group_suffix(), "removal");
    }

    #[tokio::test]
    async fn test_valid_addition_is_committed() {
        let (repo, service) = setup();
        let msg = make_message(
            CartTopic::ProductInfo,
            5,
            br#"{"userId":"u1","productId":"p1","productName":"Widget","productMadeBy":"Acme","productImage":"img.png","productPrice":1999}"#,
        );

        let ack = handle_message(&service, CartTopic::ProductInfo, &msg).await;

        assert_eq!(ack, Acknowledgement::Commit);
        let records = repo.list_by_user("u1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_ref, Some(msg.source_ref()));
    }

    #[tokio::test]
    async fn test_poison_messages_are_committed() {
        let (repo, service) = setup();

        let cases: [(CartTopic, &[u8]); 5] = [
            (CartTopic::ProductInfo, &b"not json"[..]),
            (CartTopic::ProductInfo, &br#"{"userId":"u1","productId":"p1"}"#[..]),
            (CartTopic::ProductInfo, &[0xFF_u8, 0xFE][..]),
            (CartTopic::Removal, &br#"{"cartId":"1"}"#[..]),
            (CartTopic::Removal, &br#"[{"cartId":"one"}]"#[..]),
        ];

        for (offset, (topic, payload)) in cases.into_iter().enumerate() {
            let msg = make_message(topic, offset as i64, payload);
            assert_eq!(
                handle_message(&service, topic, &msg).await,
                Acknowledgement::Commit
            );
        }
        assert_eq!(repo.count(), 0);
    }

    #[tokio::test]
    async fn test_store_rejection_is_dropped_not_redelivered() {
        let mut repo = MockCartRepositoryTrait::new();
        repo.expect_save().times(1).returning(|_| {
            Err(CartError::Database(sqlx::Error::Protocol(
                "invalid byte sequence for encoding \"UTF8\": 0x00".to_string(),
            )))
        });
        repo.expect_delete_by_id()
            .times(1)
            .returning(|_| Err(CartError::Database(sqlx::Error::RowNotFound)));
        let service = CartUpdateService::new(Arc::new(repo));

        // 加购负载中含 NUL 字符，能通过解码但会被数据库拒绝
        let addition = make_message(
            CartTopic::ProductInfo,
            0,
            br#"{"userId":"u\u0000","productId":"p1","productName":"Widget","productMadeBy":"Acme","productImage":"img.png","productPrice":1}"#,
        );
        assert_eq!(
            handle_message(&service, CartTopic::ProductInfo, &addition).await,
            Acknowledgement::Commit
        );

        let removal = make_message(CartTopic::Removal, 1, br#"[{"cartId":"1"}]"#);
        assert_eq!(
            handle_message(&service, CartTopic::Removal, &removal).await,
            Acknowledgement::Commit
        );
    }

    #[tokio::test]
    async fn test_store_outage_requests_redelivery() {
        let (repo, service) = setup();
        repo.set_available(false);

        let msg = make_message(CartTopic::Removal, 0, br#"[{"cartId":"1"}]"#);
        assert_eq!(
            handle_message(&service, CartTopic::Removal, &msg).await,
            Acknowledgement::Redeliver
        );
    }
}
