//! 订单事件发布
//!
//! Webhook 服务落库后、reaper 重投僵死订单时，都通过这里把
//! `OrderReceivedEvent` 投递到处理队列。以 trait 抽象便于测试中
//! 用记录型实现替换真实 Kafka。

use async_trait::async_trait;
use enroll_shared::error::Result;
use enroll_shared::events::OrderReceivedEvent;
use enroll_shared::kafka::{KafkaProducer, topics};
use tracing::debug;

/// 订单事件发布接口
#[async_trait]
pub trait OrderEventPublisher: Send + Sync {
    /// 将订单接收事件投递到处理队列
    async fn publish_received(&self, event: &OrderReceivedEvent) -> Result<()>;
}

/// 基于 Kafka 的发布器
///
/// 以订单号为消息 key，同一订单的事件落到同一分区，
/// 保证重复投递按到达顺序被消费。
pub struct KafkaOrderPublisher {
    producer: KafkaProducer,
}

impl KafkaOrderPublisher {
    pub fn new(producer: KafkaProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl OrderEventPublisher for KafkaOrderPublisher {
    async fn publish_received(&self, event: &OrderReceivedEvent) -> Result<()> {
        let (partition, offset) = self
            .producer
            .send_json(topics::ORDERS_RECEIVED, &event.order_id.to_string(), event)
            .await?;

        debug!(
            order_id = event.order_id,
            event_id = %event.event_id,
            partition,
            offset,
            "订单接收事件已投递"
        );
        Ok(())
    }
}
