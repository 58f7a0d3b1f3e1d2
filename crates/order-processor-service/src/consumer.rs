//! Kafka 消费者与任务边界
//!
//! 把订单接收事件解码后交给状态机处理，是系统的 at-least-once 任务
//! 执行边界。边界契约：
//!
//! - 重复投递由状态机的条件认领吸收，这里按无副作用跳过；
//! - 处理器抛出未预期故障时，兜底把订单标记为 error 并转入死信队列，
//!   覆盖循环内未预料到的失败模式；
//! - 不自动重试失败订单——重投是显式的运维动作，不在消费路径里发生。

use std::sync::Arc;

use enroll_shared::config::AppConfig;
use enroll_shared::events::OrderReceivedEvent;
use enroll_shared::kafka::{ConsumerMessage, KafkaConsumer, KafkaProducer, topics};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::ProcessorError;
use crate::processor::OrderProcessor;
use crate::repository::OrderStore;

/// 订单事件消费者
///
/// 组合 KafkaConsumer（消息拉取）、OrderProcessor（状态机）
/// 和 KafkaProducer（死信投递）三个组件，形成完整的消费管道。
pub struct OrderConsumer {
    consumer: KafkaConsumer,
    processor: Arc<OrderProcessor>,
    orders: Arc<dyn OrderStore>,
    producer: KafkaProducer,
}

impl OrderConsumer {
    pub fn new(
        config: &AppConfig,
        processor: Arc<OrderProcessor>,
        orders: Arc<dyn OrderStore>,
        producer: KafkaProducer,
    ) -> Result<Self, ProcessorError> {
        let consumer = KafkaConsumer::new(&config.kafka, None).map_err(ProcessorError::Shared)?;
        Ok(Self {
            consumer,
            processor,
            orders,
            producer,
        })
    }

    /// 启动消费循环，直到收到 shutdown 信号
    ///
    /// 单独抽取 handle_event 函数方便在不构造 Kafka 连接的情况下
    /// 测试边界语义。
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), ProcessorError> {
        self.consumer
            .subscribe(&[topics::ORDERS_RECEIVED])
            .map_err(ProcessorError::Shared)?;

        info!(topic = topics::ORDERS_RECEIVED, "订单事件消费者已启动");

        let processor = self.processor;
        let orders = self.orders;
        let producer = self.producer;

        self.consumer
            .start(shutdown, |msg| {
                let processor = &processor;
                let orders = &orders;
                let producer = &producer;
                async move {
                    if let Err(e) = handle_message(processor, orders, producer, &msg).await {
                        error!(
                            error = %e,
                            topic = %msg.topic,
                            partition = msg.partition,
                            offset = msg.offset,
                            "处理订单事件失败"
                        );
                    }
                    Ok(())
                }
            })
            .await;

        info!("订单事件消费者已停止");
        Ok(())
    }
}

/// 处理单条 Kafka 消息的完整流程
///
/// 流程：反序列化 -> 状态机处理 -> 失败时兜底标记 + 死信投递。
/// (topic, partition, offset) 是本次执行的任务标识，失败日志必须携带。
pub async fn handle_message(
    processor: &OrderProcessor,
    orders: &Arc<dyn OrderStore>,
    producer: &KafkaProducer,
    msg: &ConsumerMessage,
) -> Result<(), ProcessorError> {
    let event: OrderReceivedEvent = match msg.deserialize_payload() {
        Ok(event) => event,
        Err(e) => {
            warn!(
                error = %e,
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                "事件反序列化失败，原始消息转入死信队列"
            );
            send_raw_to_dlq(producer, msg).await;
            return Err(ProcessorError::Shared(e));
        }
    };

    if let Err(e) = handle_event(processor, orders, &event).await {
        error!(
            order_id = event.order_id,
            event_id = %event.event_id,
            topic = %msg.topic,
            partition = msg.partition,
            offset = msg.offset,
            error = %e,
            "订单事件处理失败，事件转入死信队列"
        );
        send_to_dlq(producer, &event).await;
        return Err(e);
    }

    Ok(())
}

/// 把已解码事件交给状态机，并落实任务边界的失败契约
///
/// 拆分为独立函数而非方法，便于在测试中用内存仓储直接调用。
pub async fn handle_event(
    processor: &OrderProcessor,
    orders: &Arc<dyn OrderStore>,
    event: &OrderReceivedEvent,
) -> Result<(), ProcessorError> {
    info!(
        order_id = event.order_id,
        event_id = %event.event_id,
        shop_domain = %event.shop_domain,
        "收到订单接收事件"
    );

    match processor.process_order(event.order_id, &event.payload).await {
        Ok(outcome) => {
            info!(
                order_id = outcome.order_id,
                status = %outcome.status,
                items_enrolled = outcome.items_enrolled,
                items_failed = outcome.items_failed,
                processing_time_ms = outcome.processing_time_ms,
                "订单事件处理完成"
            );
            Ok(())
        }
        // at-least-once 投递的正常现象：认领已被其他调用拿走
        Err(ProcessorError::AlreadyClaimed { order_id, status }) => {
            info!(order_id, status = %status, "订单已被认领，重复投递跳过");
            Ok(())
        }
        Err(e) => {
            error!(
                order_id = event.order_id,
                event_id = %event.event_id,
                error = %e,
                "订单处理出现未预期故障，兜底标记为 error"
            );
            // 兜底动作失败只能记日志：订单会停留在 processing，
            // 最终由 reaper 回收
            if let Err(mark_err) = orders.mark_error(event.order_id).await {
                error!(
                    order_id = event.order_id,
                    error = %mark_err,
                    "兜底标记失败，订单等待 reaper 回收"
                );
            }
            Err(e)
        }
    }
}

/// 将处理失败的事件发送到死信队列，供人工排查后显式重投
async fn send_to_dlq(producer: &KafkaProducer, event: &OrderReceivedEvent) {
    if let Err(e) = producer
        .send_json(topics::ORDERS_DLQ, &event.order_id.to_string(), event)
        .await
    {
        error!(
            order_id = event.order_id,
            error = %e,
            "发送到死信队列失败，消息可能丢失"
        );
    }
}

/// 无法解码的消息按原始字节转入死信队列
async fn send_raw_to_dlq(producer: &KafkaProducer, msg: &ConsumerMessage) {
    let key = msg.key.as_deref().unwrap_or("unknown");
    if let Err(e) = producer.send(topics::ORDERS_DLQ, key, &msg.payload).await {
        error!(
            topic = %msg.topic,
            partition = msg.partition,
            offset = msg.offset,
            error = %e,
            "发送到死信队列失败，消息可能丢失"
        );
    }
}
