//! 僵死订单回收 Worker
//!
//! 处理循环没有中途取消机制，worker 崩溃会让订单永远停留在
//! processing——既不会被重复投递认领（条件更新只认 unprocessed），
//! 也不会有人重投。本 worker 定期扫描停留超过阈值的 processing 订单，
//! 翻回 unprocessed 并从落库的原始负载重建事件重新投递。
//! 重投属于 at-least-once 语义的一部分，条件认领保证不会双跑。
//!
//! error 订单不在回收范围内：失败订单的重投永远是显式运维动作。

use std::sync::Arc;
use std::time::Duration;

use enroll_shared::events::{OrderPayload, OrderReceivedEvent};
use tracing::{error, info, warn};

use crate::error::ProcessorError;
use crate::publisher::OrderEventPublisher;
use crate::repository::OrderStore;

/// 僵死订单回收 Worker
///
/// 以固定间隔轮询数据库。`reclaim_stale` 内部使用
/// `FOR UPDATE SKIP LOCKED`，多实例部署时不会重复回收同一批订单。
pub struct StaleOrderReaper {
    orders: Arc<dyn OrderStore>,
    publisher: Arc<dyn OrderEventPublisher>,
    /// 轮询间隔
    poll_interval: Duration,
    /// processing 停留超过此时长视为僵死
    stale_after: Duration,
    /// 每批回收的最大订单数
    batch_size: i64,
}

impl StaleOrderReaper {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        publisher: Arc<dyn OrderEventPublisher>,
        poll_interval: Duration,
        stale_after: Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            orders,
            publisher,
            poll_interval,
            stale_after,
            batch_size,
        }
    }

    /// 主循环：持续回收直到进程退出
    pub async fn run(&self) {
        info!(
            poll_interval = ?self.poll_interval,
            stale_after = ?self.stale_after,
            batch_size = self.batch_size,
            "StaleOrderReaper 已启动"
        );

        loop {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "回收僵死订单出错");
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// 执行一轮回收，返回重投的订单数
    ///
    /// 抽成独立方法便于测试单轮语义而不进入无限循环。
    pub async fn run_once(&self) -> Result<usize, ProcessorError> {
        let reclaimed = self
            .orders
            .reclaim_stale(self.stale_after, self.batch_size)
            .await?;

        if reclaimed.is_empty() {
            return Ok(0);
        }

        info!(count = reclaimed.len(), "发现僵死订单，准备重投");

        let mut republished = 0usize;
        for order in &reclaimed {
            // 从落库的原始负载重建事件信封
            let payload: OrderPayload = match serde_json::from_value(order.payload.clone()) {
                Ok(p) => p,
                Err(e) => {
                    // 负载无法还原的订单跳过本轮，留在 unprocessed 等人工处理
                    warn!(order_id = order.id, error = %e, "落库负载无法还原，跳过重投");
                    continue;
                }
            };

            let event = OrderReceivedEvent::new(order.shop_domain.clone(), payload);
            match self.publisher.publish_received(&event).await {
                Ok(()) => {
                    republished += 1;
                    info!(order_id = order.id, event_id = %event.event_id, "僵死订单已重投");
                }
                Err(e) => {
                    // 投递失败不回滚状态：订单已回到 unprocessed，下一轮再试
                    error!(order_id = order.id, error = %e, "僵死订单重投失败，下一轮重试");
                }
            }
        }

        Ok(republished)
    }
}
