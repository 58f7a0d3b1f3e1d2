//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;

use enroll_shared::config::WebhookConfig;
use order_processor_service::publisher::OrderEventPublisher;
use order_processor_service::repository::OrderStore;

/// Axum 应用共享状态
///
/// 订单仓储与事件发布器以 trait 对象注入，handler 测试用
/// 内存实现替换，无需真实 Postgres/Kafka。
#[derive(Clone)]
pub struct AppState {
    /// 各集成的签名密钥与期望域名
    pub webhook: Arc<WebhookConfig>,
    /// 订单仓储（幂等落库）
    pub orders: Arc<dyn OrderStore>,
    /// 处理队列事件发布器
    pub publisher: Arc<dyn OrderEventPublisher>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(
        webhook: Arc<WebhookConfig>,
        orders: Arc<dyn OrderStore>,
        publisher: Arc<dyn OrderEventPublisher>,
    ) -> Self {
        Self {
            webhook,
            orders,
            publisher,
        }
    }
}
