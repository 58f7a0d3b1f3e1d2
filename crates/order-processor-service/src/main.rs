//! 订单处理服务入口
//!
//! 消费订单接收事件，驱动订单状态机完成课程注册，
//! 并运行僵死订单回收 worker。

use std::sync::Arc;
use std::time::Duration;

use enroll_shared::config::AppConfig;
use enroll_shared::database::Database;
use enroll_shared::kafka::KafkaProducer;
use enroll_shared::observability;
use order_processor_service::consumer::OrderConsumer;
use order_processor_service::gateway::EnrollmentApiClient;
use order_processor_service::processor::OrderProcessor;
use order_processor_service::publisher::KafkaOrderPublisher;
use order_processor_service::reaper::StaleOrderReaper;
use order_processor_service::repository::{
    OrderItemRepository, OrderItemStore, OrderRepository, OrderStore,
};
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("order-processor-service").unwrap_or_default();
    observability::init(&config.observability)?;

    info!("Starting order-processor-service");

    // 初始化基础设施
    let db = Database::connect(&config.database).await?;
    let producer = KafkaProducer::new(&config.kafka)?;

    let orders: Arc<dyn OrderStore> = Arc::new(OrderRepository::new(db.pool().clone()));
    let items: Arc<dyn OrderItemStore> = Arc::new(OrderItemRepository::new(db.pool().clone()));
    let gateway = Arc::new(EnrollmentApiClient::new(&config.gateway)?);

    let processor = Arc::new(OrderProcessor::new(
        orders.clone(),
        items.clone(),
        gateway,
    ));

    // 启动僵死订单回收 Worker
    let publisher = Arc::new(KafkaOrderPublisher::new(producer.clone()));
    let reaper = StaleOrderReaper::new(
        orders.clone(),
        publisher,
        Duration::from_secs(config.processing.reaper_poll_seconds),
        Duration::from_secs(config.processing.stale_after_seconds),
        config.processing.reaper_batch_size,
    );
    tokio::spawn(async move {
        reaper.run().await;
    });

    // 优雅关闭：收到 SIGTERM（K8s 停止 Pod）或 Ctrl+C 时通知消费循环退出，
    // 正在处理的订单自然跑完
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let consumer = OrderConsumer::new(&config, processor, orders, producer)?;
    consumer.run(shutdown_rx).await?;

    db.close().await;
    info!("order-processor-service shutdown complete");

    Ok(())
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("注册 Ctrl+C 处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("注册 SIGTERM 处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
