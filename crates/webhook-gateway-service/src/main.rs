//! Webhook 接收服务入口
//!
//! 对外暴露店铺 order/create 事件的接收端点以及存活/就绪探针。

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use enroll_shared::config::AppConfig;
use enroll_shared::database::Database;
use enroll_shared::kafka::KafkaProducer;
use enroll_shared::observability;
use order_processor_service::publisher::{KafkaOrderPublisher, OrderEventPublisher};
use order_processor_service::repository::{OrderRepository, OrderStore};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use webhook_gateway_service::routes;
use webhook_gateway_service::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("webhook-gateway-service").unwrap_or_default();
    observability::init(&config.observability)?;

    info!("Starting webhook-gateway-service on {}", config.server_addr());

    // 初始化基础设施
    let db = Database::connect(&config.database).await?;
    let producer = KafkaProducer::new(&config.kafka)?;

    let orders: Arc<dyn OrderStore> = Arc::new(OrderRepository::new(db.pool().clone()));
    let publisher: Arc<dyn OrderEventPublisher> =
        Arc::new(KafkaOrderPublisher::new(producer));

    if !config.is_production() {
        info!("开发环境使用默认 Webhook 密钥，生产环境必须通过配置覆盖");
    }

    let state = AppState::new(Arc::new(config.webhook.clone()), orders, publisher);

    let app = Router::new()
        .merge(routes::api_routes())
        .route("/health", get(health_check))
        .route(
            "/ready",
            get({
                let db_for_ready = db.clone();
                move || readiness_check(db_for_ready.clone())
            }),
        )
        // 可观测性：请求级 tracing
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 优雅关闭：收到 SIGTERM（K8s 停止 Pod）或 Ctrl+C 时，
    // 停止接收新连接并等待已有请求处理完毕
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");

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

/// 存活探针：服务进程正常即返回 ok
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "webhook-gateway-service"
    }))
}

/// 就绪探针：检查数据库连接是否可用
///
/// 就绪失败时负载均衡会把实例摘除，避免把事件路由到
/// 无法落库的实例上。
async fn readiness_check(db: Database) -> Json<serde_json::Value> {
    let db_ok = db.health_check().await.is_ok();

    Json(serde_json::json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "service": "webhook-gateway-service",
        "checks": {
            "database": if db_ok { "ok" } else { "fail" }
        }
    }))
}
