//! 路由定义

use axum::Router;
use axum::routing::post;

use crate::handlers;
use crate::state::AppState;

/// Webhook 接收路由
///
/// 只注册 POST——其余方法由 axum 的方法路由自动回应 405。
pub fn api_routes() -> Router<AppState> {
    Router::new().route(
        "/webhooks/{integration}/orders/create",
        post(handlers::order::order_create),
    )
}
