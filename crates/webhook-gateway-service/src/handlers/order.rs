//! order/create 事件处理器
//!
//! 接收店铺订单创建 Webhook 的唯一入口。任何状态写入都发生在
//! 签名与域名双重校验之后；订单落库是幂等的，重复投递不会
//! 覆盖或复制记录，只有仍处于 unprocessed 的订单才会再次入队。

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use enroll_shared::events::{OrderPayload, OrderReceivedEvent};
use enroll_shared::signature;
use order_processor_service::models::OrderStatus;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{Result, WebhookError};
use crate::state::AppState;

/// 店铺签名头：原始请求体的 base64 HMAC-SHA256
pub const SIGNATURE_HEADER: &str = "x-shopify-hmac-sha256";
/// 店铺域名头：标识事件来源店铺
pub const SHOP_DOMAIN_HEADER: &str = "x-shopify-shop-domain";

/// 处理 order/create 事件
///
/// 响应契约：缺头/坏 JSON -> 400；签名或域名不符 -> 403；
/// 事件被接受 -> 200（无论订单是新建、重复还是已处理完毕——
/// 店铺端只关心事件是否送达，不关心下游注册结果）。
pub async fn order_create(
    State(state): State<AppState>,
    Path(integration): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>> {
    // 1. 必需请求头
    let presented_signature = header_value(&headers, SIGNATURE_HEADER)?;
    let shop_domain = header_value(&headers, SHOP_DOMAIN_HEADER)?;

    // 2. 解码订单负载
    let payload: OrderPayload = serde_json::from_slice(&body)
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

    // 3. 认证：集成配置查找 + 原始字节签名校验 + 域名比对
    let conf = state
        .webhook
        .integration(&integration)
        .ok_or_else(|| WebhookError::UnknownIntegration(integration.clone()))?;

    if !signature::verify(&conf.secret, &body, presented_signature) {
        warn!(%integration, shop_domain, "Webhook 签名校验失败");
        return Err(WebhookError::SignatureMismatch);
    }

    if conf.shop_domain != shop_domain {
        warn!(
            %integration,
            shop_domain,
            expected = %conf.shop_domain,
            "Webhook 店铺域名不匹配"
        );
        return Err(WebhookError::DomainMismatch);
    }

    // 4. 幂等落库：重复投递落到同一行，不覆盖任何字段
    let (order, created) = state.orders.get_or_create(&payload, shop_domain).await?;

    // 5. 仅在订单尚未被认领时入队；重复投递对已在处理/已处理完毕的
    //    订单只应答 200，不产生新的处理任务
    let enqueued = if order.status == OrderStatus::Unprocessed {
        let event = OrderReceivedEvent::new(shop_domain, payload);
        state.publisher.publish_received(&event).await?;
        info!(
            order_id = order.id,
            event_id = %event.event_id,
            created,
            "订单事件已入队"
        );
        true
    } else {
        info!(
            order_id = order.id,
            status = %order.status,
            "订单已存在且不处于 unprocessed，跳过入队"
        );
        false
    };

    Ok(Json(json!({
        "success": true,
        "code": "ACCEPTED",
        "message": "事件已接收",
        "data": {
            "order_id": order.id,
            "enqueued": enqueued
        }
    })))
}

/// 读取必需请求头，缺失或非 ASCII 视为 400
fn header_value<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingHeader(name))
}
