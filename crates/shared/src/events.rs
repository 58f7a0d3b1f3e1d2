//! 订单事件模型
//!
//! 定义店铺 Webhook 负载的解码结构和进入处理队列的事件信封。
//! Webhook 服务与订单处理服务共享这些类型：前者解码并投递，
//! 后者消费并驱动状态机。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EnrollError;

// ---------------------------------------------------------------------------
// OrderPayload — 店铺订单负载
// ---------------------------------------------------------------------------

/// 店铺 order/create 事件的订单负载
///
/// 字段名与店铺端 JSON 保持一致；店铺会附带大量额外字段，
/// 反序列化时一律忽略，只保留处理所需的最小集合。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPayload {
    /// 店铺分配的订单号，全局唯一，直接用作主键
    pub id: i64,
    pub customer: Customer,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

/// 下单客户信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// 订单中的单个行项目
///
/// `sku` 对应课程标识；学员邮箱不在固定字段里，而是埋在
/// `properties` 列表中 name 为 "email" 的条目。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub properties: Vec<LineItemProperty>,
}

/// 行项目附加属性（name/value 对）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemProperty {
    pub name: String,
    pub value: String,
}

/// 从行项目中提取出的注册参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollmentParams<'a> {
    pub sku: &'a str,
    pub email: &'a str,
}

impl LineItem {
    /// 提取 (sku, email) 注册参数
    ///
    /// 缺少 sku 或缺少 name 为 "email" 的属性即视为畸形行项目。
    /// 畸形行项目不会中止整单处理，只把订单标记为出错——
    /// 错误信息由调用方收集。
    pub fn enrollment_params(&self) -> Result<EnrollmentParams<'_>, EnrollError> {
        let sku = self
            .sku
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EnrollError::Validation("行项目缺少 sku".to_string()))?;

        let email = self
            .properties
            .iter()
            .find(|p| p.name == "email")
            .map(|p| p.value.as_str())
            .ok_or_else(|| EnrollError::Validation("行项目缺少 email 属性".to_string()))?;

        Ok(EnrollmentParams { sku, email })
    }
}

// ---------------------------------------------------------------------------
// OrderReceivedEvent — 处理队列的事件信封
// ---------------------------------------------------------------------------

/// 新订单已接收事件
///
/// Webhook 服务验签并落库后投递到处理队列的信封。Kafka 为 at-least-once
/// 投递，同一订单的事件可能重复到达，消费端依赖订单状态机的条件更新
/// 保证重复事件不产生副作用。携带完整负载使得重投（含 reaper 重新投递）
/// 不依赖店铺端重发。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceivedEvent {
    /// 事件唯一标识（UUID v7），时间有序便于排查投递历史
    pub event_id: String,
    /// 店铺订单号
    pub order_id: i64,
    /// 发送店铺的域名
    pub shop_domain: String,
    /// 事件接收时间
    pub received_at: DateTime<Utc>,
    /// 完整订单负载
    pub payload: OrderPayload,
}

impl OrderReceivedEvent {
    /// 构建新事件，自动生成 UUID v7 作为 event_id 并记录当前时间
    pub fn new(shop_domain: impl Into<String>, payload: OrderPayload) -> Self {
        Self {
            event_id: Uuid::now_v7().to_string(),
            order_id: payload.id,
            shop_domain: shop_domain.into(),
            received_at: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
