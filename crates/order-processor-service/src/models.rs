//! 订单数据模型
//!
//! 订单与行项目两条记录及其状态枚举。状态枚举同时支持数据库（sqlx）
//! 和 JSON（serde）序列化。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 订单处理状态
///
/// 沿固定路径单向推进：unprocessed -> processing -> processed | error。
/// error 订单可被显式重投回到处理流程；processed 是终态，永不重跑。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum OrderStatus {
    /// 已落库，尚未被任何处理调用认领
    #[default]
    Unprocessed,
    /// 已被某次处理调用认领（瞬态）
    Processing,
    /// 全部行项目注册成功（终态）
    Processed,
    /// 本次处理存在至少一个失败，等待显式重投
    Error,
}

impl OrderStatus {
    /// processed 订单不允许再次进入处理流程
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unprocessed => "UNPROCESSED",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

/// 行项目处理状态
///
/// unprocessed -> processed | error。processed 行项目永不重试；
/// error 行项目在同一订单的后续处理轮次中也不会自动重试，
/// 只有状态被外部重置后才会再次调用网关。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Unprocessed,
    Processed,
    Error,
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unprocessed => "UNPROCESSED",
            Self::Processed => "PROCESSED",
            Self::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

/// 订单记录
///
/// 主键直接使用店铺分配的订单号，不生成代理键——同一订单的重复投递
/// 天然落到同一行上。`payload` 保存原始订单负载，使僵死订单的重投
/// 不依赖店铺端重发。
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub status: OrderStatus,
    pub received: DateTime<Utc>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// 发送店铺域名，重投时回填事件信封
    pub shop_domain: String,
    /// 原始订单负载（JSONB）
    pub payload: serde_json::Value,
    /// 最近一次状态变更时间，reaper 的僵死判定输入
    pub updated_at: DateTime<Utc>,
}

/// 行项目记录
///
/// 自然身份是 (order_id, sku, email) 三元组——同一订单负载中
/// 重复出现的 (sku, email) 对表示同一个注册意图，幂等创建
/// 按三元组去重；`id` 只是外部引用用的代理键。
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub sku: String,
    pub email: String,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
