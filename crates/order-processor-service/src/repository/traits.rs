//! 仓储 Trait 定义
//!
//! 定义仓储接口，便于处理器依赖抽象而非具体实现，支持 mock 测试

use std::time::Duration;

use async_trait::async_trait;
use enroll_shared::error::Result;
use enroll_shared::events::OrderPayload;

use crate::models::{ItemStatus, Order, OrderItem, OrderStatus};

/// 订单仓储接口
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// 按订单号查询
    async fn get(&self, order_id: i64) -> Result<Option<Order>>;

    /// 幂等创建订单记录
    ///
    /// 订单号已存在时返回既有记录且不覆盖任何字段；
    /// 返回值的 bool 表示本次调用是否真正创建了记录。
    async fn get_or_create(&self, payload: &OrderPayload, shop_domain: &str)
    -> Result<(Order, bool)>;

    /// 条件认领：unprocessed -> processing 的原子转换
    ///
    /// 返回 true 表示本次调用赢得认领。并发的重复投递只有一个
    /// 调用能赢，这是整个系统防止重复注册的关键约束。
    async fn try_begin_processing(&self, order_id: i64) -> Result<bool>;

    /// 处理完成，落终态（processed 或 error）
    async fn finish(&self, order_id: i64, status: OrderStatus) -> Result<()>;

    /// 无条件标记为 error
    ///
    /// 任务边界在处理器抛出未预期故障时的回退动作，
    /// 不关心订单当前停在哪个状态。
    async fn mark_error(&self, order_id: i64) -> Result<()>;

    /// 回收僵死的 processing 订单
    ///
    /// 将停留在 processing 超过 `stale_after` 的订单翻回 unprocessed，
    /// 返回被回收的订单（含负载，供重投）。多实例并发回收安全。
    async fn reclaim_stale(&self, stale_after: Duration, limit: i64) -> Result<Vec<Order>>;
}

/// 行项目仓储接口
#[async_trait]
pub trait OrderItemStore: Send + Sync {
    /// 按 (order_id, sku, email) 三元组幂等创建行项目
    ///
    /// 三元组已存在时返回既有记录（保留其状态），不产生重复行。
    async fn get_or_create(&self, order_id: i64, sku: &str, email: &str) -> Result<OrderItem>;

    /// 更新行项目状态
    async fn set_status(&self, item_id: i64, status: ItemStatus) -> Result<()>;

    /// 列出订单下的全部行项目
    async fn list_for_order(&self, order_id: i64) -> Result<Vec<OrderItem>>;
}
