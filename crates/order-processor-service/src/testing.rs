//! 测试用内存仓储实现
//!
//! 用 HashMap/Vec 模拟两个仓储的语义（含条件认领与三元组幂等创建），
//! 使状态机测试无需真实 Postgres。`fail_finish` 用于注入存储故障，
//! 验证任务边界的回退路径。

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use enroll_shared::error::{EnrollError, Result};
use enroll_shared::events::{OrderPayload, OrderReceivedEvent};

use crate::models::{ItemStatus, Order, OrderItem, OrderStatus};
use crate::publisher::OrderEventPublisher;
use crate::repository::{OrderItemStore, OrderStore};

// ---------------------------------------------------------------------------
// MemoryOrderStore
// ---------------------------------------------------------------------------

pub struct MemoryOrderStore {
    orders: Mutex<HashMap<i64, Order>>,
    /// 注入 finish 故障，模拟处理尾声的存储宕机
    fail_finish: AtomicBool,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: Mutex::new(HashMap::new()),
            fail_finish: AtomicBool::new(false),
        }
    }

    pub fn inject_finish_failure(&self) {
        self.fail_finish.store(true, Ordering::SeqCst);
    }

    pub async fn status_of(&self, order_id: i64) -> Option<OrderStatus> {
        self.orders.lock().unwrap().get(&order_id).map(|o| o.status)
    }

    /// 模拟显式重投的状态重置
    pub async fn reset_status(&self, order_id: i64, status: OrderStatus) {
        if let Some(order) = self.orders.lock().unwrap().get_mut(&order_id) {
            order.status = status;
            order.updated_at = Utc::now();
        }
    }

    /// 把订单的最近变更时间拨回指定秒数，用于僵死判定测试
    pub async fn backdate(&self, order_id: i64, seconds: i64) {
        if let Some(order) = self.orders.lock().unwrap().get_mut(&order_id) {
            order.updated_at = Utc::now() - chrono::Duration::seconds(seconds);
        }
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn get(&self, order_id: i64) -> Result<Option<Order>> {
        Ok(self.orders.lock().unwrap().get(&order_id).cloned())
    }

    async fn get_or_create(
        &self,
        payload: &OrderPayload,
        shop_domain: &str,
    ) -> Result<(Order, bool)> {
        let mut orders = self.orders.lock().unwrap();
        if let Some(existing) = orders.get(&payload.id) {
            return Ok((existing.clone(), false));
        }

        let now = Utc::now();
        let order = Order {
            id: payload.id,
            status: OrderStatus::Unprocessed,
            received: now,
            email: payload.customer.email.clone(),
            first_name: payload.customer.first_name.clone(),
            last_name: payload.customer.last_name.clone(),
            shop_domain: shop_domain.to_string(),
            payload: serde_json::to_value(payload).unwrap(),
            updated_at: now,
        };
        orders.insert(payload.id, order.clone());
        Ok((order, true))
    }

    async fn try_begin_processing(&self, order_id: i64) -> Result<bool> {
        let mut orders = self.orders.lock().unwrap();
        match orders.get_mut(&order_id) {
            Some(order) if order.status == OrderStatus::Unprocessed => {
                order.status = OrderStatus::Processing;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finish(&self, order_id: i64, status: OrderStatus) -> Result<()> {
        if self.fail_finish.load(Ordering::SeqCst) {
            return Err(EnrollError::Internal("注入的存储故障".to_string()));
        }
        if let Some(order) = self.orders.lock().unwrap().get_mut(&order_id) {
            order.status = status;
            order.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_error(&self, order_id: i64) -> Result<()> {
        // 回退路径不经过故障注入：mark_error 是故障发生后的补救动作
        if let Some(order) = self.orders.lock().unwrap().get_mut(&order_id) {
            order.status = OrderStatus::Error;
            order.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reclaim_stale(&self, stale_after: Duration, limit: i64) -> Result<Vec<Order>> {
        let cutoff = Utc::now() - chrono::Duration::seconds(stale_after.as_secs() as i64);
        let mut orders = self.orders.lock().unwrap();

        let mut reclaimed = Vec::new();
        for order in orders.values_mut() {
            if reclaimed.len() as i64 >= limit {
                break;
            }
            if order.status == OrderStatus::Processing && order.updated_at < cutoff {
                reclaimed.push(order.clone());
                order.status = OrderStatus::Unprocessed;
                order.updated_at = Utc::now();
            }
        }
        Ok(reclaimed)
    }
}

// ---------------------------------------------------------------------------
// MemoryItemStore
// ---------------------------------------------------------------------------

pub struct MemoryItemStore {
    items: Mutex<Vec<OrderItem>>,
    next_id: AtomicI64,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub async fn status_of(&self, order_id: i64, sku: &str, email: &str) -> Option<ItemStatus> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.order_id == order_id && i.sku == sku && i.email == email)
            .map(|i| i.status)
    }
}

#[async_trait]
impl OrderItemStore for MemoryItemStore {
    async fn get_or_create(&self, order_id: i64, sku: &str, email: &str) -> Result<OrderItem> {
        let mut items = self.items.lock().unwrap();

        if let Some(existing) = items
            .iter()
            .find(|i| i.order_id == order_id && i.sku == sku && i.email == email)
        {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let item = OrderItem {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            order_id,
            sku: sku.to_string(),
            email: email.to_string(),
            status: ItemStatus::Unprocessed,
            created_at: now,
            updated_at: now,
        };
        items.push(item.clone());
        Ok(item)
    }

    async fn set_status(&self, item_id: i64, status: ItemStatus) -> Result<()> {
        let mut items = self.items.lock().unwrap();
        if let Some(item) = items.iter_mut().find(|i| i.id == item_id) {
            item.status = status;
            item.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_for_order(&self, order_id: i64) -> Result<Vec<OrderItem>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// RecordingPublisher
// ---------------------------------------------------------------------------

/// 记录投递事件的发布器，供 reaper 测试断言重投内容
pub struct RecordingPublisher {
    published: Mutex<Vec<OrderReceivedEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn published(&self) -> Vec<OrderReceivedEvent> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderEventPublisher for RecordingPublisher {
    async fn publish_received(&self, event: &OrderReceivedEvent) -> Result<()> {
        self.published.lock().unwrap().push(event.clone());
        Ok(())
    }
}
