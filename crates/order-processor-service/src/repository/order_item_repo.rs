//! 行项目仓储
//!
//! 行项目按 (order_id, sku, email) 三元组幂等创建。唯一索引建在
//! 三元组上，同一注册意图不会产生重复行，已注册成功的行项目
//! 在订单重投时直接以 processed 状态返回。

use async_trait::async_trait;
use enroll_shared::error::{EnrollError, Result};
use sqlx::PgPool;

use super::traits::OrderItemStore;
use crate::models::{ItemStatus, OrderItem};

/// 行项目仓储
pub struct OrderItemRepository {
    pool: PgPool,
}

impl OrderItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ITEM_COLUMNS: &str = "id, order_id, sku, email, status, created_at, updated_at";

#[async_trait]
impl OrderItemStore for OrderItemRepository {
    async fn get_or_create(&self, order_id: i64, sku: &str, email: &str) -> Result<OrderItem> {
        let inserted = sqlx::query_as::<_, OrderItem>(&format!(
            r#"
            INSERT INTO order_items (order_id, sku, email, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id, sku, email) DO NOTHING
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(order_id)
        .bind(sku)
        .bind(email)
        .bind(ItemStatus::Unprocessed)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(item) = inserted {
            return Ok(item);
        }

        // 冲突说明三元组已存在；行项目永不删除，这里必然读得到
        let existing = sqlx::query_as::<_, OrderItem>(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM order_items
            WHERE order_id = $1 AND sku = $2 AND email = $3
            "#
        ))
        .bind(order_id)
        .bind(sku)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| EnrollError::NotFound {
            entity: "OrderItem".to_string(),
            id: format!("{order_id}/{sku}/{email}"),
        })?;

        Ok(existing)
    }

    async fn set_status(&self, item_id: i64, status: ItemStatus) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE order_items
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(item_id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_order(&self, order_id: i64) -> Result<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM order_items
            WHERE order_id = $1
            ORDER BY id ASC
            "#
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }
}
