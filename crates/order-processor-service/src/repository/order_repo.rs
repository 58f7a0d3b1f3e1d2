//! 订单仓储
//!
//! 订单记录的幂等创建与状态推进。认领操作使用条件 UPDATE 而非
//! 读后写，保证并发的重复投递最多只有一个调用进入处理循环。

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use enroll_shared::error::{EnrollError, Result};
use enroll_shared::events::OrderPayload;
use sqlx::PgPool;

use super::traits::OrderStore;
use crate::models::{Order, OrderStatus};

/// 订单仓储
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ORDER_COLUMNS: &str =
    "id, status, received, email, first_name, last_name, shop_domain, payload, updated_at";

#[async_trait]
impl OrderStore for OrderRepository {
    async fn get(&self, order_id: i64) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn get_or_create(
        &self,
        payload: &OrderPayload,
        shop_domain: &str,
    ) -> Result<(Order, bool)> {
        let raw = serde_json::to_value(payload)
            .map_err(|e| EnrollError::Internal(format!("订单负载序列化失败: {e}")))?;

        // ON CONFLICT DO NOTHING：重复投递落到已有行上，不覆盖任何字段
        let inserted = sqlx::query_as::<_, Order>(&format!(
            r#"
            INSERT INTO orders (id, status, email, first_name, last_name, shop_domain, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(payload.id)
        .bind(OrderStatus::Unprocessed)
        .bind(&payload.customer.email)
        .bind(&payload.customer.first_name)
        .bind(&payload.customer.last_name)
        .bind(shop_domain)
        .bind(&raw)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(order) = inserted {
            return Ok((order, true));
        }

        // 冲突说明记录已存在；订单永不删除，这里必然读得到
        let existing = self
            .get(payload.id)
            .await?
            .ok_or_else(|| EnrollError::NotFound {
                entity: "Order".to_string(),
                id: payload.id.to_string(),
            })?;

        Ok((existing, false))
    }

    async fn try_begin_processing(&self, order_id: i64) -> Result<bool> {
        // 条件 UPDATE 即比较并交换：status 谓词在行锁内求值，
        // 两个并发调用只有一个能匹配到 unprocessed
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = $3
            "#,
        )
        .bind(order_id)
        .bind(OrderStatus::Processing)
        .bind(OrderStatus::Unprocessed)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn finish(&self, order_id: i64, status: OrderStatus) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_error(&self, order_id: i64) -> Result<()> {
        self.finish(order_id, OrderStatus::Error).await
    }

    async fn reclaim_stale(&self, stale_after: Duration, limit: i64) -> Result<Vec<Order>> {
        let cutoff = Utc::now() - chrono::Duration::seconds(stale_after.as_secs() as i64);

        let mut tx = self.pool.begin().await?;

        // FOR UPDATE SKIP LOCKED 保证多实例部署时不会重复回收同一批订单
        let stale = sqlx::query_as::<_, Order>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE status = $1 AND updated_at < $2
            ORDER BY updated_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT $3
            "#
        ))
        .bind(OrderStatus::Processing)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        if stale.is_empty() {
            tx.rollback().await?;
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = stale.iter().map(|o| o.id).collect();

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .bind(OrderStatus::Unprocessed)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(stale)
    }
}
