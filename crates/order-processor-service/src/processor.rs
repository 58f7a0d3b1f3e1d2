//! 订单处理状态机
//!
//! 接收一个已落库订单的负载，逐个行项目驱动注册副作用，并从各行项目
//! 的结果聚合出订单终态。整个系统的不变量都集中在这里：
//!
//! - 认领是条件更新（unprocessed -> processing），重复投递最多一个赢；
//! - 每个行项目的状态转换即时落库，处理中途崩溃留下可恢复的部分记录；
//! - processed 行项目永不再调用网关；error 行项目在本轮不自动重试；
//! - 单个行项目的失败不中止整单循环，只参与聚合终态。

use std::sync::Arc;
use std::time::Instant;

use enroll_shared::events::OrderPayload;
use enroll_shared::masking::mask_email;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::ProcessorError;
use crate::gateway::EnrollmentGateway;
use crate::models::{ItemStatus, OrderStatus};
use crate::repository::{OrderItemStore, OrderStore};

/// 一次订单处理的聚合结果
///
/// 显式结果值贯穿处理调用与任务边界的失败处理，
/// 不依赖任何跨调用的可变字段。
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub order_id: i64,
    /// 本轮处理后的订单终态
    pub status: OrderStatus,
    /// 本轮新完成注册的行项目数
    pub items_enrolled: usize,
    /// 本轮失败（含畸形与既往 error）的行项目数
    pub items_failed: usize,
    /// 处理耗时（毫秒）
    pub processing_time_ms: i64,
    /// 行项目层面的错误信息，不中断整体流程，只参与聚合终态
    pub errors: Vec<String>,
}

/// 订单处理器
///
/// 依赖以 trait 对象注入：两个仓储和选课网关，
/// 测试时替换为内存实现与 mock。
pub struct OrderProcessor {
    orders: Arc<dyn OrderStore>,
    items: Arc<dyn OrderItemStore>,
    gateway: Arc<dyn EnrollmentGateway>,
}

impl OrderProcessor {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        items: Arc<dyn OrderItemStore>,
        gateway: Arc<dyn EnrollmentGateway>,
    ) -> Self {
        Self {
            orders,
            items,
            gateway,
        }
    }

    /// 处理一个订单
    ///
    /// 前置条件：订单记录已由边界层幂等创建。
    ///
    /// 认领失败返回 `AlreadyClaimed`（无任何副作用）；行项目层面的
    /// 失败被就地吸收进聚合终态；存储故障向上传播，由任务边界
    /// 将订单回退标记为 error。
    #[instrument(skip(self, payload))]
    pub async fn process_order(
        &self,
        order_id: i64,
        payload: &OrderPayload,
    ) -> Result<ProcessOutcome, ProcessorError> {
        let start = Instant::now();

        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(ProcessorError::OrderNotFound { order_id })?;

        // 原子认领：两个并发投递同时观察到 unprocessed 时，
        // 条件更新保证只有一个能走进处理循环
        if !self.orders.try_begin_processing(order_id).await? {
            return Err(ProcessorError::AlreadyClaimed {
                order_id,
                status: order.status,
            });
        }

        info!(
            order_id,
            line_items = payload.line_items.len(),
            "开始处理订单"
        );

        let mut errors: Vec<String> = Vec::new();
        let mut items_enrolled = 0usize;
        let mut items_failed = 0usize;

        for (index, line_item) in payload.line_items.iter().enumerate() {
            // 提取失败（缺 sku 或缺 email 属性）：身份无法构成，
            // 不创建行项目记录，记一笔订单级错误后继续
            let params = match line_item.enrollment_params() {
                Ok(params) => params,
                Err(e) => {
                    warn!(order_id, index, error = %e, "行项目畸形，跳过");
                    errors.push(format!("行项目 #{index}: {e}"));
                    items_failed += 1;
                    continue;
                }
            };

            let item = self
                .items
                .get_or_create(order_id, params.sku, params.email)
                .await?;

            match item.status {
                // 既往已注册成功：幂等跳过，不贡献错误
                ItemStatus::Processed => {
                    info!(
                        order_id,
                        sku = params.sku,
                        email = %mask_email(params.email),
                        "行项目已注册，跳过"
                    );
                }
                // 既往失败：本轮不自动重试，只把订单标记为出错
                ItemStatus::Error => {
                    warn!(
                        order_id,
                        sku = params.sku,
                        email = %mask_email(params.email),
                        "行项目处于失败状态，等待显式重置"
                    );
                    errors.push(format!(
                        "行项目 #{index}: 既往注册失败未重置 (sku={})",
                        params.sku
                    ));
                    items_failed += 1;
                }
                ItemStatus::Unprocessed => {
                    match self.gateway.enroll(params.sku, params.email).await {
                        Ok(()) => {
                            // 状态即时落库：中途崩溃不会回滚已成功的注册
                            self.items.set_status(item.id, ItemStatus::Processed).await?;
                            items_enrolled += 1;
                            info!(
                                order_id,
                                sku = params.sku,
                                email = %mask_email(params.email),
                                "行项目注册成功"
                            );
                        }
                        Err(e) if e.is_item_level() => {
                            self.items.set_status(item.id, ItemStatus::Error).await?;
                            warn!(
                                order_id,
                                sku = params.sku,
                                email = %mask_email(params.email),
                                error = %e,
                                "行项目注册失败，继续处理后续项目"
                            );
                            errors.push(format!("行项目 #{index}: {e}"));
                            items_failed += 1;
                        }
                        // 行项目层面之外的故障不在循环内吸收，交给任务边界兜底
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        let final_status = if errors.is_empty() {
            OrderStatus::Processed
        } else {
            OrderStatus::Error
        };
        self.orders.finish(order_id, final_status).await?;

        let outcome = ProcessOutcome {
            order_id,
            status: final_status,
            items_enrolled,
            items_failed,
            processing_time_ms: start.elapsed().as_millis() as i64,
            errors,
        };

        info!(
            order_id,
            status = %outcome.status,
            items_enrolled = outcome.items_enrolled,
            items_failed = outcome.items_failed,
            processing_time_ms = outcome.processing_time_ms,
            "订单处理完成"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use enroll_shared::events::{Customer, LineItem, LineItemProperty, OrderPayload};
    use mockall::predicate::eq;

    use super::*;
    use crate::gateway::MockEnrollmentGateway;
    use crate::testing::{MemoryItemStore, MemoryOrderStore};

    fn line_item(sku: &str, email: &str) -> LineItem {
        LineItem {
            sku: Some(sku.to_string()),
            properties: vec![LineItemProperty {
                name: "email".to_string(),
                value: email.to_string(),
            }],
        }
    }

    fn payload(id: i64, items: Vec<LineItem>) -> OrderPayload {
        OrderPayload {
            id,
            customer: Customer {
                email: "buyer@example.com".to_string(),
                first_name: "Jane".to_string(),
                last_name: "Doe".to_string(),
            },
            line_items: items,
        }
    }

    /// 构造处理器及其内存依赖；订单以 unprocessed 状态预先落库
    async fn setup(
        payload: &OrderPayload,
        gateway: MockEnrollmentGateway,
    ) -> (OrderProcessor, Arc<MemoryOrderStore>, Arc<MemoryItemStore>) {
        let orders = Arc::new(MemoryOrderStore::new());
        let items = Arc::new(MemoryItemStore::new());
        orders
            .get_or_create(payload, "example.myshopify.com")
            .await
            .unwrap();

        let processor = OrderProcessor::new(orders.clone(), items.clone(), Arc::new(gateway));
        (processor, orders, items)
    }

    /// 全部行项目成功 => 订单 processed，所有行项目 processed
    #[tokio::test]
    async fn test_all_items_succeed() {
        let payload = payload(
            900,
            vec![
                line_item("course-v1:org+a+run1", "x@example.com"),
                line_item("course-v1:org+b+run1", "y@example.com"),
            ],
        );

        let mut gateway = MockEnrollmentGateway::new();
        gateway.expect_enroll().times(2).returning(|_, _| Ok(()));

        let (processor, orders, items) = setup(&payload, gateway).await;
        let outcome = processor.process_order(900, &payload).await.unwrap();

        assert_eq!(outcome.status, OrderStatus::Processed);
        assert_eq!(outcome.items_enrolled, 2);
        assert_eq!(outcome.items_failed, 0);
        assert!(outcome.errors.is_empty());

        assert_eq!(orders.status_of(900).await, Some(OrderStatus::Processed));
        let stored = items.list_for_order(900).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|i| i.status == ItemStatus::Processed));
    }

    /// 具体场景：A 成功、B 失败 => 订单 error，A processed，B error
    #[tokio::test]
    async fn test_single_gateway_failure_yields_mixed_statuses() {
        let payload = payload(
            900,
            vec![
                line_item("A", "x@example.com"),
                line_item("B", "y@example.com"),
            ],
        );

        let mut gateway = MockEnrollmentGateway::new();
        gateway
            .expect_enroll()
            .with(eq("A"), eq("x@example.com"))
            .times(1)
            .returning(|_, _| Ok(()));
        gateway
            .expect_enroll()
            .with(eq("B"), eq("y@example.com"))
            .times(1)
            .returning(|sku, _| {
                Err(ProcessorError::UnknownCourse {
                    sku: sku.to_string(),
                })
            });

        let (processor, orders, items) = setup(&payload, gateway).await;
        let outcome = processor.process_order(900, &payload).await.unwrap();

        assert_eq!(outcome.status, OrderStatus::Error);
        assert_eq!(outcome.items_enrolled, 1);
        assert_eq!(outcome.items_failed, 1);
        assert_eq!(outcome.errors.len(), 1);

        assert_eq!(orders.status_of(900).await, Some(OrderStatus::Error));
        assert_eq!(
            items.status_of(900, "A", "x@example.com").await,
            Some(ItemStatus::Processed)
        );
        assert_eq!(
            items.status_of(900, "B", "y@example.com").await,
            Some(ItemStatus::Error)
        );
    }

    /// 畸形行项目：订单 error，有效项目照常注册，畸形项目不产生记录
    #[tokio::test]
    async fn test_malformed_item_creates_no_record() {
        let malformed = LineItem {
            sku: None,
            properties: vec![LineItemProperty {
                name: "email".to_string(),
                value: "z@example.com".to_string(),
            }],
        };
        let payload = payload(901, vec![line_item("A", "x@example.com"), malformed]);

        let mut gateway = MockEnrollmentGateway::new();
        gateway.expect_enroll().times(1).returning(|_, _| Ok(()));

        let (processor, orders, items) = setup(&payload, gateway).await;
        let outcome = processor.process_order(901, &payload).await.unwrap();

        assert_eq!(outcome.status, OrderStatus::Error);
        assert_eq!(outcome.items_enrolled, 1);
        assert_eq!(outcome.items_failed, 1);
        assert_eq!(orders.status_of(901).await, Some(OrderStatus::Error));

        // 身份构成失败的行项目没有落库记录
        let stored = items.list_for_order(901).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].sku, "A");
    }

    /// 重复投递：订单不处于 unprocessed 时直接跳过，不触碰网关
    #[tokio::test]
    async fn test_duplicate_invocation_aborts_without_side_effects() {
        let payload = payload(902, vec![line_item("A", "x@example.com")]);

        // 第一轮正常处理完毕
        let mut gateway = MockEnrollmentGateway::new();
        gateway.expect_enroll().times(1).returning(|_, _| Ok(()));
        let (processor, orders, items) = setup(&payload, gateway).await;
        processor.process_order(902, &payload).await.unwrap();
        assert_eq!(orders.status_of(902).await, Some(OrderStatus::Processed));

        // 第二轮（重复投递）：网关 mock 不允许任何调用
        let gateway = MockEnrollmentGateway::new();
        let processor2 = OrderProcessor::new(orders.clone(), items.clone(), Arc::new(gateway));

        let result = processor2.process_order(902, &payload).await;
        match result {
            Err(ProcessorError::AlreadyClaimed { order_id, status }) => {
                assert_eq!(order_id, 902);
                assert_eq!(status, OrderStatus::Processed);
            }
            other => panic!("期望 AlreadyClaimed，实际: {:?}", other),
        }

        // 已处理的行项目不被改动
        assert_eq!(
            items.status_of(902, "A", "x@example.com").await,
            Some(ItemStatus::Processed)
        );
    }

    /// 重投的 error 订单：error 行项目不自动重试，processed 行项目静默跳过
    #[tokio::test]
    async fn test_redriven_order_skips_error_items() {
        let payload = payload(
            903,
            vec![
                line_item("A", "x@example.com"),
                line_item("B", "y@example.com"),
            ],
        );

        // 第一轮：A 成功、B 失败
        let mut gateway = MockEnrollmentGateway::new();
        gateway
            .expect_enroll()
            .with(eq("A"), eq("x@example.com"))
            .times(1)
            .returning(|_, _| Ok(()));
        gateway
            .expect_enroll()
            .with(eq("B"), eq("y@example.com"))
            .times(1)
            .returning(|_, _| Err(ProcessorError::GatewayUnavailable("超时".to_string())));
        let (processor, orders, items) = setup(&payload, gateway).await;
        processor.process_order(903, &payload).await.unwrap();

        // 显式重投：状态重置回 unprocessed 后从头处理
        orders.reset_status(903, OrderStatus::Unprocessed).await;

        // 第二轮：网关不允许任何调用——A 已 processed，B 停在 error
        let gateway = MockEnrollmentGateway::new();
        let processor2 = OrderProcessor::new(orders.clone(), items.clone(), Arc::new(gateway));
        let outcome = processor2.process_order(903, &payload).await.unwrap();

        // B 仍处于 error，订单聚合终态依旧 error
        assert_eq!(outcome.status, OrderStatus::Error);
        assert_eq!(outcome.items_enrolled, 0);
        assert_eq!(outcome.items_failed, 1);
        assert_eq!(
            items.status_of(903, "B", "y@example.com").await,
            Some(ItemStatus::Error)
        );
    }

    /// 同一负载中重复的 (sku, email) 对表示同一注册意图，只注册一次
    #[tokio::test]
    async fn test_duplicate_identity_in_payload_enrolls_once() {
        let payload = payload(
            904,
            vec![
                line_item("A", "x@example.com"),
                line_item("A", "x@example.com"),
            ],
        );

        let mut gateway = MockEnrollmentGateway::new();
        gateway.expect_enroll().times(1).returning(|_, _| Ok(()));

        let (processor, _orders, items) = setup(&payload, gateway).await;
        let outcome = processor.process_order(904, &payload).await.unwrap();

        assert_eq!(outcome.status, OrderStatus::Processed);
        assert_eq!(outcome.items_enrolled, 1);
        assert_eq!(items.list_for_order(904).await.unwrap().len(), 1);
    }

    /// 没有行项目的订单直接 processed
    #[tokio::test]
    async fn test_empty_order_processes_cleanly() {
        let payload = payload(905, vec![]);

        let gateway = MockEnrollmentGateway::new();
        let (processor, orders, _items) = setup(&payload, gateway).await;
        let outcome = processor.process_order(905, &payload).await.unwrap();

        assert_eq!(outcome.status, OrderStatus::Processed);
        assert_eq!(outcome.items_enrolled, 0);
        assert_eq!(orders.status_of(905).await, Some(OrderStatus::Processed));
    }

    /// 事件指向的订单未落库：前置条件被破坏，错误向上传播
    #[tokio::test]
    async fn test_missing_order_escalates() {
        let payload = payload(906, vec![]);

        let orders = Arc::new(MemoryOrderStore::new());
        let items = Arc::new(MemoryItemStore::new());
        let processor =
            OrderProcessor::new(orders, items, Arc::new(MockEnrollmentGateway::new()));

        let result = processor.process_order(906, &payload).await;
        assert!(matches!(
            result,
            Err(ProcessorError::OrderNotFound { order_id: 906 })
        ));
    }
}
