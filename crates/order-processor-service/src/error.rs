//! 订单处理服务专用错误类型
//!
//! 在共享库 EnrollError 基础上定义本服务特有的错误变体，
//! 使消费端可以精确区分"重复认领/网关失败/未预期故障"等不同情况，
//! 而无需在共享库中为每个服务追加变体。

use enroll_shared::error::EnrollError;

use crate::models::OrderStatus;

/// 订单处理错误
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// 订单状态不是 unprocessed，本次调用未赢得认领。
    /// at-least-once 投递下的正常现象，消费端按无副作用跳过处理。
    #[error("订单 {order_id} 已被认领，当前状态 {status}")]
    AlreadyClaimed { order_id: i64, status: OrderStatus },

    /// 事件指向的订单记录不存在——边界层应先落库再投递，
    /// 出现此错误说明投递顺序被破坏
    #[error("订单不存在: {order_id}")]
    OrderNotFound { order_id: i64 },

    /// 课程标识在 LMS 侧不存在
    #[error("课程不存在: {sku}")]
    UnknownCourse { sku: String },

    /// 网关拒绝本次注册（邮箱非法、报名条件不满足等）
    #[error("注册被拒绝: {reason}")]
    EnrollmentRejected { reason: String },

    /// 网关不可达或持续超时（重试已用尽）
    #[error("选课网关不可用: {0}")]
    GatewayUnavailable(String),

    /// 透传共享库错误，避免在每个 match 分支手动转换
    #[error(transparent)]
    Shared(#[from] EnrollError),
}

impl ProcessorError {
    /// 是否属于单个行项目层面的失败
    ///
    /// 行项目层面的失败只把该行项目标记为 error 并继续处理后续项目；
    /// 其余错误（存储故障等）中止整单并由任务边界做回退处理。
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            Self::UnknownCourse { .. }
                | Self::EnrollmentRejected { .. }
                | Self::GatewayUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_level_classification() {
        assert!(
            ProcessorError::UnknownCourse {
                sku: "course-v1:org+nosuchcourse+run1".to_string()
            }
            .is_item_level()
        );
        assert!(
            ProcessorError::EnrollmentRejected {
                reason: "邮箱格式不合法".to_string()
            }
            .is_item_level()
        );
        assert!(ProcessorError::GatewayUnavailable("连接超时".to_string()).is_item_level());

        assert!(
            !ProcessorError::AlreadyClaimed {
                order_id: 900,
                status: OrderStatus::Processing
            }
            .is_item_level()
        );
        assert!(!ProcessorError::OrderNotFound { order_id: 900 }.is_item_level());
    }

    #[test]
    fn test_error_display() {
        let err = ProcessorError::AlreadyClaimed {
            order_id: 900,
            status: OrderStatus::Processed,
        };
        assert_eq!(err.to_string(), "订单 900 已被认领，当前状态 PROCESSED");

        let err = ProcessorError::UnknownCourse {
            sku: "course-v1:org+nosuchcourse+run1".to_string(),
        };
        assert!(err.to_string().contains("course-v1:org+nosuchcourse+run1"));
    }
}
