//! Webhook 接收服务
//!
//! 系统的 HTTP 边界：验证店铺 order/create 事件的签名与来源域名，
//! 幂等落库订单记录，并在订单尚未被认领时把处理事件投递到队列。
//! 注册结果对店铺端不可见——调用方只会看到 400/403/405/200。

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
