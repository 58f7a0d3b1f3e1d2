//! 订单处理服务
//!
//! 消费订单接收事件，将每个行项目转化为一次幂等的课程注册调用，
//! 并把订单与行项目记录推进到终态。核心是 `processor` 模块的状态机；
//! `consumer` 是 at-least-once 任务边界，`reaper` 负责回收
//! 处理中途崩溃的僵死订单。

pub mod consumer;
pub mod error;
pub mod gateway;
pub mod models;
pub mod processor;
pub mod publisher;
pub mod reaper;
pub mod repository;

#[cfg(test)]
pub(crate) mod testing;
