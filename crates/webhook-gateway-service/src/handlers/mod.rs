//! HTTP 处理器

pub mod order;
