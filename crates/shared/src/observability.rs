//! 日志初始化模块
//!
//! 所有服务通过单一入口点配置 tracing 订阅器，保证一致的日志格式。
//! 上下文（订单号、Kafka 位点等）由调用点以结构化字段显式携带，
//! 不依赖任何进程级可变状态。

use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::ObservabilityConfig;

/// 初始化 tracing 订阅器
///
/// 日志级别优先读取 RUST_LOG 环境变量，其次使用配置中的 log_level。
/// `log_format` 为 "json" 时输出结构化日志（供采集系统消费），
/// 否则输出带颜色的人类可读格式。
///
/// 重复调用返回错误（全局订阅器只能设置一次），测试中应忽略该错误。
pub fn init(config: &ObservabilityConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = if config.log_format == "json" {
        fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
