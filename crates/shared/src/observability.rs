//! 统一可观测性模块
//!
//! 提供 logging 与 metrics 的统一初始化。所有入口通过单一函数配置可观测性，
//! 确保一致的日志格式与指标命名。

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ObservabilityConfig;

/// 初始化可观测性
///
/// - 安装 tracing-subscriber（日志级别取自配置，可被 RUST_LOG 覆盖）
/// - metrics_enabled 时在 metrics_port 上暴露 Prometheus 指标端点
pub fn init(service_name: &str, config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    if config.metrics_enabled {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!(port = config.metrics_port, "Prometheus metrics exporter started");
    }

    info!(
        service_name = service_name,
        log_level = %config.log_level,
        log_format = %config.log_format,
        "Observability initialized"
    );

    Ok(())
}
