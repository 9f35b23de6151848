//! 统一可观测性模块
//!
//! 提供日志与请求追踪的统一初始化和管理。
//! 服务通过单一入口点配置可观测性，确保一致的日志格式。

pub mod middleware;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;

use crate::config::ObservabilityConfig;

/// 可观测性资源守卫
///
/// 持有日志订阅器的生命周期，保持与初始化入口对称。
pub struct ObservabilityGuard {
    _private: (),
}

/// 初始化可观测性（日志 + 请求追踪）
///
/// 返回的 Guard 应在 main 中持有到进程结束。
pub async fn init(config: &ObservabilityConfig, service_name: &str) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    info!(
        service = service_name,
        log_level = %config.log_level,
        log_format = %config.log_format,
        "Observability initialized"
    );

    Ok(ObservabilityGuard { _private: () })
}
