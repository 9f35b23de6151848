//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use labsit_shared::config::PortalConfig;
use sqlx::PgPool;

use crate::auth::{JwtConfig, JwtManager};

/// Axum 应用共享状态
///
/// 包含数据库连接池、JWT 管理器和业务配置，在 handler 间克隆共享
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL 连接池
    pub pool: PgPool,
    /// JWT 管理器
    pub jwt_manager: JwtManager,
    /// 门户业务配置（默认额度、积分兑换规则）
    pub portal: PortalConfig,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(pool: PgPool, jwt_config: JwtConfig, portal: PortalConfig) -> Self {
        Self {
            pool,
            jwt_manager: JwtManager::new(jwt_config),
            portal,
        }
    }
}
