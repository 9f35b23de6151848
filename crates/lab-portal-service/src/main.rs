//! 实验室上机/预约管理服务入口
//!
//! 提供学生门户和管理后台共用的 REST API。

use axum::{Json, Router, http::HeaderValue, middleware, routing::get};
use lab_portal_service::{
    auth::JwtConfig,
    middleware::auth_middleware,
    routes,
    state::AppState,
    worker::ReservationExpireWorker,
};
use labsit_shared::{
    config::AppConfig,
    database::Database,
    observability::{self, middleware as obs_middleware},
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 统一加载配置：config/default.toml + 环境配置 + LABSIT_ 前缀环境变量
    let config = AppConfig::load("lab-portal-service").unwrap_or_default();

    let _guard = observability::init(&config.observability, &config.service_name).await?;

    info!("Starting lab-portal-service on {}", config.server_addr());

    let db = Database::connect(&config.database).await?;
    db.run_migrations().await?;

    // JWT 密钥配置：生产环境必须通过环境变量注入，开发环境使用默认值
    let jwt_secret = std::env::var("LABSIT_JWT_SECRET").unwrap_or_else(|_| {
        let default_secret = "lab-portal-secret-key-change-in-production".to_string();
        if config.is_production() {
            panic!("LABSIT_JWT_SECRET must be set in production environment");
        }
        warn!("Using default JWT secret - set LABSIT_JWT_SECRET for production");
        default_secret
    });

    let jwt_expires = std::env::var("LABSIT_JWT_EXPIRES_SECS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(86400);

    let jwt_config = JwtConfig {
        secret: jwt_secret,
        expires_in_secs: jwt_expires,
        issuer: "lab-portal-service".to_string(),
    };

    let state = AppState::new(db.pool().clone(), jwt_config, config.portal.clone());

    // CORS 配置：通过 LABSIT_CORS_ORIGINS 环境变量控制允许的来源
    let allowed_origins = std::env::var("LABSIT_CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string());

    let cors = if allowed_origins == "*" {
        if config.is_production() {
            warn!("LABSIT_CORS_ORIGINS=\"*\" 在生产环境中不安全，请设置为具体域名");
        }
        info!("CORS allowed_origins: * (all origins)");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        info!("CORS allowed_origins: {}", allowed_origins);
        let origins: Vec<_> = allowed_origins
            .split(',')
            .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // 启动预约完结后台 Worker
    // 在 state 被 move 到 Router 之前克隆连接池
    let expire_worker_pool = db.pool().clone();
    let expire_poll_interval = config.portal.expire_poll_interval_seconds;
    tokio::spawn(async move {
        let worker = ReservationExpireWorker::new(expire_worker_pool, expire_poll_interval, 1000);
        worker.run().await;
    });

    let app = Router::new()
        .nest("/api/portal", routes::api_routes())
        .route("/health", get(health_check))
        .route(
            "/ready",
            get({
                let db_for_ready = db;
                move || readiness_check(db_for_ready.clone())
            }),
        )
        .layer(cors)
        // 认证中间件：验证 JWT Token
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        // 可观测性中间件：请求追踪和请求 ID 透传
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 优雅关闭：收到 SIGTERM（K8s 停止 Pod）或 Ctrl+C 时，
    // 停止接收新连接并等待已有请求处理完毕
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");

    Ok(())
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("注册 Ctrl+C 处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("注册 SIGTERM 处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

/// 存活探针：服务进程正常即返回 ok
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "lab-portal-service"
    }))
}

/// 就绪探针：检查数据库连接是否可用
///
/// K8s 就绪探针失败时会将 Pod 从 Service 端点移除，
/// 避免将流量路由到无法正常处理请求的实例。
async fn readiness_check(db: Database) -> Json<serde_json::Value> {
    let db_ok = db.health_check().await.is_ok();

    Json(serde_json::json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "service": "lab-portal-service",
        "checks": {
            "database": if db_ok { "ok" } else { "fail" }
        }
    }))
}
