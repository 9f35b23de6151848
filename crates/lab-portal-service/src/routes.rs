//! 路由配置模块
//!
//! 定义所有 REST API 端点的路由映射

use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};

use crate::{handlers, state::AppState};

/// 构建认证相关的路由（登录与注册为公开路由）
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::get_current_user))
}

/// 构建学生管理路由
fn student_routes() -> Router<AppState> {
    Router::new()
        .route("/students", get(handlers::student::list_students))
        .route("/students/{id}", get(handlers::student::get_student))
        .route("/students/{id}", put(handlers::student::update_student))
        .route("/students/{id}", delete(handlers::student::delete_student))
        .route(
            "/students/{id}/reset-credits",
            post(handlers::student::reset_credits),
        )
        .route("/students/{id}/ledger", get(handlers::student::list_ledger))
}

/// 构建实验室与设备管理路由
fn lab_routes() -> Router<AppState> {
    Router::new()
        // 实验室管理
        .route("/labs", post(handlers::lab::create_lab))
        .route("/labs", get(handlers::lab::list_labs))
        .route("/labs/{id}", get(handlers::lab::get_lab))
        .route("/labs/{id}", put(handlers::lab::update_lab))
        .route("/labs/{id}", delete(handlers::lab::delete_lab))
        .route("/labs/{id}/schedules", get(handlers::lab::list_schedules))
        .route("/labs/{id}/schedules", put(handlers::lab::replace_schedules))
        .route(
            "/labs/{id}/computers",
            get(handlers::computer::list_lab_computers),
        )
        // 设备管理
        .route("/computers", post(handlers::computer::create_computer))
        .route("/computers", get(handlers::computer::list_computers))
        .route("/computers/{id}", get(handlers::computer::get_computer))
        .route("/computers/{id}", put(handlers::computer::update_computer))
        .route(
            "/computers/{id}",
            delete(handlers::computer::delete_computer),
        )
        .route(
            "/computers/{id}/status",
            patch(handlers::computer::update_computer_status),
        )
}

/// 构建上机记录路由
fn sitin_routes() -> Router<AppState> {
    Router::new()
        .route("/sitins", post(handlers::sitin::create_sitin))
        .route("/sitins", get(handlers::sitin::list_sitins))
        .route("/sitins/current", get(handlers::sitin::list_current_sitins))
        .route(
            "/sitins/current/{user_id}",
            get(handlers::sitin::get_current_sitin),
        )
        .route("/sitins/{id}", get(handlers::sitin::get_sitin))
        .route("/sitins/{id}/logout", post(handlers::sitin::logout_sitin))
        .route("/sitins/{id}/reward", post(handlers::sitin::reward_sitin))
}

/// 构建预约管理路由
fn reservation_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/reservations",
            post(handlers::reservation::create_reservation),
        )
        .route(
            "/reservations",
            get(handlers::reservation::list_reservations),
        )
        .route(
            "/reservations/{id}",
            get(handlers::reservation::get_reservation),
        )
        .route(
            "/reservations/{id}/approve",
            post(handlers::reservation::approve_reservation),
        )
        .route(
            "/reservations/{id}/reject",
            post(handlers::reservation::reject_reservation),
        )
        .route(
            "/reservations/{id}/cancel",
            post(handlers::reservation::cancel_reservation),
        )
}

/// 构建公告、反馈和资源路由
fn content_routes() -> Router<AppState> {
    Router::new()
        // 公告
        .route(
            "/announcements",
            post(handlers::announcement::create_announcement),
        )
        .route(
            "/announcements",
            get(handlers::announcement::list_announcements),
        )
        .route(
            "/announcements/{id}",
            get(handlers::announcement::get_announcement),
        )
        .route(
            "/announcements/{id}",
            put(handlers::announcement::update_announcement),
        )
        .route(
            "/announcements/{id}",
            delete(handlers::announcement::delete_announcement),
        )
        // 反馈
        .route("/feedback", post(handlers::feedback::create_feedback))
        .route("/feedback", get(handlers::feedback::list_feedback))
        // 学习资源
        .route("/resources", post(handlers::resource::create_resource))
        .route("/resources", get(handlers::resource::list_resources))
        .route("/resources/{id}", get(handlers::resource::get_resource))
        .route("/resources/{id}", put(handlers::resource::update_resource))
        .route(
            "/resources/{id}",
            delete(handlers::resource::delete_resource),
        )
}

/// 构建统计报表路由
fn stats_routes() -> Router<AppState> {
    Router::new()
        .route("/stats/overview", get(handlers::stats::get_overview))
        .route("/stats/leaderboard", get(handlers::stats::get_leaderboard))
        .route(
            "/stats/purpose-distribution",
            get(handlers::stats::get_purpose_distribution),
        )
        .route(
            "/stats/daily-sitins",
            get(handlers::stats::get_daily_sitins),
        )
}

/// 组合全部 API 路由
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(auth_routes())
        .merge(student_routes())
        .merge(lab_routes())
        .merge(sitin_routes())
        .merge(reservation_routes())
        .merge(content_routes())
        .merge(stats_routes())
}
