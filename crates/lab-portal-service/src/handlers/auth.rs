//! 认证相关的 HTTP 处理器
//!
//! 提供学生注册、登录和获取当前用户的 API

use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::info;
use validator::Validate;

use crate::auth::{Claims, hash_password, verify_password};
use crate::dto::{ApiResponse, RegisterRequest, StudentDto};
use crate::error::{PortalError, Result};
use crate::models::{UserRole, UserStatus};
use crate::state::AppState;

// ============================================
// 请求/响应 DTO
// ============================================

/// 登录请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// 学号或用户名
    #[validate(length(min = 1, max = 50, message = "账号长度必须在 1-50 之间"))]
    pub account: String,
    #[validate(length(min = 1, max = 100, message = "密码长度必须在 1-100 之间"))]
    pub password: String,
}

/// 登录响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user: StudentDto,
    pub expires_at: i64,
}

// ============================================
// 数据库模型
// ============================================

/// 数据库用户记录
#[derive(Debug, FromRow)]
pub(crate) struct UserRow {
    pub id: i64,
    pub id_number: String,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub email: Option<String>,
    pub course: Option<String>,
    pub year_level: Option<i16>,
    pub role: UserRole,
    pub session_credits: i32,
    pub points: i32,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub(crate) fn into_dto(self) -> StudentDto {
        StudentDto {
            id: self.id,
            id_number: self.id_number,
            username: self.username,
            first_name: self.first_name,
            middle_name: self.middle_name,
            last_name: self.last_name,
            email: self.email,
            course: self.course,
            year_level: self.year_level,
            role: self.role,
            session_credits: self.session_credits,
            points: self.points,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

pub(crate) const USER_COLUMNS: &str = "id, id_number, username, password_hash, first_name, \
     middle_name, last_name, email, course, year_level, role, session_credits, points, \
     status, created_at, updated_at";

// ============================================
// API 处理器
// ============================================

/// 学生注册
///
/// POST /api/portal/auth/register
///
/// 新账号获得配置中的默认上机额度
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<StudentDto>>> {
    req.validate()?;

    // 学号和用户名都要求唯一
    let exists: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id_number = $1 OR username = $2)",
    )
    .bind(&req.id_number)
    .bind(&req.username)
    .fetch_one(&state.pool)
    .await?;

    if exists.0 {
        return Err(PortalError::DuplicateUser(req.id_number));
    }

    let password_hash = hash_password(&req.password)?;

    let row = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        INSERT INTO users (id_number, username, password_hash, first_name, middle_name,
                           last_name, email, course, year_level, role, session_credits)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'student', $10)
        RETURNING {USER_COLUMNS}
        "#,
    ))
    .bind(&req.id_number)
    .bind(&req.username)
    .bind(&password_hash)
    .bind(&req.first_name)
    .bind(&req.middle_name)
    .bind(&req.last_name)
    .bind(&req.email)
    .bind(&req.course)
    .bind(req.year_level)
    .bind(state.portal.default_credits)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| map_register_insert_error(e, &req.id_number))?;

    info!(user_id = row.id, id_number = %row.id_number, "学生注册成功");

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 并发注册可能在存在性检查之后命中唯一约束，转成 409 而非 500
pub fn map_register_insert_error(e: sqlx::Error, id_number: &str) -> PortalError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            PortalError::DuplicateUser(id_number.to_string())
        }
        other => PortalError::from(other),
    }
}

/// 用户登录
///
/// POST /api/portal/auth/login
///
/// account 字段同时支持学号和用户名
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>> {
    req.validate()?;

    let user = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM users
        WHERE id_number = $1 OR username = $1
        "#,
    ))
    .bind(&req.account)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(PortalError::InvalidCredentials)?;

    if user.status == UserStatus::Disabled {
        return Err(PortalError::UserDisabled);
    }

    let password_valid = verify_password(&req.password, &user.password_hash)?;
    if !password_valid {
        return Err(PortalError::InvalidCredentials);
    }

    let (token, expires_at) =
        state
            .jwt_manager
            .generate_token(user.id, &user.username, &user.id_number, user.role)?;

    info!(user_id = user.id, id_number = %user.id_number, "用户登录成功");

    Ok(Json(ApiResponse::success(LoginResponse {
        token,
        user: user.into_dto(),
        expires_at,
    })))
}

/// 用户登出
///
/// POST /api/portal/auth/logout
pub async fn logout() -> Result<Json<ApiResponse<()>>> {
    // JWT 是无状态的，登出只需前端清除 Token
    Ok(Json(ApiResponse::success(())))
}

/// 获取当前用户信息
///
/// GET /api/portal/auth/me
pub async fn get_current_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<StudentDto>>> {
    let user_id = claims.user_id()?;

    let user = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1",
    ))
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(PortalError::UserNotFound(user_id))?;

    Ok(Json(ApiResponse::success(user.into_dto())))
}
