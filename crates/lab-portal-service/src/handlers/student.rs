//! 学生管理 API 处理器
//!
//! 学生列表、资料维护、额度重置和额度流水查询

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use tracing::info;
use validator::Validate;

use crate::auth::Claims;
use crate::dto::{
    ApiResponse, LedgerEntryDto, PageResponse, PaginationParams, StudentDto, StudentFilter,
    UpdateStudentRequest,
};
use crate::error::{PortalError, Result};
use crate::handlers::auth::{USER_COLUMNS, UserRow};
use crate::handlers::require_admin;
use crate::models::CreditChangeType;
use crate::state::AppState;

/// 额度流水查询结果行
#[derive(sqlx::FromRow)]
struct LedgerRow {
    id: i64,
    user_id: i64,
    change_type: CreditChangeType,
    delta: i32,
    sitin_id: Option<i64>,
    reservation_id: Option<i64>,
    remark: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl LedgerRow {
    fn into_dto(self) -> LedgerEntryDto {
        LedgerEntryDto {
            id: self.id,
            user_id: self.user_id,
            change_type: self.change_type,
            delta: self.delta,
            sitin_id: self.sitin_id,
            reservation_id: self.reservation_id,
            remark: self.remark,
            created_at: self.created_at,
        }
    }
}

/// 获取学生列表（管理员）
///
/// GET /api/portal/students
///
/// keyword 同时匹配学号、用户名、姓名和专业
pub async fn list_students(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<StudentFilter>,
) -> Result<Json<ApiResponse<PageResponse<StudentDto>>>> {
    require_admin(&claims)?;

    let pattern = filter
        .keyword
        .as_deref()
        .map(|k| format!("%{}%", k.trim()));

    let total: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM users
        WHERE role = 'student'
          AND ($1::text IS NULL
               OR id_number ILIKE $1
               OR username ILIKE $1
               OR first_name ILIKE $1
               OR last_name ILIKE $1
               OR course ILIKE $1)
        "#,
    )
    .bind(&pattern)
    .fetch_one(&state.pool)
    .await?;

    let rows = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM users
        WHERE role = 'student'
          AND ($1::text IS NULL
               OR id_number ILIKE $1
               OR username ILIKE $1
               OR first_name ILIKE $1
               OR last_name ILIKE $1
               OR course ILIKE $1)
        ORDER BY id_number ASC
        LIMIT $2 OFFSET $3
        "#,
    ))
    .bind(&pattern)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.pool)
    .await?;

    let items: Vec<StudentDto> = rows.into_iter().map(UserRow::into_dto).collect();

    Ok(Json(ApiResponse::success(PageResponse::new(
        items,
        total.0,
        pagination.page,
        pagination.limit(),
    ))))
}

/// 获取学生详情
///
/// GET /api/portal/students/:id
///
/// 学生只能查看自己，管理员可查看任意学生
pub async fn get_student(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<StudentDto>>> {
    if !claims.is_admin() && claims.user_id()? != id {
        return Err(PortalError::Forbidden("只能查看本人资料".to_string()));
    }

    let user = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(PortalError::UserNotFound(id))?;

    Ok(Json(ApiResponse::success(user.into_dto())))
}

/// 更新学生资料
///
/// PUT /api/portal/students/:id
///
/// 学生只能修改自己的资料，管理员可修改任意学生
pub async fn update_student(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStudentRequest>,
) -> Result<Json<ApiResponse<StudentDto>>> {
    req.validate()?;

    if !claims.is_admin() && claims.user_id()? != id {
        return Err(PortalError::Forbidden("只能修改本人资料".to_string()));
    }

    let user = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        UPDATE users
        SET
            first_name = COALESCE($2, first_name),
            middle_name = COALESCE($3, middle_name),
            last_name = COALESCE($4, last_name),
            email = COALESCE($5, email),
            course = COALESCE($6, course),
            year_level = COALESCE($7, year_level),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(&req.first_name)
    .bind(&req.middle_name)
    .bind(&req.last_name)
    .bind(&req.email)
    .bind(&req.course)
    .bind(req.year_level)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(PortalError::UserNotFound(id))?;

    info!(user_id = id, "学生资料已更新");

    Ok(Json(ApiResponse::success(user.into_dto())))
}

/// 重置学生上机额度（管理员）
///
/// POST /api/portal/students/:id/reset-credits
///
/// 将额度恢复为配置中的默认值，差额写入流水
pub async fn reset_credits(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<StudentDto>>> {
    require_admin(&claims)?;

    let default_credits = state.portal.default_credits;

    let mut tx = state.pool.begin().await?;

    let current: (i32,) =
        sqlx::query_as("SELECT session_credits FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(PortalError::UserNotFound(id))?;

    let delta = default_credits - current.0;

    let user = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        UPDATE users
        SET session_credits = $2, updated_at = NOW()
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(default_credits)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO session_ledger (user_id, change_type, delta, remark)
        VALUES ($1, 'reset', $2, $3)
        "#,
    )
    .bind(id)
    .bind(delta)
    .bind(format!("管理员重置额度为 {}", default_credits))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(user_id = id, delta, "学生额度已重置");

    Ok(Json(ApiResponse::success(user.into_dto())))
}

/// 删除学生（管理员）
///
/// DELETE /api/portal/students/:id
///
/// 有历史上机或预约记录的学生改为停用，不做物理删除
pub async fn delete_student(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    require_admin(&claims)?;

    let has_history: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS(SELECT 1 FROM sitins WHERE user_id = $1)
            OR EXISTS(SELECT 1 FROM reservations WHERE user_id = $1)
        "#,
    )
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    if has_history.0 {
        let result = sqlx::query(
            "UPDATE users SET status = 'disabled', updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&state.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PortalError::UserNotFound(id));
        }

        info!(user_id = id, "学生有历史记录，已改为停用");
    } else {
        let mut tx = state.pool.begin().await?;

        sqlx::query("DELETE FROM session_ledger WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PortalError::UserNotFound(id));
        }

        tx.commit().await?;

        info!(user_id = id, "学生已删除");
    }

    Ok(Json(ApiResponse::<()>::success_empty()))
}

/// 查询学生额度流水
///
/// GET /api/portal/students/:id/ledger
///
/// 学生只能查看自己的流水
pub async fn list_ledger(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<LedgerEntryDto>>>> {
    if !claims.is_admin() && claims.user_id()? != id {
        return Err(PortalError::Forbidden("只能查看本人流水".to_string()));
    }

    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;
    if !exists.0 {
        return Err(PortalError::UserNotFound(id));
    }

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM session_ledger WHERE user_id = $1")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;

    let rows = sqlx::query_as::<_, LedgerRow>(
        r#"
        SELECT id, user_id, change_type, delta, sitin_id, reservation_id, remark, created_at
        FROM session_ledger
        WHERE user_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.pool)
    .await?;

    let items: Vec<LedgerEntryDto> = rows.into_iter().map(LedgerRow::into_dto).collect();

    Ok(Json(ApiResponse::success(PageResponse::new(
        items,
        total.0,
        pagination.page,
        pagination.limit(),
    ))))
}
