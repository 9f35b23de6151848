//! 实验室管理 API 处理器
//!
//! 实验室 CRUD 和开放时段配置

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use chrono::{DateTime, NaiveTime, Utc};
use tracing::info;
use validator::Validate;

use crate::auth::Claims;
use crate::dto::{
    ApiResponse, CreateLabRequest, LabDto, ReplaceSchedulesRequest, ScheduleWindowDto,
    UpdateLabRequest,
};
use crate::error::{PortalError, Result};
use crate::handlers::require_admin;
use crate::models::LabStatus;
use crate::state::AppState;

/// 带设备数量的实验室查询结果
#[derive(sqlx::FromRow)]
struct LabRow {
    id: i64,
    name: String,
    location: Option<String>,
    capacity: i32,
    status: LabStatus,
    computer_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LabRow {
    fn into_dto(self) -> LabDto {
        LabDto {
            id: self.id,
            name: self.name,
            location: self.location,
            capacity: self.capacity,
            status: self.status,
            computer_count: self.computer_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// 开放时段查询结果行
#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: i64,
    lab_id: i64,
    weekday: i16,
    open_time: NaiveTime,
    close_time: NaiveTime,
}

impl ScheduleRow {
    fn into_dto(self) -> ScheduleWindowDto {
        ScheduleWindowDto {
            id: self.id,
            lab_id: self.lab_id,
            weekday: self.weekday,
            open_time: self.open_time,
            close_time: self.close_time,
        }
    }
}

const LAB_WITH_COUNT: &str = r#"
        SELECT
            l.id, l.name, l.location, l.capacity, l.status, l.created_at, l.updated_at,
            COALESCE(c.count, 0) AS computer_count
        FROM labs l
        LEFT JOIN (
            SELECT lab_id, COUNT(*) AS count FROM computers GROUP BY lab_id
        ) c ON c.lab_id = l.id
"#;

/// 创建实验室（管理员）
///
/// POST /api/portal/labs
pub async fn create_lab(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateLabRequest>,
) -> Result<Json<ApiResponse<LabDto>>> {
    require_admin(&claims)?;
    req.validate()?;

    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM labs WHERE name = $1)")
        .bind(&req.name)
        .fetch_one(&state.pool)
        .await?;
    if exists.0 {
        return Err(PortalError::Validation(format!(
            "实验室名称已存在: {}",
            req.name
        )));
    }

    let row = sqlx::query_as::<_, LabRow>(
        r#"
        INSERT INTO labs (name, location, capacity)
        VALUES ($1, $2, $3)
        RETURNING id, name, location, capacity, status, created_at, updated_at,
                  0::bigint AS computer_count
        "#,
    )
    .bind(&req.name)
    .bind(&req.location)
    .bind(req.capacity.unwrap_or(0))
    .fetch_one(&state.pool)
    .await?;

    info!(lab_id = row.id, name = %row.name, "实验室已创建");

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 获取实验室列表
///
/// GET /api/portal/labs
pub async fn list_labs(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<LabDto>>>> {
    let rows = sqlx::query_as::<_, LabRow>(&format!("{LAB_WITH_COUNT} ORDER BY l.name ASC"))
        .fetch_all(&state.pool)
        .await?;

    let labs: Vec<LabDto> = rows.into_iter().map(LabRow::into_dto).collect();

    Ok(Json(ApiResponse::success(labs)))
}

/// 获取实验室详情
///
/// GET /api/portal/labs/:id
pub async fn get_lab(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<LabDto>>> {
    let row = sqlx::query_as::<_, LabRow>(&format!("{LAB_WITH_COUNT} WHERE l.id = $1"))
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(PortalError::LabNotFound(id))?;

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 更新实验室（管理员）
///
/// PUT /api/portal/labs/:id
pub async fn update_lab(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateLabRequest>,
) -> Result<Json<ApiResponse<LabDto>>> {
    require_admin(&claims)?;
    req.validate()?;

    let updated = sqlx::query(
        r#"
        UPDATE labs
        SET
            name = COALESCE($2, name),
            location = COALESCE($3, location),
            capacity = COALESCE($4, capacity),
            status = COALESCE($5, status),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&req.name)
    .bind(&req.location)
    .bind(req.capacity)
    .bind(req.status)
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(PortalError::LabNotFound(id));
    }

    info!(lab_id = id, "实验室已更新");

    let row = sqlx::query_as::<_, LabRow>(&format!("{LAB_WITH_COUNT} WHERE l.id = $1"))
        .bind(id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 删除实验室（管理员）
///
/// DELETE /api/portal/labs/:id
///
/// 仅允许删除没有设备的实验室
pub async fn delete_lab(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    require_admin(&claims)?;

    let computer_count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM computers WHERE lab_id = $1")
            .bind(id)
            .fetch_one(&state.pool)
            .await?;

    if computer_count.0 > 0 {
        return Err(PortalError::LabHasComputers);
    }

    // lab_schedules 外键设置了 ON DELETE CASCADE
    let result = sqlx::query("DELETE FROM labs WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(PortalError::LabNotFound(id));
    }

    info!(lab_id = id, "实验室已删除");

    Ok(Json(ApiResponse::<()>::success_empty()))
}

/// 获取实验室开放时段
///
/// GET /api/portal/labs/:id/schedules
pub async fn list_schedules(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<ScheduleWindowDto>>>> {
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM labs WHERE id = $1)")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;
    if !exists.0 {
        return Err(PortalError::LabNotFound(id));
    }

    let rows = sqlx::query_as::<_, ScheduleRow>(
        r#"
        SELECT id, lab_id, weekday, open_time, close_time
        FROM lab_schedules
        WHERE lab_id = $1
        ORDER BY weekday ASC, open_time ASC
        "#,
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    let windows: Vec<ScheduleWindowDto> = rows.into_iter().map(ScheduleRow::into_dto).collect();

    Ok(Json(ApiResponse::success(windows)))
}

/// 整组替换实验室开放时段（管理员）
///
/// PUT /api/portal/labs/:id/schedules
///
/// 旧时段在同一事务中删除后写入新时段，避免出现部分更新的中间状态
pub async fn replace_schedules(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<ReplaceSchedulesRequest>,
) -> Result<Json<ApiResponse<Vec<ScheduleWindowDto>>>> {
    require_admin(&claims)?;
    req.validate()?;

    for window in &req.windows {
        if window.open_time >= window.close_time {
            return Err(PortalError::Validation(format!(
                "开放时间必须早于关闭时间: {} >= {}",
                window.open_time, window.close_time
            )));
        }
    }

    let mut tx = state.pool.begin().await?;

    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM labs WHERE id = $1)")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    if !exists.0 {
        return Err(PortalError::LabNotFound(id));
    }

    sqlx::query("DELETE FROM lab_schedules WHERE lab_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let mut windows = Vec::with_capacity(req.windows.len());
    for window in &req.windows {
        let row = sqlx::query_as::<_, ScheduleRow>(
            r#"
            INSERT INTO lab_schedules (lab_id, weekday, open_time, close_time)
            VALUES ($1, $2, $3, $4)
            RETURNING id, lab_id, weekday, open_time, close_time
            "#,
        )
        .bind(id)
        .bind(window.weekday)
        .bind(window.open_time)
        .bind(window.close_time)
        .fetch_one(&mut *tx)
        .await?;
        windows.push(row.into_dto());
    }

    tx.commit().await?;

    info!(lab_id = id, window_count = windows.len(), "实验室开放时段已更新");

    Ok(Json(ApiResponse::success(windows)))
}
