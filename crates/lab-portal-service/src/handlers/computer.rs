//! 设备管理 API 处理器
//!
//! 实验室设备的 CRUD 和状态维护

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::auth::Claims;
use crate::dto::{
    ApiResponse, ComputerDto, CreateComputerRequest, UpdateComputerRequest,
    UpdateComputerStatusRequest,
};
use crate::error::{PortalError, Result};
use crate::handlers::require_admin;
use crate::models::ComputerStatus;
use crate::state::AppState;

/// 设备列表查询过滤
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputerFilter {
    pub lab_id: Option<i64>,
    pub status: Option<ComputerStatus>,
}

/// 带实验室名称的设备查询结果
#[derive(sqlx::FromRow)]
struct ComputerRow {
    id: i64,
    lab_id: i64,
    lab_name: String,
    label: String,
    status: ComputerStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ComputerRow {
    fn into_dto(self) -> ComputerDto {
        ComputerDto {
            id: self.id,
            lab_id: self.lab_id,
            lab_name: self.lab_name,
            label: self.label,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const COMPUTER_WITH_LAB: &str = r#"
        SELECT c.id, c.lab_id, l.name AS lab_name, c.label, c.status,
               c.created_at, c.updated_at
        FROM computers c
        INNER JOIN labs l ON l.id = c.lab_id
"#;

/// 创建设备（管理员）
///
/// POST /api/portal/computers
pub async fn create_computer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateComputerRequest>,
) -> Result<Json<ApiResponse<ComputerDto>>> {
    require_admin(&claims)?;
    req.validate()?;

    let lab_exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM labs WHERE id = $1)")
        .bind(req.lab_id)
        .fetch_one(&state.pool)
        .await?;
    if !lab_exists.0 {
        return Err(PortalError::LabNotFound(req.lab_id));
    }

    // 同一实验室内编号唯一
    let duplicate: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM computers WHERE lab_id = $1 AND label = $2)",
    )
    .bind(req.lab_id)
    .bind(&req.label)
    .fetch_one(&state.pool)
    .await?;
    if duplicate.0 {
        return Err(PortalError::Validation(format!(
            "该实验室已存在设备编号: {}",
            req.label
        )));
    }

    let id: (i64,) = sqlx::query_as(
        "INSERT INTO computers (lab_id, label) VALUES ($1, $2) RETURNING id",
    )
    .bind(req.lab_id)
    .bind(&req.label)
    .fetch_one(&state.pool)
    .await?;

    info!(computer_id = id.0, lab_id = req.lab_id, label = %req.label, "设备已创建");

    let row = sqlx::query_as::<_, ComputerRow>(&format!("{COMPUTER_WITH_LAB} WHERE c.id = $1"))
        .bind(id.0)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 获取设备列表
///
/// GET /api/portal/computers
pub async fn list_computers(
    State(state): State<AppState>,
    Query(filter): Query<ComputerFilter>,
) -> Result<Json<ApiResponse<Vec<ComputerDto>>>> {
    let rows = sqlx::query_as::<_, ComputerRow>(&format!(
        r#"
        {COMPUTER_WITH_LAB}
        WHERE ($1::bigint IS NULL OR c.lab_id = $1)
          AND ($2::varchar IS NULL OR c.status = $2)
        ORDER BY l.name ASC, c.label ASC
        "#,
    ))
    .bind(filter.lab_id)
    .bind(filter.status)
    .fetch_all(&state.pool)
    .await?;

    let computers: Vec<ComputerDto> = rows.into_iter().map(ComputerRow::into_dto).collect();

    Ok(Json(ApiResponse::success(computers)))
}

/// 获取指定实验室的设备列表
///
/// GET /api/portal/labs/:lab_id/computers
pub async fn list_lab_computers(
    State(state): State<AppState>,
    Path(lab_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<ComputerDto>>>> {
    let lab_exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM labs WHERE id = $1)")
        .bind(lab_id)
        .fetch_one(&state.pool)
        .await?;
    if !lab_exists.0 {
        return Err(PortalError::LabNotFound(lab_id));
    }

    let rows = sqlx::query_as::<_, ComputerRow>(&format!(
        "{COMPUTER_WITH_LAB} WHERE c.lab_id = $1 ORDER BY c.label ASC"
    ))
    .bind(lab_id)
    .fetch_all(&state.pool)
    .await?;

    let computers: Vec<ComputerDto> = rows.into_iter().map(ComputerRow::into_dto).collect();

    Ok(Json(ApiResponse::success(computers)))
}

/// 获取设备详情
///
/// GET /api/portal/computers/:id
pub async fn get_computer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ComputerDto>>> {
    let row = sqlx::query_as::<_, ComputerRow>(&format!("{COMPUTER_WITH_LAB} WHERE c.id = $1"))
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(PortalError::ComputerNotFound(id))?;

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 更新设备编号（管理员）
///
/// PUT /api/portal/computers/:id
pub async fn update_computer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateComputerRequest>,
) -> Result<Json<ApiResponse<ComputerDto>>> {
    require_admin(&claims)?;
    req.validate()?;

    let updated = sqlx::query(
        r#"
        UPDATE computers
        SET label = COALESCE($2, label), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&req.label)
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(PortalError::ComputerNotFound(id));
    }

    info!(computer_id = id, "设备已更新");

    let row = sqlx::query_as::<_, ComputerRow>(&format!("{COMPUTER_WITH_LAB} WHERE c.id = $1"))
        .bind(id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 更新设备状态（管理员）
///
/// PATCH /api/portal/computers/:id/status
///
/// in_use 由上机记录驱动，不允许手工设置；
/// 有进行中上机记录的设备不允许改状态
pub async fn update_computer_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateComputerStatusRequest>,
) -> Result<Json<ApiResponse<ComputerDto>>> {
    require_admin(&claims)?;

    if req.status == ComputerStatus::InUse {
        return Err(PortalError::Validation(
            "in_use 状态由上机记录自动维护，不允许手工设置".to_string(),
        ));
    }

    let active_sitin: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM sitins WHERE computer_id = $1 AND status = 'active')",
    )
    .bind(id)
    .fetch_one(&state.pool)
    .await?;
    if active_sitin.0 {
        return Err(PortalError::ComputerUnavailable(
            "设备有进行中的上机记录".to_string(),
        ));
    }

    let updated = sqlx::query(
        "UPDATE computers SET status = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(req.status)
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(PortalError::ComputerNotFound(id));
    }

    info!(computer_id = id, status = ?req.status, "设备状态已更新");

    let row = sqlx::query_as::<_, ComputerRow>(&format!("{COMPUTER_WITH_LAB} WHERE c.id = $1"))
        .bind(id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 删除设备（管理员）
///
/// DELETE /api/portal/computers/:id
///
/// 有进行中上机记录或未完结预约的设备不允许删除
pub async fn delete_computer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    require_admin(&claims)?;

    let in_use: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM sitins WHERE computer_id = $1 AND status = 'active')",
    )
    .bind(id)
    .fetch_one(&state.pool)
    .await?;
    if in_use.0 {
        return Err(PortalError::ComputerUnavailable(
            "设备有进行中的上机记录".to_string(),
        ));
    }

    let has_open_reservations: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM reservations
            WHERE computer_id = $1 AND status IN ('pending', 'approved')
        )
        "#,
    )
    .bind(id)
    .fetch_one(&state.pool)
    .await?;
    if has_open_reservations.0 {
        return Err(PortalError::ComputerUnavailable(
            "设备有待处理或已批准的预约".to_string(),
        ));
    }

    let has_history: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS(SELECT 1 FROM sitins WHERE computer_id = $1)
            OR EXISTS(SELECT 1 FROM reservations WHERE computer_id = $1)
        "#,
    )
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    if has_history.0 {
        // 历史记录引用设备外键，改为下线处理
        let result = sqlx::query(
            "UPDATE computers SET status = 'maintenance', updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&state.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(PortalError::ComputerNotFound(id));
        }
        info!(computer_id = id, "设备有历史记录，已转为检修下线");
    } else {
        let result = sqlx::query("DELETE FROM computers WHERE id = $1")
            .bind(id)
            .execute(&state.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PortalError::ComputerNotFound(id));
        }
        info!(computer_id = id, "设备已删除");
    }

    Ok(Json(ApiResponse::<()>::success_empty()))
}
