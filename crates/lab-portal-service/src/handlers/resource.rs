//! 学习资源 API 处理器
//!
//! 管理员维护资源链接，学生只能看到已启用的条目

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use tracing::info;
use validator::Validate;

use crate::auth::Claims;
use crate::dto::{ApiResponse, CreateResourceRequest, ResourceDto, UpdateResourceRequest};
use crate::error::{PortalError, Result};
use crate::handlers::require_admin;
use crate::state::AppState;

/// 资源查询结果行
#[derive(sqlx::FromRow)]
struct ResourceRow {
    id: i64,
    title: String,
    description: Option<String>,
    link: String,
    enabled: bool,
    uploaded_by: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ResourceRow {
    fn into_dto(self) -> ResourceDto {
        ResourceDto {
            id: self.id,
            title: self.title,
            description: self.description,
            link: self.link,
            enabled: self.enabled,
            uploaded_by: self.uploaded_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const RESOURCE_COLUMNS: &str =
    "id, title, description, link, enabled, uploaded_by, created_at, updated_at";

/// 创建资源（管理员）
///
/// POST /api/portal/resources
pub async fn create_resource(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateResourceRequest>,
) -> Result<Json<ApiResponse<ResourceDto>>> {
    require_admin(&claims)?;
    req.validate()?;

    let admin_id = claims.user_id()?;

    let row = sqlx::query_as::<_, ResourceRow>(&format!(
        r#"
        INSERT INTO resources (title, description, link, uploaded_by)
        VALUES ($1, $2, $3, $4)
        RETURNING {RESOURCE_COLUMNS}
        "#,
    ))
    .bind(&req.title)
    .bind(&req.description)
    .bind(&req.link)
    .bind(admin_id)
    .fetch_one(&state.pool)
    .await?;

    info!(resource_id = row.id, admin_id, "资源已创建");

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 获取资源列表
///
/// GET /api/portal/resources
///
/// 学生只能看到已启用的资源
pub async fn list_resources(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<Vec<ResourceDto>>>> {
    let only_enabled = !claims.is_admin();

    let rows = sqlx::query_as::<_, ResourceRow>(&format!(
        r#"
        SELECT {RESOURCE_COLUMNS}
        FROM resources
        WHERE ($1 = FALSE OR enabled = TRUE)
        ORDER BY created_at DESC, id DESC
        "#,
    ))
    .bind(only_enabled)
    .fetch_all(&state.pool)
    .await?;

    let resources: Vec<ResourceDto> = rows.into_iter().map(ResourceRow::into_dto).collect();

    Ok(Json(ApiResponse::success(resources)))
}

/// 获取资源详情
///
/// GET /api/portal/resources/:id
pub async fn get_resource(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ResourceDto>>> {
    let row = sqlx::query_as::<_, ResourceRow>(&format!(
        "SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(PortalError::ResourceNotFound(id))?;

    // 已停用的资源对学生不可见
    if !row.enabled && !claims.is_admin() {
        return Err(PortalError::ResourceNotFound(id));
    }

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 更新资源（管理员）
///
/// PUT /api/portal/resources/:id
pub async fn update_resource(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateResourceRequest>,
) -> Result<Json<ApiResponse<ResourceDto>>> {
    require_admin(&claims)?;
    req.validate()?;

    let row = sqlx::query_as::<_, ResourceRow>(&format!(
        r#"
        UPDATE resources
        SET title = COALESCE($2, title),
            description = COALESCE($3, description),
            link = COALESCE($4, link),
            enabled = COALESCE($5, enabled),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {RESOURCE_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(&req.title)
    .bind(&req.description)
    .bind(&req.link)
    .bind(req.enabled)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(PortalError::ResourceNotFound(id))?;

    info!(resource_id = id, "资源已更新");

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 删除资源（管理员）
///
/// DELETE /api/portal/resources/:id
pub async fn delete_resource(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    require_admin(&claims)?;

    let result = sqlx::query("DELETE FROM resources WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(PortalError::ResourceNotFound(id));
    }

    info!(resource_id = id, "资源已删除");

    Ok(Json(ApiResponse::<()>::success_empty()))
}
