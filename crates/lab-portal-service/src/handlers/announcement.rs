//! 公告管理 API 处理器

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use tracing::info;
use validator::Validate;

use crate::auth::Claims;
use crate::dto::{
    AnnouncementDto, ApiResponse, CreateAnnouncementRequest, PageResponse, PaginationParams,
    UpdateAnnouncementRequest,
};
use crate::error::{PortalError, Result};
use crate::handlers::require_admin;
use crate::state::AppState;

/// 带发布人名称的公告查询结果
#[derive(sqlx::FromRow)]
struct AnnouncementRow {
    id: i64,
    title: String,
    content: String,
    posted_by: i64,
    poster_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AnnouncementRow {
    fn into_dto(self) -> AnnouncementDto {
        AnnouncementDto {
            id: self.id,
            title: self.title,
            content: self.content,
            posted_by: self.posted_by,
            poster_name: self.poster_name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const ANNOUNCEMENT_WITH_POSTER: &str = r#"
        SELECT a.id, a.title, a.content, a.posted_by,
               CONCAT(u.first_name, ' ', u.last_name) AS poster_name,
               a.created_at, a.updated_at
        FROM announcements a
        INNER JOIN users u ON u.id = a.posted_by
"#;

/// 发布公告（管理员）
///
/// POST /api/portal/announcements
pub async fn create_announcement(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateAnnouncementRequest>,
) -> Result<Json<ApiResponse<AnnouncementDto>>> {
    require_admin(&claims)?;
    req.validate()?;

    let admin_id = claims.user_id()?;

    let id: (i64,) = sqlx::query_as(
        "INSERT INTO announcements (title, content, posted_by) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(&req.title)
    .bind(&req.content)
    .bind(admin_id)
    .fetch_one(&state.pool)
    .await?;

    info!(announcement_id = id.0, admin_id, "公告已发布");

    let row = sqlx::query_as::<_, AnnouncementRow>(&format!(
        "{ANNOUNCEMENT_WITH_POSTER} WHERE a.id = $1"
    ))
    .bind(id.0)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 获取公告列表（按发布时间倒序）
///
/// GET /api/portal/announcements
pub async fn list_announcements(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<AnnouncementDto>>>> {
    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM announcements")
        .fetch_one(&state.pool)
        .await?;

    let rows = sqlx::query_as::<_, AnnouncementRow>(&format!(
        r#"
        {ANNOUNCEMENT_WITH_POSTER}
        ORDER BY a.created_at DESC, a.id DESC
        LIMIT $1 OFFSET $2
        "#,
    ))
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.pool)
    .await?;

    let items: Vec<AnnouncementDto> = rows.into_iter().map(AnnouncementRow::into_dto).collect();

    Ok(Json(ApiResponse::success(PageResponse::new(
        items,
        total.0,
        pagination.page,
        pagination.limit(),
    ))))
}

/// 获取公告详情
///
/// GET /api/portal/announcements/:id
pub async fn get_announcement(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<AnnouncementDto>>> {
    let row = sqlx::query_as::<_, AnnouncementRow>(&format!(
        "{ANNOUNCEMENT_WITH_POSTER} WHERE a.id = $1"
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(PortalError::AnnouncementNotFound(id))?;

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 更新公告（管理员）
///
/// PUT /api/portal/announcements/:id
pub async fn update_announcement(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateAnnouncementRequest>,
) -> Result<Json<ApiResponse<AnnouncementDto>>> {
    require_admin(&claims)?;
    req.validate()?;

    let updated = sqlx::query(
        r#"
        UPDATE announcements
        SET title = COALESCE($2, title),
            content = COALESCE($3, content),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&req.title)
    .bind(&req.content)
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(PortalError::AnnouncementNotFound(id));
    }

    info!(announcement_id = id, "公告已更新");

    let row = sqlx::query_as::<_, AnnouncementRow>(&format!(
        "{ANNOUNCEMENT_WITH_POSTER} WHERE a.id = $1"
    ))
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 删除公告（管理员）
///
/// DELETE /api/portal/announcements/:id
pub async fn delete_announcement(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    require_admin(&claims)?;

    let result = sqlx::query("DELETE FROM announcements WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(PortalError::AnnouncementNotFound(id));
    }

    info!(announcement_id = id, "公告已删除");

    Ok(Json(ApiResponse::<()>::success_empty()))
}
