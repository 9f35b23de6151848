//! 实验室反馈 API 处理器
//!
//! 学生对实验室（可关联某次上机）提交评分和意见

use axum::{
    Extension, Json,
    extract::{Query, State},
};
use chrono::{DateTime, Utc};
use tracing::info;
use validator::Validate;

use crate::auth::Claims;
use crate::dto::{
    ApiResponse, CreateFeedbackRequest, FeedbackDto, FeedbackFilter, PageResponse,
    PaginationParams,
};
use crate::error::{PortalError, Result};
use crate::state::AppState;

/// 带关联名称的反馈查询结果
#[derive(sqlx::FromRow)]
struct FeedbackRow {
    id: i64,
    user_id: i64,
    id_number: String,
    student_name: String,
    sitin_id: Option<i64>,
    lab_id: i64,
    lab_name: String,
    rating: i16,
    message: String,
    created_at: DateTime<Utc>,
}

impl FeedbackRow {
    fn into_dto(self) -> FeedbackDto {
        FeedbackDto {
            id: self.id,
            user_id: self.user_id,
            id_number: self.id_number,
            student_name: self.student_name,
            sitin_id: self.sitin_id,
            lab_id: self.lab_id,
            lab_name: self.lab_name,
            rating: self.rating,
            message: self.message,
            created_at: self.created_at,
        }
    }
}

const FEEDBACK_WITH_NAMES: &str = r#"
        SELECT f.id, f.user_id, u.id_number,
               CONCAT(u.first_name, ' ', u.last_name) AS student_name,
               f.sitin_id, f.lab_id, l.name AS lab_name,
               f.rating, f.message, f.created_at
        FROM feedback f
        INNER JOIN users u ON u.id = f.user_id
        INNER JOIN labs l ON l.id = f.lab_id
"#;

/// 提交反馈（学生）
///
/// POST /api/portal/feedback
///
/// 关联上机记录时，该记录必须属于提交人本人
pub async fn create_feedback(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateFeedbackRequest>,
) -> Result<Json<ApiResponse<FeedbackDto>>> {
    req.validate()?;

    let user_id = claims.user_id()?;

    let lab_exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM labs WHERE id = $1)")
        .bind(req.lab_id)
        .fetch_one(&state.pool)
        .await?;
    if !lab_exists.0 {
        return Err(PortalError::LabNotFound(req.lab_id));
    }

    if let Some(sitin_id) = req.sitin_id {
        let owner: Option<(i64,)> =
            sqlx::query_as("SELECT user_id FROM sitins WHERE id = $1")
                .bind(sitin_id)
                .fetch_optional(&state.pool)
                .await?;
        match owner {
            None => return Err(PortalError::SitinNotFound(sitin_id)),
            Some((owner_id,)) if owner_id != user_id => {
                return Err(PortalError::Forbidden(
                    "只能对本人的上机记录提交反馈".to_string(),
                ));
            }
            Some(_) => {}
        }
    }

    let id: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO feedback (user_id, sitin_id, lab_id, rating, message)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(req.sitin_id)
    .bind(req.lab_id)
    .bind(req.rating)
    .bind(&req.message)
    .fetch_one(&state.pool)
    .await?;

    info!(feedback_id = id.0, user_id, lab_id = req.lab_id, rating = req.rating, "反馈已提交");

    let row = sqlx::query_as::<_, FeedbackRow>(&format!("{FEEDBACK_WITH_NAMES} WHERE f.id = $1"))
        .bind(id.0)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 获取反馈列表
///
/// GET /api/portal/feedback
///
/// 学生只能查询自己的反馈，管理员可按实验室和评分过滤
pub async fn list_feedback(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
    Query(mut filter): Query<FeedbackFilter>,
) -> Result<Json<ApiResponse<PageResponse<FeedbackDto>>>> {
    if !claims.is_admin() {
        filter.user_id = Some(claims.user_id()?);
    }

    let where_clause = r#"
        WHERE ($1::bigint IS NULL OR f.user_id = $1)
          AND ($2::bigint IS NULL OR f.lab_id = $2)
          AND ($3::smallint IS NULL OR f.rating >= $3)
    "#;

    let total: (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM feedback f {where_clause}"
    ))
    .bind(filter.user_id)
    .bind(filter.lab_id)
    .bind(filter.min_rating)
    .fetch_one(&state.pool)
    .await?;

    let rows = sqlx::query_as::<_, FeedbackRow>(&format!(
        r#"
        {FEEDBACK_WITH_NAMES}
        {where_clause}
        ORDER BY f.created_at DESC, f.id DESC
        LIMIT $4 OFFSET $5
        "#,
    ))
    .bind(filter.user_id)
    .bind(filter.lab_id)
    .bind(filter.min_rating)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.pool)
    .await?;

    let items: Vec<FeedbackDto> = rows.into_iter().map(FeedbackRow::into_dto).collect();

    Ok(Json(ApiResponse::success(PageResponse::new(
        items,
        total.0,
        pagination.page,
        pagination.limit(),
    ))))
}
