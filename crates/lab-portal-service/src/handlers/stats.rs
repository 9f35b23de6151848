//! 统计报表 API 处理器
//!
//! 概览数据、积分排行榜、上机用途分布和每日上机趋势（管理员）

use axum::{
    Extension, Json,
    extract::{Query, State},
};
use chrono::NaiveDate;

use crate::auth::Claims;
use crate::dto::{
    ApiResponse, DailySitinPoint, DateRangeParams, LeaderboardEntryDto, LeaderboardParams,
    PurposeDistributionDto, StatsOverview,
};
use crate::error::{PortalError, Result};
use crate::handlers::require_admin;
use crate::state::AppState;

/// 排行榜查询结果行
#[derive(sqlx::FromRow)]
struct LeaderboardRow {
    user_id: i64,
    id_number: String,
    student_name: String,
    course: Option<String>,
    points: i32,
    sitin_count: i64,
}

/// 用途分布查询结果行
#[derive(sqlx::FromRow)]
struct PurposeRow {
    purpose: String,
    count: i64,
}

/// 每日上机数查询结果行
#[derive(sqlx::FromRow)]
struct DailyRow {
    day: NaiveDate,
    count: i64,
}

/// 获取统计概览
///
/// GET /api/portal/stats/overview
pub async fn get_overview(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<StatsOverview>>> {
    require_admin(&claims)?;

    let row: (i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users WHERE role = 'student'),
            (SELECT COUNT(*) FROM users WHERE role = 'student' AND status = 'active'),
            (SELECT COUNT(*) FROM sitins),
            (SELECT COUNT(*) FROM sitins WHERE status = 'active'),
            (SELECT COUNT(*) FROM sitins WHERE login_at >= CURRENT_DATE),
            (SELECT COUNT(*) FROM reservations WHERE status = 'pending'),
            (SELECT COUNT(*) FROM reservations)
        "#,
    )
    .fetch_one(&state.pool)
    .await?;

    let overview = StatsOverview {
        total_students: row.0,
        active_students: row.1,
        total_sitins: row.2,
        active_sitins: row.3,
        today_sitins: row.4,
        pending_reservations: row.5,
        total_reservations: row.6,
    };

    Ok(Json(ApiResponse::success(overview)))
}

/// 获取积分排行榜
///
/// GET /api/portal/stats/leaderboard
///
/// 按积分降序，同分按累计上机次数降序
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<LeaderboardParams>,
) -> Result<Json<ApiResponse<Vec<LeaderboardEntryDto>>>> {
    require_admin(&claims)?;

    let limit = params.limit.clamp(1, 100);

    let rows = sqlx::query_as::<_, LeaderboardRow>(
        r#"
        SELECT u.id AS user_id, u.id_number,
               CONCAT(u.first_name, ' ', u.last_name) AS student_name,
               u.course, u.points,
               COALESCE(s.sitin_count, 0) AS sitin_count
        FROM users u
        LEFT JOIN (
            SELECT user_id, COUNT(*) AS sitin_count
            FROM sitins
            WHERE status = 'closed'
            GROUP BY user_id
        ) s ON s.user_id = u.id
        WHERE u.role = 'student' AND u.status = 'active'
        ORDER BY u.points DESC, sitin_count DESC, u.id_number ASC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    let entries: Vec<LeaderboardEntryDto> = rows
        .into_iter()
        .map(|row| LeaderboardEntryDto {
            user_id: row.user_id,
            id_number: row.id_number,
            student_name: row.student_name,
            course: row.course,
            points: row.points,
            sitin_count: row.sitin_count,
        })
        .collect();

    Ok(Json(ApiResponse::success(entries)))
}

/// 获取上机用途分布
///
/// GET /api/portal/stats/purpose-distribution
pub async fn get_purpose_distribution(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<Vec<PurposeDistributionDto>>>> {
    require_admin(&claims)?;

    let rows = sqlx::query_as::<_, PurposeRow>(
        r#"
        SELECT purpose, COUNT(*) AS count
        FROM sitins
        GROUP BY purpose
        ORDER BY count DESC, purpose ASC
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = rows.iter().map(|r| r.count).sum();

    let distribution: Vec<PurposeDistributionDto> = rows
        .into_iter()
        .map(|row| PurposeDistributionDto {
            purpose: row.purpose,
            count: row.count,
            percentage: if total > 0 {
                (row.count as f64 / total as f64) * 100.0
            } else {
                0.0
            },
        })
        .collect();

    Ok(Json(ApiResponse::success(distribution)))
}

/// 获取每日上机趋势
///
/// GET /api/portal/stats/daily-sitins?startDate=...&endDate=...
///
/// 没有记录的日期补 0，保证前端图表连续
pub async fn get_daily_sitins(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<DateRangeParams>,
) -> Result<Json<ApiResponse<Vec<DailySitinPoint>>>> {
    require_admin(&claims)?;

    if params.start_date > params.end_date {
        return Err(PortalError::Validation(
            "开始日期不能晚于结束日期".to_string(),
        ));
    }
    // 防止过大的日期范围拖垮查询
    if (params.end_date - params.start_date).num_days() > 366 {
        return Err(PortalError::Validation(
            "日期范围不能超过一年".to_string(),
        ));
    }

    let rows = sqlx::query_as::<_, DailyRow>(
        r#"
        SELECT (login_at AT TIME ZONE 'UTC')::date AS day, COUNT(*) AS count
        FROM sitins
        WHERE login_at >= $1::date AND login_at < ($2::date + INTERVAL '1 day')
        GROUP BY day
        ORDER BY day ASC
        "#,
    )
    .bind(params.start_date)
    .bind(params.end_date)
    .fetch_all(&state.pool)
    .await?;

    let mut by_day = std::collections::HashMap::new();
    for row in rows {
        by_day.insert(row.day, row.count);
    }

    let mut points = Vec::new();
    let mut day = params.start_date;
    while day <= params.end_date {
        points.push(DailySitinPoint {
            date: day.format("%Y-%m-%d").to_string(),
            count: by_day.get(&day).copied().unwrap_or(0),
        });
        day = day
            .succ_opt()
            .ok_or_else(|| PortalError::Internal("日期越界".to_string()))?;
    }

    Ok(Json(ApiResponse::success(points)))
}
