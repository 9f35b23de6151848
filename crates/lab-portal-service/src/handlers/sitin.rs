//! 上机记录 API 处理器
//!
//! 走读学生签到、签退、积分奖励和记录查询。
//! 所有涉及额度或积分变动的操作都在单个事务内完成，
//! 并在 session_ledger 中留下对应流水。

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use tracing::info;
use validator::Validate;

use crate::auth::Claims;
use crate::dto::{
    ApiResponse, CreateSitinRequest, PageResponse, PaginationParams, SitinDto, SitinFilter,
};
use crate::error::{PortalError, Result};
use crate::handlers::require_admin;
use crate::models::{ComputerStatus, LabStatus, SitinStatus, UserStatus};
use crate::state::AppState;

/// 带关联名称的上机记录查询结果
#[derive(sqlx::FromRow)]
struct SitinRow {
    id: i64,
    user_id: i64,
    id_number: String,
    student_name: String,
    lab_id: i64,
    lab_name: String,
    computer_id: i64,
    computer_label: String,
    purpose: String,
    login_at: DateTime<Utc>,
    logout_at: Option<DateTime<Utc>>,
    status: SitinStatus,
    rewarded: bool,
}

impl SitinRow {
    fn into_dto(self) -> SitinDto {
        SitinDto {
            id: self.id,
            user_id: self.user_id,
            id_number: self.id_number,
            student_name: self.student_name,
            lab_id: self.lab_id,
            lab_name: self.lab_name,
            computer_id: self.computer_id,
            computer_label: self.computer_label,
            purpose: self.purpose,
            login_at: self.login_at,
            logout_at: self.logout_at,
            status: self.status,
            rewarded: self.rewarded,
        }
    }
}

/// 签到事务中锁定的用户行
#[derive(sqlx::FromRow)]
struct SitinUserRow {
    id: i64,
    session_credits: i32,
    status: UserStatus,
}

/// 签到事务中锁定的设备行
#[derive(sqlx::FromRow)]
struct SitinComputerRow {
    id: i64,
    lab_id: i64,
    status: ComputerStatus,
    lab_status: LabStatus,
}

const SITIN_WITH_NAMES: &str = r#"
        SELECT s.id, s.user_id, u.id_number,
               CONCAT(u.first_name, ' ', u.last_name) AS student_name,
               s.lab_id, l.name AS lab_name,
               s.computer_id, c.label AS computer_label,
               s.purpose, s.login_at, s.logout_at, s.status, s.rewarded
        FROM sitins s
        INNER JOIN users u ON u.id = s.user_id
        INNER JOIN labs l ON l.id = s.lab_id
        INNER JOIN computers c ON c.id = s.computer_id
"#;

/// 上机签到（管理员录入走读学生）
///
/// POST /api/portal/sitins
///
/// 事务内完成：扣减额度、写入记录、设备置为使用中、记录流水
pub async fn create_sitin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateSitinRequest>,
) -> Result<Json<ApiResponse<SitinDto>>> {
    require_admin(&claims)?;
    req.validate()?;

    let mut tx = state.pool.begin().await?;

    // 锁定用户行，避免并发签到重复扣减额度
    let user = sqlx::query_as::<_, SitinUserRow>(
        "SELECT id, session_credits, status FROM users WHERE id_number = $1 FOR UPDATE",
    )
    .bind(&req.id_number)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| PortalError::IdNumberNotFound(req.id_number.clone()))?;

    if user.status == UserStatus::Disabled {
        return Err(PortalError::UserDisabled);
    }
    if user.session_credits <= 0 {
        return Err(PortalError::NoCreditsLeft);
    }

    // 一名学生同一时刻只能有一条进行中的上机记录
    let already_active: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM sitins WHERE user_id = $1 AND status = 'active')",
    )
    .bind(user.id)
    .fetch_one(&mut *tx)
    .await?;
    if already_active.0 {
        return Err(PortalError::AlreadySittingIn);
    }

    let computer = sqlx::query_as::<_, SitinComputerRow>(
        r#"
        SELECT c.id, c.lab_id, c.status, l.status AS lab_status
        FROM computers c
        INNER JOIN labs l ON l.id = c.lab_id
        WHERE c.id = $1
        FOR UPDATE OF c
        "#,
    )
    .bind(req.computer_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(PortalError::ComputerNotFound(req.computer_id))?;

    if computer.lab_status == LabStatus::Closed {
        return Err(PortalError::ComputerUnavailable("实验室已关闭".to_string()));
    }
    if computer.status != ComputerStatus::Available {
        return Err(PortalError::ComputerUnavailable(format!(
            "设备当前状态不可用: {:?}",
            computer.status
        )));
    }

    let sitin_id: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO sitins (user_id, lab_id, computer_id, purpose)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(user.id)
    .bind(computer.lab_id)
    .bind(computer.id)
    .bind(&req.purpose)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE computers SET status = 'in_use', updated_at = NOW() WHERE id = $1")
        .bind(computer.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE users SET session_credits = session_credits - 1, updated_at = NOW() WHERE id = $1",
    )
    .bind(user.id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO session_ledger (user_id, change_type, delta, sitin_id, remark)
        VALUES ($1, 'sitin', -1, $2, '上机签到')
        "#,
    )
    .bind(user.id)
    .bind(sitin_id.0)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        sitin_id = sitin_id.0,
        user_id = user.id,
        computer_id = computer.id,
        "上机签到成功"
    );

    let row = sqlx::query_as::<_, SitinRow>(&format!("{SITIN_WITH_NAMES} WHERE s.id = $1"))
        .bind(sitin_id.0)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 上机签退（管理员）
///
/// POST /api/portal/sitins/:id/logout
///
/// 记录签退时间并释放设备
pub async fn logout_sitin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<SitinDto>>> {
    require_admin(&claims)?;

    let mut tx = state.pool.begin().await?;

    let sitin: (i64, SitinStatus) = sqlx::query_as(
        "SELECT computer_id, status FROM sitins WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(PortalError::SitinNotFound(id))?;

    if sitin.1 != SitinStatus::Active {
        return Err(PortalError::SitinAlreadyClosed);
    }

    sqlx::query(
        "UPDATE sitins SET status = 'closed', logout_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    // 设备仅在未被管理员转为检修时回到空闲
    sqlx::query(
        "UPDATE computers SET status = 'available', updated_at = NOW() WHERE id = $1 AND status = 'in_use'",
    )
    .bind(sitin.0)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(sitin_id = id, computer_id = sitin.0, "上机签退成功");

    let row = sqlx::query_as::<_, SitinRow>(&format!("{SITIN_WITH_NAMES} WHERE s.id = $1"))
        .bind(id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 发放积分奖励（管理员）
///
/// POST /api/portal/sitins/:id/reward
///
/// 每条已结束的上机记录只能奖励一次（+1 积分）。
/// 积分每累计满配置的阈值，自动兑换 1 次上机额度并写入流水。
pub async fn reward_sitin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<SitinDto>>> {
    require_admin(&claims)?;

    let points_per_credit = state.portal.points_per_credit.max(1);

    let mut tx = state.pool.begin().await?;

    let sitin: (i64, SitinStatus, bool) = sqlx::query_as(
        "SELECT user_id, status, rewarded FROM sitins WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(PortalError::SitinNotFound(id))?;

    if sitin.1 != SitinStatus::Closed {
        return Err(PortalError::Validation(
            "只能对已结束的上机记录发放奖励".to_string(),
        ));
    }
    if sitin.2 {
        return Err(PortalError::AlreadyRewarded);
    }

    // rewarded 条件写入 WHERE，双重保证并发下不会重复奖励
    let marked = sqlx::query(
        "UPDATE sitins SET rewarded = TRUE WHERE id = $1 AND rewarded = FALSE",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;
    if marked.rows_affected() == 0 {
        return Err(PortalError::AlreadyRewarded);
    }

    let new_points: (i32,) = sqlx::query_as(
        "UPDATE users SET points = points + 1, updated_at = NOW() WHERE id = $1 RETURNING points",
    )
    .bind(sitin.0)
    .fetch_one(&mut *tx)
    .await?;

    // 积分满阈值自动兑换上机额度
    if new_points.0 % points_per_credit == 0 {
        sqlx::query(
            "UPDATE users SET session_credits = session_credits + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(sitin.0)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO session_ledger (user_id, change_type, delta, sitin_id, remark)
            VALUES ($1, 'reward', 1, $2, $3)
            "#,
        )
        .bind(sitin.0)
        .bind(id)
        .bind(format!("积分满 {} 兑换上机额度", points_per_credit))
        .execute(&mut *tx)
        .await?;

        info!(user_id = sitin.0, points = new_points.0, "积分兑换额度");
    }

    tx.commit().await?;

    info!(sitin_id = id, user_id = sitin.0, points = new_points.0, "积分奖励已发放");

    let row = sqlx::query_as::<_, SitinRow>(&format!("{SITIN_WITH_NAMES} WHERE s.id = $1"))
        .bind(id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 获取上机记录列表
///
/// GET /api/portal/sitins
///
/// 学生只能查询自己的记录，管理员可按条件检索全部
pub async fn list_sitins(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
    Query(mut filter): Query<SitinFilter>,
) -> Result<Json<ApiResponse<PageResponse<SitinDto>>>> {
    if !claims.is_admin() {
        filter.user_id = Some(claims.user_id()?);
    }

    let where_clause = r#"
        WHERE ($1::bigint IS NULL OR s.user_id = $1)
          AND ($2::bigint IS NULL OR s.lab_id = $2)
          AND ($3::varchar IS NULL OR s.status = $3)
          AND ($4::timestamptz IS NULL OR s.login_at >= $4)
          AND ($5::timestamptz IS NULL OR s.login_at < $5)
    "#;

    let total: (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM sitins s {where_clause}"
    ))
    .bind(filter.user_id)
    .bind(filter.lab_id)
    .bind(filter.status)
    .bind(filter.start_time)
    .bind(filter.end_time)
    .fetch_one(&state.pool)
    .await?;

    let rows = sqlx::query_as::<_, SitinRow>(&format!(
        r#"
        {SITIN_WITH_NAMES}
        {where_clause}
        ORDER BY s.login_at DESC, s.id DESC
        LIMIT $6 OFFSET $7
        "#,
    ))
    .bind(filter.user_id)
    .bind(filter.lab_id)
    .bind(filter.status)
    .bind(filter.start_time)
    .bind(filter.end_time)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.pool)
    .await?;

    let items: Vec<SitinDto> = rows.into_iter().map(SitinRow::into_dto).collect();

    Ok(Json(ApiResponse::success(PageResponse::new(
        items,
        total.0,
        pagination.page,
        pagination.limit(),
    ))))
}

/// 获取上机记录详情
///
/// GET /api/portal/sitins/:id
pub async fn get_sitin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<SitinDto>>> {
    let row = sqlx::query_as::<_, SitinRow>(&format!("{SITIN_WITH_NAMES} WHERE s.id = $1"))
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(PortalError::SitinNotFound(id))?;

    if !claims.is_admin() && claims.user_id()? != row.user_id {
        return Err(PortalError::Forbidden("只能查看本人上机记录".to_string()));
    }

    Ok(Json(ApiResponse::success(row.into_dto())))
}

/// 获取当前所有进行中的上机记录
///
/// GET /api/portal/sitins/current
///
/// 管理员查看全部在场学生，学生只看到自己的记录
pub async fn list_current_sitins(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<Vec<SitinDto>>>> {
    let owner_filter = if claims.is_admin() {
        None
    } else {
        Some(claims.user_id()?)
    };

    let rows = sqlx::query_as::<_, SitinRow>(&format!(
        r#"
        {SITIN_WITH_NAMES}
        WHERE s.status = 'active'
          AND ($1::bigint IS NULL OR s.user_id = $1)
        ORDER BY s.login_at ASC
        "#,
    ))
    .bind(owner_filter)
    .fetch_all(&state.pool)
    .await?;

    let items: Vec<SitinDto> = rows.into_iter().map(SitinRow::into_dto).collect();

    Ok(Json(ApiResponse::success(items)))
}

/// 获取学生当前进行中的上机记录
///
/// GET /api/portal/sitins/current/:user_id
pub async fn get_current_sitin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<i64>,
) -> Result<Json<ApiResponse<Option<SitinDto>>>> {
    if !claims.is_admin() && claims.user_id()? != user_id {
        return Err(PortalError::Forbidden("只能查看本人上机记录".to_string()));
    }

    let row = sqlx::query_as::<_, SitinRow>(&format!(
        "{SITIN_WITH_NAMES} WHERE s.user_id = $1 AND s.status = 'active'"
    ))
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(row.map(SitinRow::into_dto))))
}
