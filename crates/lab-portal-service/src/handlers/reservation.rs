//! 预约管理 API 处理器
//!
//! 学生提交预约，管理员审批。额度在提交时扣减，
//! 驳回或取消时在同一事务中退还并写入流水。

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use tracing::info;
use validator::Validate;

use crate::auth::Claims;
use crate::dto::{
    ApiResponse, CreateReservationRequest, DecideReservationRequest, PageResponse,
    PaginationParams, ReservationDto, ReservationFilter,
};
use crate::error::{PortalError, Result};
use crate::handlers::require_admin;
use crate::models::{ComputerStatus, LabStatus, ReservationStatus, UserStatus};
use crate::schedule::{self, Window};
use crate::state::AppState;

/// 带关联名称的预约查询结果
#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: i64,
    user_id: i64,
    id_number: String,
    student_name: String,
    lab_id: i64,
    lab_name: String,
    computer_id: i64,
    computer_label: String,
    purpose: String,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    status: ReservationStatus,
    remark: Option<String>,
    decided_by: Option<i64>,
    decided_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl ReservationRow {
    fn into_dto(self) -> ReservationDto {
        ReservationDto {
            id: self.id,
            user_id: self.user_id,
            id_number: self.id_number,
            student_name: self.student_name,
            lab_id: self.lab_id,
            lab_name: self.lab_name,
            computer_id: self.computer_id,
            computer_label: self.computer_label,
            purpose: self.purpose,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            status: self.status,
            remark: self.remark,
            decided_by: self.decided_by,
            decided_at: self.decided_at,
            created_at: self.created_at,
        }
    }
}

/// 预约事务中锁定的设备行
#[derive(sqlx::FromRow)]
struct ReservationComputerRow {
    id: i64,
    lab_id: i64,
    status: ComputerStatus,
    lab_status: LabStatus,
}

const RESERVATION_WITH_NAMES: &str = r#"
        SELECT r.id, r.user_id, u.id_number,
               CONCAT(u.first_name, ' ', u.last_name) AS student_name,
               r.lab_id, l.name AS lab_name,
               r.computer_id, c.label AS computer_label,
               r.purpose, r.starts_at, r.ends_at, r.status, r.remark,
               r.decided_by, r.decided_at, r.created_at
        FROM reservations r
        INNER JOIN users u ON u.id = r.user_id
        INNER JOIN labs l ON l.id = r.lab_id
        INNER JOIN computers c ON c.id = r.computer_id
"#;

async fn fetch_reservation_dto(state: &AppState, id: i64) -> Result<ReservationDto> {
    let row = sqlx::query_as::<_, ReservationRow>(&format!(
        "{RESERVATION_WITH_NAMES} WHERE r.id = $1"
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(PortalError::ReservationNotFound(id))?;

    Ok(row.into_dto())
}

/// 提交预约（学生）
///
/// POST /api/portal/reservations
///
/// 校验顺序：时间范围、设备与实验室状态、开放时段、时段冲突、额度。
/// 通过后扣减 1 次额度并写入流水。
pub async fn create_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateReservationRequest>,
) -> Result<Json<ApiResponse<ReservationDto>>> {
    req.validate()?;

    let now = Utc::now();
    schedule::validate_time_range(req.starts_at, req.ends_at, now)?;

    let user_id = claims.user_id()?;

    let mut tx = state.pool.begin().await?;

    // 锁定用户行，避免并发提交重复扣减额度
    let user: (i32, UserStatus) = sqlx::query_as(
        "SELECT session_credits, status FROM users WHERE id = $1 FOR UPDATE",
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(PortalError::UserNotFound(user_id))?;

    if user.1 == UserStatus::Disabled {
        return Err(PortalError::UserDisabled);
    }
    if user.0 <= 0 {
        return Err(PortalError::NoCreditsLeft);
    }

    let computer = sqlx::query_as::<_, ReservationComputerRow>(
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
    if computer.status == ComputerStatus::Maintenance {
        return Err(PortalError::ComputerUnavailable("设备检修中".to_string()));
    }

    // 预约时段必须完整落在当天某个开放窗口内
    let weekday = schedule::weekday_index(req.starts_at);
    let windows: Vec<(chrono::NaiveTime, chrono::NaiveTime)> = sqlx::query_as(
        "SELECT open_time, close_time FROM lab_schedules WHERE lab_id = $1 AND weekday = $2",
    )
    .bind(computer.lab_id)
    .bind(weekday)
    .fetch_all(&mut *tx)
    .await?;

    let windows: Vec<Window> = windows
        .into_iter()
        .map(|(open, close)| Window::new(open, close))
        .collect();

    if !schedule::fits_schedule(&windows, req.starts_at, req.ends_at) {
        return Err(PortalError::OutsideLabSchedule);
    }

    // 与同一设备上待审批/已批准的预约做半开区间冲突检查
    let conflict: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM reservations
            WHERE computer_id = $1
              AND status IN ('pending', 'approved')
              AND starts_at < $3
              AND $2 < ends_at
        )
        "#,
    )
    .bind(computer.id)
    .bind(req.starts_at)
    .bind(req.ends_at)
    .fetch_one(&mut *tx)
    .await?;
    if conflict.0 {
        return Err(PortalError::ReservationConflict);
    }

    let reservation_id: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO reservations (user_id, lab_id, computer_id, purpose, starts_at, ends_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(computer.lab_id)
    .bind(computer.id)
    .bind(&req.purpose)
    .bind(req.starts_at)
    .bind(req.ends_at)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE users SET session_credits = session_credits - 1, updated_at = NOW() WHERE id = $1",
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO session_ledger (user_id, change_type, delta, reservation_id, remark)
        VALUES ($1, 'reservation_request', -1, $2, '提交预约')
        "#,
    )
    .bind(user_id)
    .bind(reservation_id.0)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        reservation_id = reservation_id.0,
        user_id,
        computer_id = computer.id,
        "预约已提交"
    );

    let dto = fetch_reservation_dto(&state, reservation_id.0).await?;
    Ok(Json(ApiResponse::success(dto)))
}

/// 批准预约（管理员）
///
/// POST /api/portal/reservations/:id/approve
pub async fn approve_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<DecideReservationRequest>,
) -> Result<Json<ApiResponse<ReservationDto>>> {
    require_admin(&claims)?;
    req.validate()?;

    let admin_id = claims.user_id()?;

    let mut tx = state.pool.begin().await?;

    let current: (ReservationStatus, i64, DateTime<Utc>, DateTime<Utc>) = sqlx::query_as(
        "SELECT status, computer_id, starts_at, ends_at FROM reservations WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(PortalError::ReservationNotFound(id))?;

    if !current.0.can_transition_to(ReservationStatus::Approved) {
        return Err(PortalError::InvalidReservationState(format!("{:?}", current.0)));
    }

    // 审批前再次确认没有已批准的冲突预约
    let conflict: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM reservations
            WHERE computer_id = $1
              AND id <> $2
              AND status = 'approved'
              AND starts_at < $4
              AND $3 < ends_at
        )
        "#,
    )
    .bind(current.1)
    .bind(id)
    .bind(current.2)
    .bind(current.3)
    .fetch_one(&mut *tx)
    .await?;
    if conflict.0 {
        return Err(PortalError::ReservationConflict);
    }

    sqlx::query(
        r#"
        UPDATE reservations
        SET status = 'approved', remark = $2, decided_by = $3, decided_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&req.remark)
    .bind(admin_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(reservation_id = id, admin_id, "预约已批准");

    let dto = fetch_reservation_dto(&state, id).await?;
    Ok(Json(ApiResponse::success(dto)))
}

/// 驳回预约（管理员）
///
/// POST /api/portal/reservations/:id/reject
///
/// 驳回时退还预约扣减的额度
pub async fn reject_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<DecideReservationRequest>,
) -> Result<Json<ApiResponse<ReservationDto>>> {
    require_admin(&claims)?;
    req.validate()?;

    let admin_id = claims.user_id()?;

    let mut tx = state.pool.begin().await?;

    let current: (ReservationStatus, i64) = sqlx::query_as(
        "SELECT status, user_id FROM reservations WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(PortalError::ReservationNotFound(id))?;

    if !current.0.can_transition_to(ReservationStatus::Rejected) {
        return Err(PortalError::InvalidReservationState(format!("{:?}", current.0)));
    }

    sqlx::query(
        r#"
        UPDATE reservations
        SET status = 'rejected', remark = $2, decided_by = $3, decided_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&req.remark)
    .bind(admin_id)
    .execute(&mut *tx)
    .await?;

    refund_credit(&mut tx, current.1, id, "预约被驳回，退还额度").await?;

    tx.commit().await?;

    info!(reservation_id = id, admin_id, "预约已驳回");

    let dto = fetch_reservation_dto(&state, id).await?;
    Ok(Json(ApiResponse::success(dto)))
}

/// 取消预约（学生本人或管理员）
///
/// POST /api/portal/reservations/:id/cancel
///
/// 待审批和已批准的预约都可以取消，取消时退还额度
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ReservationDto>>> {
    let caller_id = claims.user_id()?;

    let mut tx = state.pool.begin().await?;

    let current: (ReservationStatus, i64) = sqlx::query_as(
        "SELECT status, user_id FROM reservations WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(PortalError::ReservationNotFound(id))?;

    if !claims.is_admin() && current.1 != caller_id {
        return Err(PortalError::Forbidden("只能取消本人的预约".to_string()));
    }

    if !current.0.can_transition_to(ReservationStatus::Cancelled) {
        return Err(PortalError::InvalidReservationState(format!("{:?}", current.0)));
    }

    sqlx::query(
        r#"
        UPDATE reservations
        SET status = 'cancelled', decided_by = $2, decided_at = NOW(), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(caller_id)
    .execute(&mut *tx)
    .await?;

    refund_credit(&mut tx, current.1, id, "预约已取消，退还额度").await?;

    tx.commit().await?;

    info!(reservation_id = id, caller_id, "预约已取消");

    let dto = fetch_reservation_dto(&state, id).await?;
    Ok(Json(ApiResponse::success(dto)))
}

/// 退还一次上机额度并写入流水
async fn refund_credit(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: i64,
    reservation_id: i64,
    remark: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE users SET session_credits = session_credits + 1, updated_at = NOW() WHERE id = $1",
    )
    .bind(user_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO session_ledger (user_id, change_type, delta, reservation_id, remark)
        VALUES ($1, 'reservation_refund', 1, $2, $3)
        "#,
    )
    .bind(user_id)
    .bind(reservation_id)
    .bind(remark)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// 获取预约列表
///
/// GET /api/portal/reservations
///
/// 学生只能查询自己的预约
pub async fn list_reservations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
    Query(mut filter): Query<ReservationFilter>,
) -> Result<Json<ApiResponse<PageResponse<ReservationDto>>>> {
    if !claims.is_admin() {
        filter.user_id = Some(claims.user_id()?);
    }

    let where_clause = r#"
        WHERE ($1::bigint IS NULL OR r.user_id = $1)
          AND ($2::bigint IS NULL OR r.lab_id = $2)
          AND ($3::varchar IS NULL OR r.status = $3)
    "#;

    let total: (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM reservations r {where_clause}"
    ))
    .bind(filter.user_id)
    .bind(filter.lab_id)
    .bind(filter.status)
    .fetch_one(&state.pool)
    .await?;

    let rows = sqlx::query_as::<_, ReservationRow>(&format!(
        r#"
        {RESERVATION_WITH_NAMES}
        {where_clause}
        ORDER BY r.starts_at DESC, r.id DESC
        LIMIT $4 OFFSET $5
        "#,
    ))
    .bind(filter.user_id)
    .bind(filter.lab_id)
    .bind(filter.status)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.pool)
    .await?;

    let items: Vec<ReservationDto> = rows.into_iter().map(ReservationRow::into_dto).collect();

    Ok(Json(ApiResponse::success(PageResponse::new(
        items,
        total.0,
        pagination.page,
        pagination.limit(),
    ))))
}

/// 获取预约详情
///
/// GET /api/portal/reservations/:id
pub async fn get_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ReservationDto>>> {
    let dto = fetch_reservation_dto(&state, id).await?;

    if !claims.is_admin() && claims.user_id()? != dto.user_id {
        return Err(PortalError::Forbidden("只能查看本人的预约".to_string()));
    }

    Ok(Json(ApiResponse::success(dto)))
}
