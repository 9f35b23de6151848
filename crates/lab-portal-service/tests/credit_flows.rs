//! 额度与积分相关事务流程的集成测试
//!
//! 这些测试依赖本地 PostgreSQL（默认连接配置，可用 LABSIT_DATABASE_URL 覆盖），
//! 全部标记为 `#[ignore]`，按需执行：
//!
//! ```bash
//! cargo test -p lab-portal-service --test credit_flows -- --ignored
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::PgPool;

use lab_portal_service::auth::{Claims, JwtConfig};
use lab_portal_service::dto::{
    CreateReservationRequest, CreateSitinRequest, DecideReservationRequest, RegisterRequest,
};
use lab_portal_service::error::PortalError;
use lab_portal_service::handlers;
use lab_portal_service::models::UserRole;
use lab_portal_service::state::AppState;
use labsit_shared::config::{DatabaseConfig, PortalConfig};
use labsit_shared::database::Database;

static SEQ: AtomicU64 = AtomicU64::new(0);

/// 生成测试内唯一的短标识，避免唯一约束冲突
fn unique_tag() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64;
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{:x}{:02x}", nanos, seq)
}

async fn test_state() -> AppState {
    let mut config = DatabaseConfig::default();
    if let Ok(url) = std::env::var("LABSIT_DATABASE_URL") {
        config.url = url;
    }
    let db = Database::connect(&config).await.unwrap();
    db.run_migrations().await.unwrap();
    AppState::new(db.pool().clone(), JwtConfig::default(), PortalConfig::default())
}

fn claims_for(user_id: i64, id_number: &str, role: UserRole) -> Claims {
    Claims {
        sub: user_id.to_string(),
        username: format!("u{}", user_id),
        id_number: id_number.to_string(),
        role,
        iat: 0,
        exp: i64::MAX,
        iss: "lab-portal-service".to_string(),
    }
}

async fn seed_user(pool: &PgPool, role: &str, credits: i32, points: i32) -> (i64, String) {
    let tag = unique_tag();
    let id_number = format!("T{}", tag);
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO users (id_number, username, password_hash, first_name, last_name,
                           role, session_credits, points)
        VALUES ($1, $2, 'x', '测试', '用户', $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(&id_number)
    .bind(format!("user-{}", tag))
    .bind(role)
    .bind(credits)
    .bind(points)
    .fetch_one(pool)
    .await
    .unwrap();
    (row.0, id_number)
}

async fn seed_admin(pool: &PgPool) -> Claims {
    let (id, id_number) = seed_user(pool, "admin", 0, 0).await;
    claims_for(id, &id_number, UserRole::Admin)
}

/// 创建一个实验室，并为一周每天配置 00:00-23:59:59 的开放窗口
async fn seed_lab(pool: &PgPool) -> i64 {
    let lab: (i64,) = sqlx::query_as("INSERT INTO labs (name) VALUES ($1) RETURNING id")
        .bind(format!("Lab-{}", unique_tag()))
        .fetch_one(pool)
        .await
        .unwrap();
    for weekday in 0..7i16 {
        sqlx::query(
            "INSERT INTO lab_schedules (lab_id, weekday, open_time, close_time) \
             VALUES ($1, $2, '00:00:00', '23:59:59')",
        )
        .bind(lab.0)
        .bind(weekday)
        .execute(pool)
        .await
        .unwrap();
    }
    lab.0
}

async fn seed_computer(pool: &PgPool, lab_id: i64) -> i64 {
    let row: (i64,) =
        sqlx::query_as("INSERT INTO computers (lab_id, label) VALUES ($1, $2) RETURNING id")
            .bind(lab_id)
            .bind(format!("PC-{}", unique_tag()))
            .fetch_one(pool)
            .await
            .unwrap();
    row.0
}

async fn credits_of(pool: &PgPool, user_id: i64) -> i32 {
    let row: (i32,) = sqlx::query_as("SELECT session_credits FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap();
    row.0
}

async fn ledger_entries(pool: &PgPool, user_id: i64, change_type: &str) -> Vec<i32> {
    let rows: Vec<(i32,)> = sqlx::query_as(
        "SELECT delta FROM session_ledger WHERE user_id = $1 AND change_type = $2 ORDER BY id",
    )
    .bind(user_id)
    .bind(change_type)
    .fetch_all(pool)
    .await
    .unwrap();
    rows.into_iter().map(|r| r.0).collect()
}

async fn computer_status(pool: &PgPool, computer_id: i64) -> String {
    let row: (String,) = sqlx::query_as("SELECT status FROM computers WHERE id = $1")
        .bind(computer_id)
        .fetch_one(pool)
        .await
        .unwrap();
    row.0
}

/// 在未来某天（保证落在开放窗口内）构造同一自然日的预约时段
fn future_slot(start_hour: u32, start_min: u32, end_hour: u32, end_min: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    let day = (Utc::now() + Duration::days(2)).date_naive();
    (
        Utc.from_utc_datetime(&day.and_hms_opt(start_hour, start_min, 0).unwrap()),
        Utc.from_utc_datetime(&day.and_hms_opt(end_hour, end_min, 0).unwrap()),
    )
}

#[tokio::test]
#[ignore] // 需要本地 PostgreSQL
async fn sitin_login_deducts_credit_in_one_transaction() {
    let state = test_state().await;
    let admin = seed_admin(&state.pool).await;
    let (student_id, id_number) = seed_user(&state.pool, "student", 5, 0).await;
    let lab_id = seed_lab(&state.pool).await;
    let computer_id = seed_computer(&state.pool, lab_id).await;

    let resp = handlers::sitin::create_sitin(
        State(state.clone()),
        Extension(admin.clone()),
        Json(CreateSitinRequest {
            id_number: id_number.clone(),
            computer_id,
            purpose: "Java Programming".to_string(),
        }),
    )
    .await
    .unwrap();
    let sitin = resp.0.data.unwrap();

    // 额度扣减、流水、设备占用在同一事务内全部落库
    assert_eq!(credits_of(&state.pool, student_id).await, 4);
    assert_eq!(ledger_entries(&state.pool, student_id, "sitin").await, vec![-1]);
    assert_eq!(computer_status(&state.pool, computer_id).await, "in_use");

    // 同一学生不允许第二条进行中的上机记录
    let other_computer = seed_computer(&state.pool, lab_id).await;
    let err = handlers::sitin::create_sitin(
        State(state.clone()),
        Extension(admin.clone()),
        Json(CreateSitinRequest {
            id_number: id_number.clone(),
            computer_id: other_computer,
            purpose: "C Programming".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PortalError::AlreadySittingIn));

    // 签退释放设备，额度不退还
    handlers::sitin::logout_sitin(State(state.clone()), Extension(admin), Path(sitin.id))
        .await
        .unwrap();
    assert_eq!(computer_status(&state.pool, computer_id).await, "available");
    assert_eq!(credits_of(&state.pool, student_id).await, 4);
}

#[tokio::test]
#[ignore] // 需要本地 PostgreSQL
async fn reward_applies_once_and_converts_points_to_credit() {
    let state = test_state().await;
    let admin = seed_admin(&state.pool).await;
    // 已有 2 积分：再 +1 恰好满 points_per_credit=3，触发兑换
    let (student_id, id_number) = seed_user(&state.pool, "student", 5, 2).await;
    let lab_id = seed_lab(&state.pool).await;
    let computer_id = seed_computer(&state.pool, lab_id).await;

    let resp = handlers::sitin::create_sitin(
        State(state.clone()),
        Extension(admin.clone()),
        Json(CreateSitinRequest {
            id_number,
            computer_id,
            purpose: "Python".to_string(),
        }),
    )
    .await
    .unwrap();
    let sitin_id = resp.0.data.unwrap().id;

    handlers::sitin::logout_sitin(State(state.clone()), Extension(admin.clone()), Path(sitin_id))
        .await
        .unwrap();

    let rewarded = handlers::sitin::reward_sitin(
        State(state.clone()),
        Extension(admin.clone()),
        Path(sitin_id),
    )
    .await
    .unwrap();
    assert!(rewarded.0.data.unwrap().rewarded);

    let points: (i32,) = sqlx::query_as("SELECT points FROM users WHERE id = $1")
        .bind(student_id)
        .fetch_one(&state.pool)
        .await
        .unwrap();
    assert_eq!(points.0, 3);
    // 签到扣 1、积分兑换还 1
    assert_eq!(credits_of(&state.pool, student_id).await, 5);
    assert_eq!(ledger_entries(&state.pool, student_id, "reward").await, vec![1]);

    // 同一条上机记录不允许二次奖励
    let err = handlers::sitin::reward_sitin(State(state.clone()), Extension(admin), Path(sitin_id))
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::AlreadyRewarded));
}

#[tokio::test]
#[ignore] // 需要本地 PostgreSQL
async fn reservation_reject_refunds_credit_with_ledger() {
    let state = test_state().await;
    let admin = seed_admin(&state.pool).await;
    let (student_id, id_number) = seed_user(&state.pool, "student", 3, 0).await;
    let student = claims_for(student_id, &id_number, UserRole::Student);
    let lab_id = seed_lab(&state.pool).await;
    let computer_id = seed_computer(&state.pool, lab_id).await;

    let (starts_at, ends_at) = future_slot(10, 0, 11, 0);
    let resp = handlers::reservation::create_reservation(
        State(state.clone()),
        Extension(student),
        Json(CreateReservationRequest {
            computer_id,
            purpose: "课程设计".to_string(),
            starts_at,
            ends_at,
        }),
    )
    .await
    .unwrap();
    let reservation_id = resp.0.data.unwrap().id;

    // 提交即扣减并留痕
    assert_eq!(credits_of(&state.pool, student_id).await, 2);
    assert_eq!(
        ledger_entries(&state.pool, student_id, "reservation_request").await,
        vec![-1]
    );

    handlers::reservation::reject_reservation(
        State(state.clone()),
        Extension(admin),
        Path(reservation_id),
        Json(DecideReservationRequest::default()),
    )
    .await
    .unwrap();

    // 驳回后同一事务退还额度并写入退款流水
    assert_eq!(credits_of(&state.pool, student_id).await, 3);
    assert_eq!(
        ledger_entries(&state.pool, student_id, "reservation_refund").await,
        vec![1]
    );
}

#[tokio::test]
#[ignore] // 需要本地 PostgreSQL
async fn reservation_cancel_refunds_credit() {
    let state = test_state().await;
    let (student_id, id_number) = seed_user(&state.pool, "student", 3, 0).await;
    let student = claims_for(student_id, &id_number, UserRole::Student);
    let lab_id = seed_lab(&state.pool).await;
    let computer_id = seed_computer(&state.pool, lab_id).await;

    let (starts_at, ends_at) = future_slot(14, 0, 16, 0);
    let resp = handlers::reservation::create_reservation(
        State(state.clone()),
        Extension(student.clone()),
        Json(CreateReservationRequest {
            computer_id,
            purpose: "自习".to_string(),
            starts_at,
            ends_at,
        }),
    )
    .await
    .unwrap();
    let reservation_id = resp.0.data.unwrap().id;
    assert_eq!(credits_of(&state.pool, student_id).await, 2);

    handlers::reservation::cancel_reservation(
        State(state.clone()),
        Extension(student),
        Path(reservation_id),
    )
    .await
    .unwrap();

    assert_eq!(credits_of(&state.pool, student_id).await, 3);
    assert_eq!(
        ledger_entries(&state.pool, student_id, "reservation_refund").await,
        vec![1]
    );
}

#[tokio::test]
#[ignore] // 需要本地 PostgreSQL
async fn back_to_back_reservations_do_not_conflict() {
    let state = test_state().await;
    let (first_id, first_idn) = seed_user(&state.pool, "student", 3, 0).await;
    let (second_id, second_idn) = seed_user(&state.pool, "student", 3, 0).await;
    let lab_id = seed_lab(&state.pool).await;
    let computer_id = seed_computer(&state.pool, lab_id).await;

    let (starts_at, ends_at) = future_slot(10, 0, 11, 0);
    handlers::reservation::create_reservation(
        State(state.clone()),
        Extension(claims_for(first_id, &first_idn, UserRole::Student)),
        Json(CreateReservationRequest {
            computer_id,
            purpose: "实验报告".to_string(),
            starts_at,
            ends_at,
        }),
    )
    .await
    .unwrap();

    // 首尾相接（上一段的结束 == 下一段的开始）不算冲突
    let (next_start, next_end) = future_slot(11, 0, 12, 0);
    handlers::reservation::create_reservation(
        State(state.clone()),
        Extension(claims_for(second_id, &second_idn, UserRole::Student)),
        Json(CreateReservationRequest {
            computer_id,
            purpose: "实验报告".to_string(),
            starts_at: next_start,
            ends_at: next_end,
        }),
    )
    .await
    .unwrap();

    // 真正相交的时段被拒绝，且不扣减额度
    let (overlap_start, overlap_end) = future_slot(10, 30, 11, 30);
    let err = handlers::reservation::create_reservation(
        State(state.clone()),
        Extension(claims_for(second_id, &second_idn, UserRole::Student)),
        Json(CreateReservationRequest {
            computer_id,
            purpose: "实验报告".to_string(),
            starts_at: overlap_start,
            ends_at: overlap_end,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PortalError::ReservationConflict));
    assert_eq!(credits_of(&state.pool, second_id).await, 2);
}

#[tokio::test]
#[ignore] // 需要本地 PostgreSQL
async fn duplicate_register_returns_conflict() {
    let state = test_state().await;
    let tag = unique_tag();
    let request = || RegisterRequest {
        id_number: format!("R{}", tag),
        username: format!("reg-{}", tag),
        password: "secret123".to_string(),
        first_name: "Juan".to_string(),
        middle_name: None,
        last_name: "Dela Cruz".to_string(),
        email: None,
        course: None,
        year_level: None,
    };

    handlers::auth::register(State(state.clone()), Json(request()))
        .await
        .unwrap();

    let err = handlers::auth::register(State(state.clone()), Json(request()))
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::DuplicateUser(_)));
}

#[tokio::test]
#[ignore] // 需要本地 PostgreSQL
async fn unique_violation_on_insert_maps_to_duplicate_user() {
    let state = test_state().await;
    let (_, id_number) = seed_user(&state.pool, "student", 1, 0).await;

    // 并发注册绕过存在性预检查时，底层唯一约束报错必须转成 409 而非 500
    let err = sqlx::query(
        "INSERT INTO users (id_number, username, password_hash, first_name, last_name) \
         VALUES ($1, $2, 'x', '重复', '学号')",
    )
    .bind(&id_number)
    .bind(format!("dup-{}", unique_tag()))
    .execute(&state.pool)
    .await
    .unwrap_err();

    let mapped = handlers::auth::map_register_insert_error(err, &id_number);
    assert!(matches!(mapped, PortalError::DuplicateUser(n) if n == id_number));

    let other = handlers::auth::map_register_insert_error(sqlx::Error::RowNotFound, &id_number);
    assert!(matches!(other, PortalError::Database(_)));
}
