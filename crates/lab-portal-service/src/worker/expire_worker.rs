//! 预约完结处理 Worker
//!
//! 定期扫描已批准且结束时间已过的预约，将其状态置为 completed。
//! 使用 `FOR UPDATE SKIP LOCKED` 保证多实例部署时不会重复处理。

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tracing::{error, info};

/// 预约完结 Worker
///
/// 以固定间隔轮询数据库，批量完结已过期的预约。
/// 设计为可在多实例环境中安全运行。
pub struct ReservationExpireWorker {
    pool: PgPool,
    /// 轮询间隔（建议 300 秒）
    poll_interval: Duration,
    /// 每批处理的最大记录数
    batch_size: i64,
}

/// 待完结的预约记录
#[derive(sqlx::FromRow)]
struct ExpiredReservation {
    id: i64,
}

impl ReservationExpireWorker {
    /// 创建 ReservationExpireWorker 实例
    pub fn new(pool: PgPool, poll_interval_secs: u64, batch_size: i64) -> Self {
        Self {
            pool,
            poll_interval: Duration::from_secs(poll_interval_secs),
            batch_size,
        }
    }

    /// 主循环：持续处理直到进程退出
    pub async fn run(&self) {
        info!(
            poll_interval = ?self.poll_interval,
            batch_size = self.batch_size,
            "ReservationExpireWorker 已启动"
        );

        loop {
            if let Err(e) = self.complete_expired_reservations().await {
                error!(error = %e, "完结过期预约出错");
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// 将结束时间已过的已批准预约置为 completed
    async fn complete_expired_reservations(&self) -> Result<(), sqlx::Error> {
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let reservations = sqlx::query_as::<_, ExpiredReservation>(
            r#"
            SELECT id
            FROM reservations
            WHERE status = 'approved'
              AND ends_at <= $1
            ORDER BY ends_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(self.batch_size)
        .fetch_all(&mut *tx)
        .await?;

        if reservations.is_empty() {
            tx.rollback().await?;
            return Ok(());
        }

        let ids: Vec<i64> = reservations.iter().map(|r| r.id).collect();
        let count = ids.len();

        sqlx::query(
            r#"
            UPDATE reservations
            SET status = 'completed', updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(count, "过期预约已完结");
        Ok(())
    }
}
