//! 奖励目录与兑换记录仓储
//!
//! 奖励目录由运营侧维护，此处只读；兑换记录与扣减流水在同一事务内写入。

use chrono::{DateTime, Datelike, TimeZone, Utc};
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Redemption, Reward};

const REWARD_COLUMNS: &str = r#"
    id, name, description, points_required, is_active, valid_from, valid_to,
    expiry_days, restrictions, created_at, updated_at
"#;

const REDEMPTION_COLUMNS: &str = r#"
    id, member_id, reward_id, transaction_id, points_used, status,
    redeemed_at, expires_at, created_at
"#;

/// 奖励仓储
pub struct RewardRepository {
    pool: PgPool,
}

impl RewardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, reward_id: Uuid) -> Result<Option<Reward>> {
        let reward = sqlx::query_as::<_, Reward>(&format!(
            "SELECT {REWARD_COLUMNS} FROM loyalty_rewards WHERE id = $1"
        ))
        .bind(reward_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reward)
    }

    /// 列出当前上架且在有效期窗口内的奖励
    pub async fn list_available(&self, now: DateTime<Utc>) -> Result<Vec<Reward>> {
        let rewards = sqlx::query_as::<_, Reward>(&format!(
            r#"
            SELECT {REWARD_COLUMNS}
            FROM loyalty_rewards
            WHERE is_active = TRUE
              AND (valid_from IS NULL OR valid_from <= $1)
              AND (valid_to IS NULL OR valid_to >= $1)
            ORDER BY points_required ASC
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rewards)
    }

    /// 统计会员在指定自然年内对某奖励的兑换次数
    ///
    /// 已取消的兑换不计入年度上限
    pub async fn count_redemptions_in_year(
        &self,
        member_id: Uuid,
        reward_id: Uuid,
        year: i32,
    ) -> Result<i64> {
        let (year_start, year_end) = calendar_year_bounds(year);

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS uses
            FROM loyalty_redemptions
            WHERE member_id = $1
              AND reward_id = $2
              AND status <> 'cancelled'
              AND redeemed_at >= $3
              AND redeemed_at < $4
            "#,
        )
        .bind(member_id)
        .bind(reward_id)
        .bind(year_start)
        .bind(year_end)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("uses"))
    }

    /// 在事务中追加兑换记录
    pub async fn create_redemption_in_tx(
        tx: &mut PgConnection,
        redemption: &Redemption,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loyalty_redemptions
                (id, member_id, reward_id, transaction_id, points_used, status,
                 redeemed_at, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(redemption.id)
        .bind(redemption.member_id)
        .bind(redemption.reward_id)
        .bind(redemption.transaction_id)
        .bind(redemption.points_used)
        .bind(redemption.status)
        .bind(redemption.redeemed_at)
        .bind(redemption.expires_at)
        .bind(redemption.created_at)
        .execute(tx)
        .await?;

        Ok(())
    }

    /// 列出会员的兑换历史，按时间倒序
    pub async fn list_redemptions_by_member(
        &self,
        member_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Redemption>> {
        let redemptions = sqlx::query_as::<_, Redemption>(&format!(
            r#"
            SELECT {REDEMPTION_COLUMNS}
            FROM loyalty_redemptions
            WHERE member_id = $1
            ORDER BY redeemed_at DESC
            LIMIT $2
            "#
        ))
        .bind(member_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(redemptions)
    }

    /// 将已过有效期的 active 兑换记录批量置为 expired
    ///
    /// UPDATE 自带状态守卫，重复执行不会改变结果（幂等）
    pub async fn expire_stale_redemptions(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE loyalty_redemptions
            SET status = 'expired'
            WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// 自然年的起止时间（闭开区间）
fn calendar_year_bounds(year: i32) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc
        .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    let end = Utc
        .with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    (start, end)
}

/// 时间点所属的自然年
pub fn calendar_year(now: DateTime<Utc>) -> i32 {
    now.year()
}
