//! 积分流水仓储
//!
//! 流水只追加不修改；唯一的例外是 expiry_posted_at 标记回填，
//! 保证过期清扫的幂等性（每条 earned 流水最多产生一条过期扣减）。

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::Result;
use crate::models::Transaction;

const TRANSACTION_COLUMNS: &str = r#"
    id, member_id, tx_type, points, balance_after, description, source,
    booking_ref, reward_id, base_points, multiplier, adjustment_delta,
    tier_affecting, expires_at, expiry_posted_at, source_transaction_id,
    transaction_date, created_at
"#;

/// 积分流水仓储
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 在事务中追加一条流水
    pub async fn create_in_tx(tx: &mut PgConnection, transaction: &Transaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loyalty_transactions
                (id, member_id, tx_type, points, balance_after, description, source,
                 booking_ref, reward_id, base_points, multiplier, adjustment_delta,
                 tier_affecting, expires_at, expiry_posted_at, source_transaction_id,
                 transaction_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.member_id)
        .bind(transaction.tx_type)
        .bind(transaction.points)
        .bind(transaction.balance_after)
        .bind(&transaction.description)
        .bind(transaction.source)
        .bind(&transaction.booking_ref)
        .bind(transaction.reward_id)
        .bind(transaction.base_points)
        .bind(transaction.multiplier)
        .bind(transaction.adjustment_delta)
        .bind(transaction.tier_affecting)
        .bind(transaction.expires_at)
        .bind(transaction.expiry_posted_at)
        .bind(transaction.source_transaction_id)
        .bind(transaction.transaction_date)
        .bind(transaction.created_at)
        .execute(tx)
        .await?;

        Ok(())
    }

    /// 按预订号查询 earned 流水（预订入账的幂等去重键）
    pub async fn get_by_booking_ref(&self, booking_ref: &str) -> Result<Option<Transaction>> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM loyalty_transactions
            WHERE booking_ref = $1 AND tx_type = 'EARNED'
            "#
        ))
        .bind(booking_ref)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    /// 列出会员的流水，按时间倒序返回最近的 limit 条
    pub async fn list_by_member(&self, member_id: Uuid, limit: i64) -> Result<Vec<Transaction>> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM loyalty_transactions
            WHERE member_id = $1
            ORDER BY transaction_date DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(member_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    /// 扫描已过有效期且尚未入账过期扣减的 earned 流水
    ///
    /// 按过期时间升序分批返回，供清扫任务处理
    pub async fn list_expirable(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Transaction>> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM loyalty_transactions
            WHERE tx_type = 'EARNED'
              AND expires_at < $1
              AND expiry_posted_at IS NULL
            ORDER BY expires_at ASC
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    /// 在事务中回填过期入账标记
    ///
    /// 带 `expiry_posted_at IS NULL` 守卫：返回 false 表示标记已被
    /// 其他清扫入账过，调用方必须跳过这条流水（重试安全）
    pub async fn mark_expiry_posted_in_tx(
        tx: &mut PgConnection,
        transaction_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE loyalty_transactions
            SET expiry_posted_at = $2
            WHERE id = $1 AND expiry_posted_at IS NULL
            "#,
        )
        .bind(transaction_id)
        .bind(now)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
