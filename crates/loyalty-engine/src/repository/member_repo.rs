//! 会员账户仓储
//!
//! 提供会员账户的数据访问。注册走 INSERT .. ON CONFLICT DO NOTHING，
//! user_id 上的唯一约束保证并发首次注册不会产生两个账户。

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::traits::MemberRepositoryTrait;
use crate::error::Result;
use crate::models::Member;

const MEMBER_COLUMNS: &str = r#"
    id, user_id, email, available_points, total_points, lifetime_points, tier,
    total_stays, total_nights, total_spent_cents, average_spending_cents,
    favorite_properties, preferences, enrolled_at, created_at, updated_at
"#;

/// 会员账户仓储
pub struct MemberRepository {
    pool: PgPool,
}

impl MemberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 在事务中按主键加载会员并加行锁（FOR UPDATE）
    ///
    /// 账本事件应用期间持有行锁，与进程内会员锁共同保证
    /// 读-改-写串行化
    pub async fn get_for_update_in_tx(
        tx: &mut PgConnection,
        member_id: Uuid,
    ) -> Result<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM loyalty_members WHERE id = $1 FOR UPDATE"
        ))
        .bind(member_id)
        .fetch_optional(tx)
        .await?;

        Ok(member)
    }

    /// 在事务中回写会员的全部可变字段
    pub async fn update_in_tx(tx: &mut PgConnection, member: &Member) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE loyalty_members
            SET available_points = $2,
                total_points = $3,
                lifetime_points = $4,
                tier = $5,
                total_stays = $6,
                total_nights = $7,
                total_spent_cents = $8,
                average_spending_cents = $9,
                favorite_properties = $10,
                preferences = $11,
                updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(member.id)
        .bind(member.available_points)
        .bind(member.total_points)
        .bind(member.lifetime_points)
        .bind(member.tier)
        .bind(member.total_stays)
        .bind(member.total_nights)
        .bind(member.total_spent_cents)
        .bind(member.average_spending_cents)
        .bind(&member.favorite_properties)
        .bind(&member.preferences)
        .bind(member.updated_at)
        .execute(tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MemberRepositoryTrait for MemberRepository {
    /// 创建会员，user_id 冲突时不写入并返回 false
    ///
    /// 并发注册的败方拿到 false 后应退化为按 user_id 查询
    async fn insert_if_absent(&self, member: &Member) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO loyalty_members
                (id, user_id, email, available_points, total_points, lifetime_points, tier,
                 total_stays, total_nights, total_spent_cents, average_spending_cents,
                 favorite_properties, preferences, enrolled_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(member.id)
        .bind(&member.user_id)
        .bind(&member.email)
        .bind(member.available_points)
        .bind(member.total_points)
        .bind(member.lifetime_points)
        .bind(member.tier)
        .bind(member.total_stays)
        .bind(member.total_nights)
        .bind(member.total_spent_cents)
        .bind(member.average_spending_cents)
        .bind(&member.favorite_properties)
        .bind(&member.preferences)
        .bind(member.enrolled_at)
        .bind(member.created_at)
        .bind(member.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_by_id(&self, member_id: Uuid) -> Result<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM loyalty_members WHERE id = $1"
        ))
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(member)
    }

    async fn get_by_user_id(&self, user_id: &str) -> Result<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM loyalty_members WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(member)
    }
}
