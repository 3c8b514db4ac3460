//! 运营统计查询服务
//!
//! 只读的聚合查询，用于运营侧了解计划整体健康度：
//! 等级分布、积分发放/兑换/过期总量、兑换率等。
//! 查询直接走聚合 SQL，不经过账本管道。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::instrument;

use crate::error::Result;
use crate::models::Tier;

/// 等级分布项
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierDistributionDto {
    pub tier: Tier,
    pub member_count: i64,
}

/// 计划总览统计
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramStatsDto {
    pub total_members: i64,
    pub tier_distribution: Vec<TierDistributionDto>,
    /// 历史发放总积分（earned + bonus + 正向调整）
    pub points_issued: i64,
    pub points_redeemed: i64,
    pub points_expired: i64,
    /// 兑换率 = 已兑换 / 已发放
    pub redemption_rate: f64,
    pub generated_at: DateTime<Utc>,
}

/// 运营统计查询服务
pub struct QueryService {
    pool: PgPool,
}

impl QueryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 计划总览统计
    #[instrument(skip(self))]
    pub async fn program_stats(&self) -> Result<ProgramStatsDto> {
        let tier_distribution = self.tier_distribution().await?;
        let total_members = tier_distribution.iter().map(|d| d.member_count).sum();

        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(points) FILTER (WHERE tx_type IN ('EARNED', 'BONUS')), 0)::BIGINT
                    AS issued,
                COALESCE(SUM(adjustment_delta) FILTER
                    (WHERE tx_type = 'ADJUSTED' AND adjustment_delta > 0), 0)::BIGINT
                    AS adjusted_in,
                COALESCE(SUM(points) FILTER (WHERE tx_type = 'REDEEMED'), 0)::BIGINT
                    AS redeemed,
                COALESCE(SUM(points) FILTER (WHERE tx_type = 'EXPIRED'), 0)::BIGINT
                    AS expired
            FROM loyalty_transactions
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let issued: i64 = row.get::<i64, _>("issued") + row.get::<i64, _>("adjusted_in");
        let redeemed: i64 = row.get("redeemed");
        let expired: i64 = row.get("expired");

        let redemption_rate = if issued > 0 {
            redeemed as f64 / issued as f64
        } else {
            0.0
        };

        Ok(ProgramStatsDto {
            total_members,
            tier_distribution,
            points_issued: issued,
            points_redeemed: redeemed,
            points_expired: expired,
            redemption_rate,
            generated_at: Utc::now(),
        })
    }

    /// 会员等级分布
    #[instrument(skip(self))]
    pub async fn tier_distribution(&self) -> Result<Vec<TierDistributionDto>> {
        let rows = sqlx::query(
            r#"
            SELECT tier, COUNT(*)::BIGINT AS member_count
            FROM loyalty_members
            GROUP BY tier
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut distribution: Vec<TierDistributionDto> = rows
            .into_iter()
            .map(|row| {
                Ok(TierDistributionDto {
                    tier: row.try_get("tier")?,
                    member_count: row.try_get("member_count")?,
                })
            })
            .collect::<Result<_>>()?;

        // 按等级序号升序，便于展示
        distribution.sort_by_key(|d| d.tier.rank());
        Ok(distribution)
    }
}
