//! 奖励目录与兑换记录实体定义

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{RedemptionStatus, Tier};
use crate::error::{LoyaltyError, Result};
use crate::models::Member;

/// 奖励兑换限制
///
/// 封闭的可选字段集合（而非开放字典），保证资格评估可穷尽、可静态检查
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardRestrictions {
    /// 兑换所需最低会员等级
    #[serde(default)]
    pub minimum_tier: Option<Tier>,
    /// 每个会员每自然年最多兑换次数
    #[serde(default)]
    pub maximum_uses_per_year: Option<i32>,
    /// 不可兑换日期
    #[serde(default)]
    pub blackout_dates: Vec<NaiveDate>,
    /// 历史消费门槛（分）
    #[serde(default)]
    pub minimum_spend_cents: Option<i64>,
    /// 历史间夜门槛
    #[serde(default)]
    pub minimum_nights: Option<i32>,
}

/// 奖励目录条目
///
/// 由运营侧维护，引擎只读
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub points_required: i64,
    pub is_active: bool,
    #[sqlx(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub valid_to: Option<DateTime<Utc>>,
    /// 兑换实例的有效天数（null 表示不过期）
    #[sqlx(default)]
    pub expiry_days: Option<i32>,
    /// 兑换限制（JSONB 列）
    pub restrictions: sqlx::types::Json<RewardRestrictions>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reward {
    /// 检查奖励当前是否上架且在有效期窗口内
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.valid_from.is_none_or(|t| now >= t)
            && self.valid_to.is_none_or(|t| now <= t)
    }

    /// 会员视角的目录可见性：上架、在有效期内、余额可负担且满足等级门槛
    ///
    /// 次数上限、黑名单日期等依赖兑换时刻状态的限制不在此评估，
    /// 留给 `check_eligibility` 在实际兑换时把关。
    pub fn is_visible_to(&self, member: &Member, now: DateTime<Utc>) -> bool {
        self.is_available(now)
            && member.available_points >= self.points_required
            && self
                .restrictions
                .0
                .minimum_tier
                .is_none_or(|t| member.tier.rank() >= t.rank())
    }

    /// 评估会员对该奖励的兑换资格
    ///
    /// 全部检查在任何写入之前执行；任一失败返回类型化错误，
    /// 调用方保证此时不发生任何余额或历史记录的变更。
    pub fn check_eligibility(
        &self,
        member: &Member,
        uses_this_year: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.is_available(now) {
            return Err(LoyaltyError::RewardNotRedeemable {
                reward_id: self.id,
                reason: "奖励未上架或不在有效期内".to_string(),
            });
        }

        if member.available_points < self.points_required {
            return Err(LoyaltyError::InsufficientPoints {
                required: self.points_required,
                available: member.available_points,
            });
        }

        let r = &self.restrictions.0;

        if let Some(minimum_tier) = r.minimum_tier
            && member.tier.rank() < minimum_tier.rank()
        {
            return Err(LoyaltyError::TierNotMet {
                required: minimum_tier,
                current: member.tier,
            });
        }

        if let Some(limit) = r.maximum_uses_per_year
            && uses_this_year >= i64::from(limit)
        {
            return Err(LoyaltyError::UsageLimitExceeded {
                reward_id: self.id,
                limit,
            });
        }

        if r.blackout_dates.contains(&now.date_naive()) {
            return Err(LoyaltyError::RewardNotRedeemable {
                reward_id: self.id,
                reason: format!("当日不可兑换: {}", now.date_naive()),
            });
        }

        if let Some(minimum_spend) = r.minimum_spend_cents
            && member.total_spent_cents < minimum_spend
        {
            return Err(LoyaltyError::RewardNotRedeemable {
                reward_id: self.id,
                reason: format!(
                    "历史消费未达门槛: 需要 {}, 实际 {}",
                    minimum_spend, member.total_spent_cents
                ),
            });
        }

        if let Some(minimum_nights) = r.minimum_nights
            && member.total_nights < minimum_nights
        {
            return Err(LoyaltyError::RewardNotRedeemable {
                reward_id: self.id,
                reason: format!(
                    "历史间夜未达门槛: 需要 {}, 实际 {}",
                    minimum_nights, member.total_nights
                ),
            });
        }

        Ok(())
    }
}

/// 兑换记录
///
/// 追加到会员兑换历史的不可变记录，与扣减积分的 redeemed 流水
/// 在同一事务内创建，绝不单独存在
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub id: Uuid,
    pub member_id: Uuid,
    pub reward_id: Uuid,
    /// 关联的 redeemed 流水
    pub transaction_id: Uuid,
    pub points_used: i64,
    pub status: RedemptionStatus,
    pub redeemed_at: DateTime<Utc>,
    /// 兑换实例的过期时间（= redeemed_at + reward.expiry_days，如设置）
    #[sqlx(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
