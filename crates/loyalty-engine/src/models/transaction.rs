//! 积分流水实体定义
//!
//! 流水一经写入不再修改、不被删除：过期通过追加 expired 流水扣减余额，
//! 而不是编辑原始 earned 流水（仅回填 expiry_posted_at 标记防止重复扣减）。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{PointsSource, TransactionType};

/// earned 积分的有效期（天）
pub const EARNED_POINTS_VALIDITY_DAYS: i64 = 365;

/// 积分流水
///
/// 采用复式记账思想：points 恒为非负数值，加减方向由 tx_type 决定
/// （adjusted 的方向由 adjustment_delta 符号决定），balance_after
/// 记录变动后的可用余额，保证每条流水可独立审计。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub member_id: Uuid,
    pub tx_type: TransactionType,
    /// 变动数值（恒为非负）
    pub points: i64,
    /// 变动后的可用余额
    pub balance_after: i64,
    pub description: String,
    pub source: PointsSource,
    /// 关联的预订号（预订来源的 earned 流水；幂等去重键）
    #[sqlx(default)]
    pub booking_ref: Option<String>,
    /// 关联的奖励 ID（redeemed 流水）
    #[sqlx(default)]
    pub reward_id: Option<Uuid>,
    /// 倍率前的基础积分（earned/bonus 流水的审计字段）
    #[sqlx(default)]
    pub base_points: Option<i64>,
    /// 应用的等级倍率（earned/bonus 流水的审计字段）
    #[sqlx(default)]
    pub multiplier: Option<f64>,
    /// 带符号的调整值（仅 adjusted 流水）
    #[sqlx(default)]
    pub adjustment_delta: Option<i64>,
    /// 调整是否影响等级积分（仅 adjusted 流水）
    pub tier_affecting: bool,
    /// 过期时间（仅 earned 流水，= transaction_date + 1 年）
    #[sqlx(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// 过期扣减已入账的标记，防止清扫任务重复扣减
    #[sqlx(default)]
    pub expiry_posted_at: Option<DateTime<Utc>>,
    /// 过期流水回指的原始 earned 流水
    #[sqlx(default)]
    pub source_transaction_id: Option<Uuid>,
    pub transaction_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// 计算 earned 流水的过期时间
    pub fn expiry_for(transaction_date: DateTime<Utc>) -> DateTime<Utc> {
        transaction_date + Duration::days(EARNED_POINTS_VALIDITY_DAYS)
    }

    /// 该流水对可用余额的实际变动值（带符号）
    pub fn signed_points(&self) -> i64 {
        match self.tx_type {
            TransactionType::Earned | TransactionType::Bonus => self.points,
            TransactionType::Redeemed | TransactionType::Expired => -self.points,
            TransactionType::Adjusted => self.adjustment_delta.unwrap_or(0),
        }
    }

    /// 是否已过期且尚未入账过期扣减
    pub fn is_expirable(&self, now: DateTime<Utc>) -> bool {
        self.tx_type == TransactionType::Earned
            && self.expiry_posted_at.is_none()
            && self.expires_at.is_some_and(|t| now > t)
    }
}
