//! 会员账户实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use super::enums::Tier;
use crate::tier::{self, TierProgress};

/// 通讯偏好
///
/// 被动配置，引擎只读取用于通知渠道筛选，不主动修改
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationPreferences {
    pub email_enabled: bool,
    pub push_enabled: bool,
}

impl Default for CommunicationPreferences {
    fn default() -> Self {
        Self {
            email_enabled: true,
            push_enabled: true,
        }
    }
}

/// 会员账户
///
/// 每个用户身份对应唯一一个会员账户（user_id 上有唯一约束）。
/// 三个余额字段与 tier 必须始终保持一致：
/// - available_points ≥ 0，可兑换余额
/// - total_points ≥ 0，等级计算用余额，兑换时扣减
/// - lifetime_points 单调不减，仅在 earned 时增加
/// - tier == tier_of(total_points)，任何成功变更后都成立
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: Uuid,
    /// 外部用户身份标识
    pub user_id: String,
    /// 通知投递地址
    pub email: String,
    pub available_points: i64,
    pub total_points: i64,
    pub lifetime_points: i64,
    pub tier: Tier,
    // 入住聚合指标，由 earned 流水作为副作用累积，不可独立修改
    pub total_stays: i32,
    pub total_nights: i32,
    pub total_spent_cents: i64,
    pub average_spending_cents: i64,
    pub favorite_properties: Json<Vec<String>>,
    pub preferences: Json<CommunicationPreferences>,
    pub enrolled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    /// 创建零余额的新会员（铜卡、默认通讯偏好）
    pub fn new(user_id: impl Into<String>, email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            email: email.into(),
            available_points: 0,
            total_points: 0,
            lifetime_points: 0,
            tier: Tier::Bronze,
            total_stays: 0,
            total_nights: 0,
            total_spent_cents: 0,
            average_spending_cents: 0,
            favorite_properties: Json(Vec::new()),
            preferences: Json(CommunicationPreferences::default()),
            enrolled_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// 当前等级对应的积分倍率
    pub fn multiplier(&self) -> f64 {
        tier::multiplier_of(self.tier)
    }

    /// 等级进度（派生展示值，不落库）
    pub fn tier_progress(&self) -> TierProgress {
        tier::progress_of(self.total_points)
    }

    /// 累积一次入住的聚合指标
    ///
    /// 由积分引擎在处理预订来源的 earned 流水时调用
    pub fn record_stay(&mut self, amount_cents: i64, nights: i32, property_id: &str) {
        self.total_stays += 1;
        self.total_nights += nights;
        self.total_spent_cents += amount_cents;
        self.average_spending_cents = self.total_spent_cents / i64::from(self.total_stays);
        if !self.favorite_properties.0.iter().any(|p| p == property_id) {
            self.favorite_properties.0.push(property_id.to_string());
        }
    }
}
