//! 服务层数据传输对象
//!
//! 定义服务层与外部交互使用的 DTO，与内部领域模型解耦

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    PointsSource, RedemptionStatus, Tier, Transaction, TransactionType,
};
use crate::tier::TierProgress;

/// 会员注册请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    pub user_id: String,
    pub email: String,
}

impl EnrollRequest {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
        }
    }
}

/// 会员注册结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollResponse {
    pub member_id: Uuid,
    pub user_id: String,
    pub tier: Tier,
    /// false 表示该 user_id 已注册，返回的是已有会员
    pub newly_enrolled: bool,
    pub enrolled_at: DateTime<Utc>,
}

/// 已完成入住
///
/// 积分累积的主要来源，由订单系统在入住结算后上报
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedStay {
    /// 订单号，幂等键：同一订单号只入账一次
    pub booking_ref: String,
    pub member_id: Uuid,
    /// 消费金额（分）
    pub amount_cents: i64,
    pub nights: i32,
    pub property_id: String,
}

/// 手动积分调整请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustPointsRequest {
    pub member_id: Uuid,
    /// 带符号的调整量，正数为增加，负数为扣减
    pub delta: i64,
    /// 是否计入等级进度（total_points；lifetime_points 只增不减，调整从不触碰）
    pub affects_tier: bool,
    pub reason: String,
}

/// 非入住来源的积分授予请求（评价、推荐、活动）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantPointsRequest {
    pub member_id: Uuid,
    pub base_points: i64,
    pub source: PointsSource,
    pub description: String,
}

/// 积分事务处理结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub transaction_id: Uuid,
    pub member_id: Uuid,
    pub transaction_type: TransactionType,
    /// 本次写入的积分量（含等级倍率）
    pub points: i64,
    pub balance_after: i64,
    pub tier: Tier,
    /// 本次操作触发的等级变化
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier_changed_from: Option<Tier>,
    /// 升级奖励积分（仅升级时存在）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus_points: Option<i64>,
    /// true 表示幂等命中，返回的是已存在的事务
    pub duplicate: bool,
}

impl TransactionResponse {
    /// 从已存在的入账事务构造幂等响应
    pub fn from_existing(tx: &Transaction, tier: Tier) -> Self {
        Self {
            transaction_id: tx.id,
            member_id: tx.member_id,
            transaction_type: tx.tx_type,
            points: tx.points,
            balance_after: tx.balance_after,
            tier,
            tier_changed_from: None,
            bonus_points: None,
            duplicate: true,
        }
    }
}

/// 兑换请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub member_id: Uuid,
    pub reward_id: Uuid,
}

/// 兑换结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    pub redemption_id: Uuid,
    pub transaction_id: Uuid,
    pub reward_name: String,
    pub points_used: i64,
    pub balance_after: i64,
    pub tier: Tier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// 会员概要 DTO
///
/// 会员的余额、等级与进度快照
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummaryDto {
    pub member_id: Uuid,
    pub user_id: String,
    pub email: String,
    pub available_points: i64,
    pub total_points: i64,
    pub lifetime_points: i64,
    pub tier: Tier,
    pub multiplier: f64,
    pub progress: TierProgress,
    pub total_stays: i32,
    pub total_nights: i32,
    pub enrolled_at: DateTime<Utc>,
}

/// 兑换历史 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionHistoryDto {
    pub redemption_id: Uuid,
    pub reward_id: Uuid,
    pub reward_name: String,
    pub points_used: i64,
    pub status: RedemptionStatus,
    pub redeemed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// 过期清扫结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirySweepReport {
    /// 扫描到的候选事务数
    pub candidates: usize,
    /// 成功过期的事务数
    pub expired: usize,
    /// 实际扣除的总积分（可能小于名义过期量）
    pub points_expired: i64,
    /// 处理失败的事务数（下一轮重试）
    pub failures: usize,
    /// 标记为过期的兑换记录数
    pub redemptions_expired: u64,
}
