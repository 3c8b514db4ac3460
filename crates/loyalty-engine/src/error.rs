//! 积分引擎错误类型
//!
//! 区分业务错误（调用方需要按原因分支处理，作为类型化结果返回）
//! 与系统错误（存储/网络故障，可重试）。

use thiserror::Error;
use uuid::Uuid;

use crate::models::Tier;

/// 积分引擎错误类型
#[derive(Debug, Error)]
pub enum LoyaltyError {
    // === 账户相关错误 ===
    #[error("会员不存在: {0}")]
    MemberNotFound(Uuid),

    #[error("用户身份未注册会员: user_id={0}")]
    UserNotEnrolled(String),

    // === 兑换相关错误 ===
    #[error("奖励不存在: {0}")]
    RewardNotFound(Uuid),

    #[error("积分余额不足: 需要 {required}, 可用 {available}")]
    InsufficientPoints { required: i64, available: i64 },

    #[error("会员等级不满足: 需要 {required}, 当前 {current}")]
    TierNotMet { required: Tier, current: Tier },

    #[error("已达到年度兑换次数上限: reward_id={reward_id}, limit={limit}")]
    UsageLimitExceeded { reward_id: Uuid, limit: i32 },

    #[error("奖励当前不可兑换: reward_id={reward_id}, {reason}")]
    RewardNotRedeemable { reward_id: Uuid, reason: String },

    // === 校验错误 ===
    #[error("参数校验失败: {0}")]
    Validation(String),

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("获取会员锁超时: member_id={0}")]
    LockTimeout(Uuid),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 积分引擎 Result 类型别名
pub type Result<T> = std::result::Result<T, LoyaltyError>;

impl LoyaltyError {
    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::LockTimeout(_))
    }

    /// 检查是否为业务错误（非系统错误）
    ///
    /// 业务错误不代表账本状态异常，调用方按原因分支处理即可
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_) | Self::Serialization(_) | Self::LockTimeout(_) | Self::Internal(_)
        )
    }

    /// 获取错误码（用于对外响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MemberNotFound(_) => "MEMBER_NOT_FOUND",
            Self::UserNotEnrolled(_) => "USER_NOT_ENROLLED",
            Self::RewardNotFound(_) => "REWARD_NOT_FOUND",
            Self::InsufficientPoints { .. } => "INSUFFICIENT_POINTS",
            Self::TierNotMet { .. } => "TIER_NOT_MET",
            Self::UsageLimitExceeded { .. } => "USAGE_LIMIT_EXCEEDED",
            Self::RewardNotRedeemable { .. } => "REWARD_NOT_REDEEMABLE",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::LockTimeout(_) => "LOCK_TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
