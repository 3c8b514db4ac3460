//! 积分引擎枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 会员等级
///
/// 有序的会员层级，由 total_points 纯函数推导（见 tier 模块）。
/// 等级只在 tier 模块中与阈值绑定，调整业务阈值不影响变更逻辑。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum Tier {
    /// 铜卡 - 入门等级
    #[default]
    Bronze,
    /// 银卡
    Silver,
    /// 金卡
    Gold,
    /// 白金卡
    Platinum,
    /// 钻石卡 - 最高等级
    Diamond,
}

impl Tier {
    /// 等级序号（bronze=1 .. diamond=5），用于最低等级限制比较和升级奖励计算
    pub fn rank(&self) -> i32 {
        match self {
            Tier::Bronze => 1,
            Tier::Silver => 2,
            Tier::Gold => 3,
            Tier::Platinum => 4,
            Tier::Diamond => 5,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
            Tier::Platinum => "platinum",
            Tier::Diamond => "diamond",
        };
        write!(f, "{s}")
    }
}

/// 流水类型
///
/// 积分账本中每条流水的性质，points 字段恒为非负数值，
/// 加减方向由类型决定（adjusted 由 adjustment_delta 决定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// 赚取（+）- 入住完成等业务行为产生的积分
    Earned,
    /// 兑换消耗（-）- 用于兑换奖励
    Redeemed,
    /// 过期（-）- 积分有效期结束
    Expired,
    /// 人工调整（±）- 方向由 adjustment_delta 符号决定
    Adjusted,
    /// 奖励积分（+）- 升级奖励或促销活动
    Bonus,
}

/// 积分来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointsSource {
    /// 预订入住
    Booking,
    /// 点评奖励
    Review,
    /// 推荐奖励
    Referral,
    /// 促销活动
    Promotion,
    /// 人工调整
    Adjustment,
    /// 奖励发放
    Bonus,
    /// 奖励兑换
    Redemption,
}

/// 兑换记录状态
///
/// 追踪已兑换奖励实例的生命周期
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum RedemptionStatus {
    /// 有效 - 可使用
    #[default]
    Active,
    /// 已使用
    Used,
    /// 已过期 - 超过奖励有效期
    Expired,
    /// 已取消 - 运营撤回
    Cancelled,
}
