//! 等级计算器
//!
//! 由等级积分推导会员等级、进度和积分倍率的纯函数集合。
//! 无状态、无 IO、全定义域——业务阈值只在此处定义，
//! 调整阈值不需要触碰任何变更逻辑。

use serde::{Deserialize, Serialize};

use crate::models::Tier;

/// 各等级的准入阈值（等级积分），升序
const THRESHOLDS: [(Tier, i64); 5] = [
    (Tier::Bronze, 0),
    (Tier::Silver, 2_500),
    (Tier::Gold, 7_500),
    (Tier::Platinum, 15_000),
    (Tier::Diamond, 30_000),
];

/// 等级进度（派生展示值，非权威数据）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierProgress {
    /// 当前等级的准入阈值
    pub current_threshold: i64,
    /// 下一等级的准入阈值（最高等级时为 None）
    pub next_threshold: Option<i64>,
    /// 到下一等级的完成百分比，[0, 100]，最高等级恒为 100
    pub percentage: f64,
}

/// 等级积分对应的会员等级
///
/// 取阈值不超过 total_points 的最高等级
pub fn tier_of(total_points: i64) -> Tier {
    let mut tier = Tier::Bronze;
    for (candidate, threshold) in THRESHOLDS {
        if total_points >= threshold {
            tier = candidate;
        }
    }
    tier
}

/// 指定等级的准入阈值
pub fn threshold_of(tier: Tier) -> i64 {
    THRESHOLDS
        .iter()
        .find(|(t, _)| *t == tier)
        .map(|(_, threshold)| *threshold)
        .unwrap_or(0)
}

/// 等级积分对应的进度信息
///
/// 最高等级时百分比为 100；否则在当前与下一阈值之间线性插值并钳制到 [0, 100]
pub fn progress_of(total_points: i64) -> TierProgress {
    let tier = tier_of(total_points);
    let current_threshold = threshold_of(tier);
    let next_threshold = THRESHOLDS
        .iter()
        .find(|(_, threshold)| *threshold > current_threshold)
        .filter(|_| tier != Tier::Diamond)
        .map(|(_, threshold)| *threshold);

    let percentage = match next_threshold {
        None => 100.0,
        Some(next) => {
            let span = (next - current_threshold) as f64;
            let gained = (total_points - current_threshold) as f64;
            (gained / span * 100.0).clamp(0.0, 100.0)
        }
    };

    TierProgress {
        current_threshold,
        next_threshold,
        percentage,
    }
}

/// 指定等级的积分倍率
///
/// 会员在该等级期间赚取的积分按此倍率放大
pub fn multiplier_of(tier: Tier) -> f64 {
    match tier {
        Tier::Bronze => 1.0,
        Tier::Silver => 1.25,
        Tier::Gold => 1.5,
        Tier::Platinum => 1.75,
        Tier::Diamond => 2.0,
    }
}
