//! 积分账本流水管道
//!
//! 将单个账本事件应用到会员账户的纯函数：校验 -> 计算积分变动 ->
//! 生成不可变流水 -> 重算余额与等级 -> 识别升级副作用。
//! 不做任何 IO，持久化与通知由服务层负责，因此所有余额规则
//! 和等级一致性不依赖数据库即可完整测试。
//!
//! ## 关键规则
//!
//! - earned/bonus 按**变更前**等级的倍率放大：会员按入住期间持有的
//!   等级获得奖励，而不是因这笔积分才达到的等级
//! - 升级奖励（新等级序号 × 500 分）在同一次调用内最多发放一次，
//!   发放后等级只重算一次，不会再次触发奖励（防止级联升级）
//! - 任何校验失败都发生在账户被修改之前，失败调用不留下任何变更

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{LoyaltyError, Result};
use crate::models::{Member, PointsSource, Tier, Transaction, TransactionType};
use crate::tier;

/// 升级奖励的单位积分（乘以新等级序号）
const TIER_UPGRADE_BONUS_UNIT: i64 = 500;

/// 账本事件
///
/// 积分引擎处理的全部余额变动类型
#[derive(Debug, Clone)]
pub enum LedgerEntry {
    /// 赚取积分（入住、点评、推荐等），按变更前等级倍率放大
    Earn {
        base_points: i64,
        source: PointsSource,
        booking_ref: Option<String>,
        description: String,
    },
    /// 促销奖励积分，按变更前等级倍率放大，不计入 lifetime
    Bonus {
        base_points: i64,
        source: PointsSource,
        description: String,
    },
    /// 兑换扣减
    Redeem {
        points: i64,
        reward_id: Uuid,
        description: String,
    },
    /// 过期扣减（可用余额下限为 0）
    Expire {
        points: i64,
        source_transaction_id: Uuid,
        description: String,
    },
    /// 人工调整：带符号增量，仅在显式标记时影响等级积分
    Adjust {
        delta: i64,
        affects_tier: bool,
        description: String,
    },
}

/// 等级变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierChange {
    pub from: Tier,
    pub to: Tier,
}

impl TierChange {
    /// 是否为升级（只有升级触发奖励与通知副作用）
    pub fn is_upgrade(&self) -> bool {
        self.to > self.from
    }
}

/// 应用结果
///
/// transactions 按产生顺序排列：主流水在前，升级奖励流水（如有）在后
#[derive(Debug)]
pub struct PostOutcome {
    pub transactions: Vec<Transaction>,
    pub tier_change: Option<TierChange>,
}

impl PostOutcome {
    /// 主流水（本次调用直接对应的那条）
    pub fn primary(&self) -> &Transaction {
        &self.transactions[0]
    }
}

/// 将一个账本事件应用到会员账户
///
/// 成功时返回生成的流水和可能的等级变化，调用方负责将会员与
/// 全部流水作为一个原子单元持久化。失败时会员账户保持原状。
pub fn post(member: &mut Member, entry: LedgerEntry, now: DateTime<Utc>) -> Result<PostOutcome> {
    validate(member, &entry)?;

    let pre_tier = member.tier;
    let primary = apply_entry(member, entry, pre_tier, now);

    // 等级重算：tier == tier_of(total_points) 是全引擎的核心一致性不变量
    member.tier = tier::tier_of(member.total_points);
    member.updated_at = now;

    let mut transactions = vec![primary];
    let mut tier_change = None;

    if member.tier != pre_tier {
        let change = TierChange {
            from: pre_tier,
            to: member.tier,
        };
        if change.is_upgrade() {
            // 升级奖励按新等级序号计，不再乘倍率；发放后等级只重算一次，
            // 即使奖励本身跨过下一阈值也不会再触发第二次奖励
            let bonus_points = i64::from(member.tier.rank()) * TIER_UPGRADE_BONUS_UNIT;
            member.available_points += bonus_points;
            member.total_points += bonus_points;
            member.tier = tier::tier_of(member.total_points);

            transactions.push(new_transaction(
                member,
                TransactionType::Bonus,
                bonus_points,
                PointsSource::Promotion,
                format!("升级奖励: {} -> {}", change.from, change.to),
                now,
            ));

            tier_change = Some(TierChange {
                from: pre_tier,
                to: member.tier,
            });
        } else {
            // 降级只更新等级，无奖励、无通知
            tier_change = Some(change);
        }
    }

    Ok(PostOutcome {
        transactions,
        tier_change,
    })
}

/// 事件校验，任何失败都发生在账户被修改之前
fn validate(member: &Member, entry: &LedgerEntry) -> Result<()> {
    match entry {
        LedgerEntry::Earn { base_points, .. } | LedgerEntry::Bonus { base_points, .. } => {
            if *base_points < 0 {
                return Err(LoyaltyError::Validation(format!(
                    "积分数值不能为负: {base_points}"
                )));
            }
        }
        LedgerEntry::Redeem { points, .. } => {
            if *points < 0 {
                return Err(LoyaltyError::Validation(format!(
                    "积分数值不能为负: {points}"
                )));
            }
            if member.available_points < *points {
                return Err(LoyaltyError::InsufficientPoints {
                    required: *points,
                    available: member.available_points,
                });
            }
        }
        LedgerEntry::Expire { points, .. } => {
            if *points < 0 {
                return Err(LoyaltyError::Validation(format!(
                    "积分数值不能为负: {points}"
                )));
            }
        }
        LedgerEntry::Adjust {
            delta,
            affects_tier,
            ..
        } => {
            if member.available_points + delta < 0 {
                return Err(LoyaltyError::Validation(format!(
                    "调整会使可用余额为负: 当前 {}, 增量 {delta}",
                    member.available_points
                )));
            }
            if *affects_tier && member.total_points + delta < 0 {
                return Err(LoyaltyError::Validation(format!(
                    "调整会使等级积分为负: 当前 {}, 增量 {delta}",
                    member.total_points
                )));
            }
        }
    }
    Ok(())
}

/// 应用主流水的余额变动并生成流水记录
fn apply_entry(
    member: &mut Member,
    entry: LedgerEntry,
    pre_tier: Tier,
    now: DateTime<Utc>,
) -> Transaction {
    match entry {
        LedgerEntry::Earn {
            base_points,
            source,
            booking_ref,
            description,
        } => {
            let multiplier = tier::multiplier_of(pre_tier);
            let final_points = (base_points as f64 * multiplier).floor() as i64;
            member.available_points += final_points;
            member.total_points += final_points;
            member.lifetime_points += final_points;

            let mut tx = new_transaction(
                member,
                TransactionType::Earned,
                final_points,
                source,
                description,
                now,
            );
            tx.booking_ref = booking_ref;
            tx.base_points = Some(base_points);
            tx.multiplier = Some(multiplier);
            tx.expires_at = Some(Transaction::expiry_for(now));
            tx
        }
        LedgerEntry::Bonus {
            base_points,
            source,
            description,
        } => {
            let multiplier = tier::multiplier_of(pre_tier);
            let final_points = (base_points as f64 * multiplier).floor() as i64;
            member.available_points += final_points;
            member.total_points += final_points;

            let mut tx = new_transaction(
                member,
                TransactionType::Bonus,
                final_points,
                source,
                description,
                now,
            );
            tx.base_points = Some(base_points);
            tx.multiplier = Some(multiplier);
            tx
        }
        LedgerEntry::Redeem {
            points,
            reward_id,
            description,
        } => {
            member.available_points -= points;
            // 等级积分随兑换减少，但不变量要求其保持非负
            member.total_points = (member.total_points - points).max(0);

            let mut tx = new_transaction(
                member,
                TransactionType::Redeemed,
                points,
                PointsSource::Redemption,
                description,
                now,
            );
            tx.reward_id = Some(reward_id);
            tx
        }
        LedgerEntry::Expire {
            points,
            source_transaction_id,
            description,
        } => {
            // 可用余额下限为 0；流水记录完整的原始数值，余额保持不变量
            member.available_points = (member.available_points - points).max(0);

            let mut tx = new_transaction(
                member,
                TransactionType::Expired,
                points,
                PointsSource::Adjustment,
                description,
                now,
            );
            tx.source_transaction_id = Some(source_transaction_id);
            tx
        }
        LedgerEntry::Adjust {
            delta,
            affects_tier,
            description,
        } => {
            member.available_points += delta;
            if affects_tier {
                member.total_points += delta;
            }

            let mut tx = new_transaction(
                member,
                TransactionType::Adjusted,
                delta.abs(),
                PointsSource::Adjustment,
                description,
                now,
            );
            tx.adjustment_delta = Some(delta);
            tx.tier_affecting = affects_tier;
            tx
        }
    }
}

fn new_transaction(
    member: &Member,
    tx_type: TransactionType,
    points: i64,
    source: PointsSource,
    description: String,
    now: DateTime<Utc>,
) -> Transaction {
    Transaction {
        id: Uuid::now_v7(),
        member_id: member.id,
        tx_type,
        points,
        balance_after: member.available_points,
        description,
        source,
        booking_ref: None,
        reward_id: None,
        base_points: None,
        multiplier: None,
        adjustment_delta: None,
        tier_affecting: false,
        expires_at: None,
        expiry_posted_at: None,
        source_transaction_id: None,
        transaction_date: now,
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member_with(available: i64, total: i64) -> Member {
        let mut m = Member::new("user-1", "user-1@example.com", Utc::now());
        m.available_points = available;
        m.total_points = total;
        m.lifetime_points = total;
        m.tier = tier::tier_of(total);
        m
    }

    fn earn(base_points: i64) -> LedgerEntry {
        LedgerEntry::Earn {
            base_points,
            source: PointsSource::Booking,
            booking_ref: None,
            description: "入住积分".to_string(),
        }
    }

    #[test]
    fn test_earn_at_bronze_multiplier() {
        let mut m = member_with(0, 0);
        let outcome = post(&mut m, earn(200), Utc::now()).unwrap();

        let tx = outcome.primary();
        assert_eq!(tx.points, 200);
        assert_eq!(tx.base_points, Some(200));
        assert_eq!(tx.multiplier, Some(1.0));
        assert!(tx.expires_at.is_some());
        assert_eq!(m.available_points, 200);
        assert_eq!(m.total_points, 200);
        assert_eq!(m.lifetime_points, 200);
    }

    #[test]
    fn test_earn_multiplier_locked_at_pre_transaction_tier() {
        // 金卡会员（1.5x）赚取 200 基础分
        let mut m = member_with(8_000, 8_000);
        let outcome = post(&mut m, earn(200), Utc::now()).unwrap();

        assert_eq!(outcome.primary().points, 300);
        assert_eq!(outcome.primary().multiplier, Some(1.5));
        assert_eq!(m.lifetime_points, 8_300);
    }

    #[test]
    fn test_silver_crossing_awards_upgrade_bonus() {
        // 2400 分的铜卡会员赚取 200 基础分（铜卡 1.0x）
        let mut m = member_with(2_400, 2_400);
        let outcome = post(&mut m, earn(200), Utc::now()).unwrap();

        // 跨过银卡阈值 2500：等级变为银卡，追加 2×500 奖励流水
        assert_eq!(outcome.transactions.len(), 2);
        let bonus = &outcome.transactions[1];
        assert_eq!(bonus.tx_type, TransactionType::Bonus);
        assert_eq!(bonus.points, 1_000);
        assert_eq!(bonus.source, PointsSource::Promotion);

        let change = outcome.tier_change.unwrap();
        assert_eq!(change.from, Tier::Bronze);
        assert_eq!(change.to, Tier::Silver);
        assert!(change.is_upgrade());

        assert_eq!(m.tier, Tier::Silver);
        assert_eq!(m.total_points, 3_600);
        assert_eq!(m.available_points, 3_600);
        // lifetime 只计 earned，不计升级奖励
        assert_eq!(m.lifetime_points, 2_600);
    }

    #[test]
    fn test_upgrade_bonus_not_recursive() {
        let mut m = member_with(14_000, 14_000);
        // 金卡 1.5x：800 基础分 -> 1200 最终分 -> 15200 跨过白金阈值
        let outcome = post(&mut m, earn(800), Utc::now()).unwrap();

        // 奖励 4×500=2000 只发一次，发放后等级重算但不再触发奖励
        assert_eq!(outcome.transactions.len(), 2);
        assert_eq!(outcome.transactions[1].points, 2_000);
        assert_eq!(m.tier, Tier::Platinum);
        assert_eq!(m.tier, tier::tier_of(m.total_points));
    }

    #[test]
    fn test_external_bonus_gets_multiplier_but_not_lifetime() {
        let mut m = member_with(3_000, 3_000);
        let outcome = post(
            &mut m,
            LedgerEntry::Bonus {
                base_points: 400,
                source: PointsSource::Promotion,
                description: "双十一促销".to_string(),
            },
            Utc::now(),
        )
        .unwrap();

        // 银卡 1.25x
        assert_eq!(outcome.primary().points, 500);
        assert_eq!(m.available_points, 3_500);
        assert_eq!(m.total_points, 3_500);
        assert_eq!(m.lifetime_points, 3_000);
    }

    #[test]
    fn test_redeem_insufficient_leaves_member_unchanged() {
        let mut m = member_with(0, 0);
        let before = m.clone();

        let err = post(
            &mut m,
            LedgerEntry::Redeem {
                points: 100,
                reward_id: Uuid::now_v7(),
                description: "免费早餐".to_string(),
            },
            Utc::now(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            LoyaltyError::InsufficientPoints {
                required: 100,
                available: 0
            }
        ));
        assert_eq!(m.available_points, before.available_points);
        assert_eq!(m.total_points, before.total_points);
        assert_eq!(m.lifetime_points, before.lifetime_points);
        assert_eq!(m.tier, before.tier);
    }

    #[test]
    fn test_redeem_debits_and_may_downgrade() {
        let mut m = member_with(3_000, 3_000);
        assert_eq!(m.tier, Tier::Silver);

        let outcome = post(
            &mut m,
            LedgerEntry::Redeem {
                points: 1_000,
                reward_id: Uuid::now_v7(),
                description: "房型升级".to_string(),
            },
            Utc::now(),
        )
        .unwrap();

        assert_eq!(m.available_points, 2_000);
        assert_eq!(m.total_points, 2_000);
        // 跌破银卡阈值：降级但无奖励、流水只有一条
        assert_eq!(m.tier, Tier::Bronze);
        assert_eq!(outcome.transactions.len(), 1);
        let change = outcome.tier_change.unwrap();
        assert!(!change.is_upgrade());
    }

    #[test]
    fn test_expire_floors_at_zero() {
        let mut m = member_with(50, 500);
        let outcome = post(
            &mut m,
            LedgerEntry::Expire {
                points: 200,
                source_transaction_id: Uuid::now_v7(),
                description: "积分过期".to_string(),
            },
            Utc::now(),
        )
        .unwrap();

        assert_eq!(m.available_points, 0);
        // 流水保留完整的原始数值
        assert_eq!(outcome.primary().points, 200);
        assert_eq!(outcome.primary().balance_after, 0);
    }

    #[test]
    fn test_adjust_without_tier_flag() {
        let mut m = member_with(1_000, 1_000);
        let outcome = post(
            &mut m,
            LedgerEntry::Adjust {
                delta: -300,
                affects_tier: false,
                description: "客服补偿回收".to_string(),
            },
            Utc::now(),
        )
        .unwrap();

        assert_eq!(m.available_points, 700);
        assert_eq!(m.total_points, 1_000);
        assert_eq!(outcome.primary().points, 300);
        assert_eq!(outcome.primary().adjustment_delta, Some(-300));
        assert!(!outcome.primary().tier_affecting);
    }

    #[test]
    fn test_adjust_with_tier_flag_can_upgrade() {
        let mut m = member_with(2_400, 2_400);
        let outcome = post(
            &mut m,
            LedgerEntry::Adjust {
                delta: 200,
                affects_tier: true,
                description: "历史积分补录".to_string(),
            },
            Utc::now(),
        )
        .unwrap();

        assert_eq!(m.tier, Tier::Silver);
        assert_eq!(outcome.transactions.len(), 2);
    }

    #[test]
    fn test_adjust_rejects_negative_balance() {
        let mut m = member_with(100, 100);
        let err = post(
            &mut m,
            LedgerEntry::Adjust {
                delta: -200,
                affects_tier: false,
                description: "回收".to_string(),
            },
            Utc::now(),
        )
        .unwrap_err();

        assert!(matches!(err, LoyaltyError::Validation(_)));
        assert_eq!(m.available_points, 100);
    }

    #[test]
    fn test_negative_points_rejected() {
        let mut m = member_with(0, 0);
        let err = post(&mut m, earn(-10), Utc::now()).unwrap_err();
        assert!(matches!(err, LoyaltyError::Validation(_)));
    }

    #[test]
    fn test_invariants_over_random_sequence() {
        // 任意事件序列后：余额非负、lifetime 单调不减、等级始终一致
        let mut m = member_with(0, 0);
        let reward_id = Uuid::now_v7();
        let entries = vec![
            earn(1_000),
            LedgerEntry::Bonus {
                base_points: 300,
                source: PointsSource::Promotion,
                description: "促销".to_string(),
            },
            LedgerEntry::Redeem {
                points: 400,
                reward_id,
                description: "兑换".to_string(),
            },
            earn(2_000),
            LedgerEntry::Expire {
                points: 700,
                source_transaction_id: Uuid::now_v7(),
                description: "过期".to_string(),
            },
            LedgerEntry::Adjust {
                delta: -100,
                affects_tier: true,
                description: "调整".to_string(),
            },
            earn(5_000),
        ];

        let mut last_lifetime = 0;
        for entry in entries {
            let result = post(&mut m, entry, Utc::now());
            if let Err(e) = &result {
                assert!(e.is_business_error(), "only business rejections expected");
            }
            assert!(m.available_points >= 0);
            assert!(m.total_points >= 0);
            assert!(m.lifetime_points >= last_lifetime);
            assert_eq!(m.tier, tier::tier_of(m.total_points));
            last_lifetime = m.lifetime_points;
        }
    }
}
