//! 奖励兑换服务
//!
//! 处理会员用积分兑换奖励的核心业务逻辑，包括：
//! - 奖励有效性与资格检查（余额、等级门槛、年度次数上限、黑名单日期等）
//! - 事务性扣减与兑换记录创建
//! - 兑换确认通知
//!
//! ## 兑换流程
//!
//! 1. 会员锁 -> 2. 事务内 FOR UPDATE 加载会员 -> 3. 资格检查（全部在写入之前）
//!    -> 4. 账本扣减 -> 5. 写入流水 + 兑换记录 + 账户 -> 6. 提交 -> 7. 通知

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{LoyaltyError, Result};
use crate::ledger::{self, LedgerEntry};
use crate::lock::MemberLockManager;
use crate::models::{Redemption, RedemptionStatus, Reward};
use crate::notification::NotificationSender;
use crate::repository::{
    MemberRepository, MemberRepositoryTrait, RewardRepository, TransactionRepository,
    calendar_year,
};
use crate::service::dto::{RedeemRequest, RedeemResponse, RedemptionHistoryDto};

/// 奖励兑换服务
pub struct RedemptionService {
    member_repo: Arc<MemberRepository>,
    reward_repo: Arc<RewardRepository>,
    locks: Arc<MemberLockManager>,
    notifier: Option<NotificationSender>,
    pool: PgPool,
}

impl RedemptionService {
    pub fn new(
        member_repo: Arc<MemberRepository>,
        reward_repo: Arc<RewardRepository>,
        locks: Arc<MemberLockManager>,
        notifier: Option<NotificationSender>,
        pool: PgPool,
    ) -> Self {
        Self {
            member_repo,
            reward_repo,
            locks,
            notifier,
            pool,
        }
    }

    /// 兑换奖励
    ///
    /// 全部资格检查在任何写入之前完成；任一检查失败时余额和兑换
    /// 历史均无任何变更。扣减流水、兑换记录与账户更新在同一事务内
    /// 提交。进程内会员锁 + FOR UPDATE 行锁防止并发双花。
    #[instrument(skip(self, request), fields(
        member_id = %request.member_id,
        reward_id = %request.reward_id,
    ))]
    pub async fn redeem(&self, request: RedeemRequest) -> Result<RedeemResponse> {
        let _guard = self.locks.acquire(request.member_id).await?;

        let now = Utc::now();

        let reward = self
            .reward_repo
            .get(request.reward_id)
            .await?
            .ok_or(LoyaltyError::RewardNotFound(request.reward_id))?;

        // 年度次数统计：会员锁内读取，同会员不存在并发写入
        let uses_this_year = self
            .reward_repo
            .count_redemptions_in_year(request.member_id, request.reward_id, calendar_year(now))
            .await?;

        let mut tx = self.pool.begin().await?;

        let mut member = MemberRepository::get_for_update_in_tx(&mut tx, request.member_id)
            .await?
            .ok_or(LoyaltyError::MemberNotFound(request.member_id))?;

        reward.check_eligibility(&member, uses_this_year, now)?;

        let entry = LedgerEntry::Redeem {
            points: reward.points_required,
            reward_id: reward.id,
            description: format!("兑换奖励: {}", reward.name),
        };
        let outcome = ledger::post(&mut member, entry, now)?;

        let redemption = Redemption {
            id: Uuid::now_v7(),
            member_id: member.id,
            reward_id: reward.id,
            transaction_id: outcome.primary().id,
            points_used: reward.points_required,
            status: RedemptionStatus::Active,
            redeemed_at: now,
            expires_at: reward
                .expiry_days
                .map(|days| now + Duration::days(i64::from(days))),
            created_at: now,
        };

        for transaction in &outcome.transactions {
            TransactionRepository::create_in_tx(&mut tx, transaction).await?;
        }
        RewardRepository::create_redemption_in_tx(&mut tx, &redemption).await?;
        MemberRepository::update_in_tx(&mut tx, &member).await?;

        tx.commit().await?;

        metrics::counter!("loyalty.points.redeemed").increment(reward.points_required as u64);
        metrics::counter!("loyalty.redemptions.completed").increment(1);
        info!(
            member_id = %member.id,
            reward_id = %reward.id,
            redemption_id = %redemption.id,
            points_used = reward.points_required,
            balance_after = outcome.primary().balance_after,
            "奖励兑换成功"
        );

        if let Some(notifier) = &self.notifier {
            notifier.send_redemption_confirmed(
                &member,
                redemption.id,
                &reward.name,
                reward.points_required,
            );
        }

        Ok(RedeemResponse {
            redemption_id: redemption.id,
            transaction_id: outcome.primary().id,
            reward_name: reward.name,
            points_used: redemption.points_used,
            balance_after: outcome.primary().balance_after,
            tier: member.tier,
            expires_at: redemption.expires_at,
        })
    }

    /// 列出指定会员当前可兑换的奖励目录
    ///
    /// 在上架与有效期过滤之上，再按会员视角过滤：余额不足或
    /// 等级门槛未满足的奖励不出现在列表中。
    #[instrument(skip(self), fields(member_id = %member_id))]
    pub async fn list_available_rewards(&self, member_id: Uuid) -> Result<Vec<Reward>> {
        let member = self
            .member_repo
            .get_by_id(member_id)
            .await?
            .ok_or(LoyaltyError::MemberNotFound(member_id))?;

        let now = Utc::now();
        let rewards = self.reward_repo.list_available(now).await?;
        Ok(rewards
            .into_iter()
            .filter(|reward| reward.is_visible_to(&member, now))
            .collect())
    }

    /// 查询会员兑换历史，按时间倒序
    #[instrument(skip(self), fields(member_id = %member_id))]
    pub async fn get_redemption_history(
        &self,
        member_id: Uuid,
        limit: i64,
    ) -> Result<Vec<RedemptionHistoryDto>> {
        let redemptions = self
            .reward_repo
            .list_redemptions_by_member(member_id, limit)
            .await?;

        let mut result = Vec::with_capacity(redemptions.len());
        for redemption in redemptions {
            let reward_name = self
                .reward_repo
                .get(redemption.reward_id)
                .await?
                .map(|r| r.name)
                .unwrap_or_else(|| "未知奖励".to_string());

            result.push(RedemptionHistoryDto {
                redemption_id: redemption.id,
                reward_id: redemption.reward_id,
                reward_name,
                points_used: redemption.points_used,
                status: redemption.status,
                redeemed_at: redemption.redeemed_at,
                expires_at: redemption.expires_at,
            });
        }

        Ok(result)
    }
}
