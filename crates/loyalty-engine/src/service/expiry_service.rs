//! 积分过期清扫服务
//!
//! 周期性扫描超过有效期且尚未过期入账的 earned 流水，为每笔生成
//! 对应的 expired 扣减流水。清扫必须幂等：来源流水上的
//! `expiry_posted_at` 标记与扣减流水在同一事务内写入，
//! 同一笔积分无论清扫运行多少次都只会被扣除一次。

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tracing::{info, instrument, warn};

use crate::error::{LoyaltyError, Result};
use crate::ledger::{self, LedgerEntry};
use crate::lock::MemberLockManager;
use crate::models::Transaction;
use crate::repository::{MemberRepository, RewardRepository, TransactionRepository};
use crate::service::dto::ExpirySweepReport;

/// 积分过期清扫服务
pub struct ExpiryService {
    transaction_repo: Arc<TransactionRepository>,
    reward_repo: Arc<RewardRepository>,
    locks: Arc<MemberLockManager>,
    pool: PgPool,
    batch_size: i64,
}

impl ExpiryService {
    pub fn new(
        transaction_repo: Arc<TransactionRepository>,
        reward_repo: Arc<RewardRepository>,
        locks: Arc<MemberLockManager>,
        pool: PgPool,
        batch_size: i64,
    ) -> Self {
        Self {
            transaction_repo,
            reward_repo,
            locks,
            pool,
            batch_size,
        }
    }

    /// 执行一轮清扫
    ///
    /// 每笔候选流水独立处理：单笔失败只记录并计数，不影响其余
    /// 候选，失败的流水保留标记为空，下一轮自动重试。
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<ExpirySweepReport> {
        let now = Utc::now();
        let candidates = self.transaction_repo.list_expirable(now, self.batch_size).await?;

        let mut report = ExpirySweepReport {
            candidates: candidates.len(),
            expired: 0,
            points_expired: 0,
            failures: 0,
            redemptions_expired: 0,
        };

        for candidate in candidates {
            match self.expire_one(&candidate).await {
                Ok(Some(deducted)) => {
                    report.expired += 1;
                    report.points_expired += deducted;
                }
                // 已被其他实例处理，跳过
                Ok(None) => {}
                Err(e) => {
                    report.failures += 1;
                    warn!(
                        transaction_id = %candidate.id,
                        member_id = %candidate.member_id,
                        error = %e,
                        "过期处理失败，下一轮重试"
                    );
                }
            }
        }

        // 过期未使用的兑换记录一并标记
        report.redemptions_expired = self.reward_repo.expire_stale_redemptions(now).await?;

        metrics::counter!("loyalty.points.expired").increment(report.points_expired as u64);
        if report.candidates > 0 || report.redemptions_expired > 0 {
            info!(
                candidates = report.candidates,
                expired = report.expired,
                points_expired = report.points_expired,
                failures = report.failures,
                redemptions_expired = report.redemptions_expired,
                "过期清扫完成"
            );
        }

        Ok(report)
    }

    /// 处理单笔过期流水
    ///
    /// 返回实际扣除的积分；来源流水已被标记时返回 None。
    /// 标记与扣减在同一事务内，保证恰好一次语义。
    async fn expire_one(&self, candidate: &Transaction) -> Result<Option<i64>> {
        let _guard = self.locks.acquire(candidate.member_id).await?;

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        // IS NULL 守卫：并发实例间只有一个能成功标记
        let marked =
            TransactionRepository::mark_expiry_posted_in_tx(&mut tx, candidate.id, now).await?;
        if !marked {
            return Ok(None);
        }

        let mut member = MemberRepository::get_for_update_in_tx(&mut tx, candidate.member_id)
            .await?
            .ok_or(LoyaltyError::MemberNotFound(candidate.member_id))?;

        let available_before = member.available_points;
        let entry = LedgerEntry::Expire {
            points: candidate.points,
            source_transaction_id: candidate.id,
            description: format!("积分过期（来源流水 {}）", candidate.id),
        };
        let outcome = ledger::post(&mut member, entry, now)?;

        for transaction in &outcome.transactions {
            TransactionRepository::create_in_tx(&mut tx, transaction).await?;
        }
        MemberRepository::update_in_tx(&mut tx, &member).await?;

        tx.commit().await?;

        // 可用余额下限为 0，实际扣除量可能小于名义过期量
        let deducted = available_before - member.available_points;
        Ok(Some(deducted))
    }
}
