//! 积分事务服务
//!
//! 处理所有改变会员余额的账本事件，包括：
//! - 入住订单入账（幂等，同一订单号只入账一次）
//! - 点评 / 推荐 / 活动积分授予
//! - 促销奖励积分
//! - 人工积分调整
//!
//! ## 写入流程
//!
//! 1. 业务校验 -> 2. 获取会员进程内锁 -> 3. 事务内 FOR UPDATE 加载
//!    -> 4. 应用账本管道 -> 5. 写入流水与账户 -> 6. 提交
//!    -> 7. 提交后副作用（升级通知、metrics）

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{LoyaltyError, Result};
use crate::ledger::{self, LedgerEntry, PostOutcome};
use crate::lock::MemberLockManager;
use crate::models::{Member, PointsSource, Transaction};
use crate::notification::NotificationSender;
use crate::repository::{MemberRepository, MemberRepositoryTrait, TransactionRepository};
use crate::service::dto::{
    AdjustPointsRequest, CompletedStay, GrantPointsRequest, TransactionResponse,
};

/// 每间夜的基础积分
const POINTS_PER_NIGHT: i64 = 100;
/// 每消费多少分（货币单位：分）获得 1 基础积分，即每元 1 分
const CENTS_PER_POINT: i64 = 100;

/// 积分事务服务
pub struct TransactionService {
    member_repo: Arc<MemberRepository>,
    transaction_repo: Arc<TransactionRepository>,
    locks: Arc<MemberLockManager>,
    notifier: Option<NotificationSender>,
    pool: PgPool,
}

impl TransactionService {
    pub fn new(
        member_repo: Arc<MemberRepository>,
        transaction_repo: Arc<TransactionRepository>,
        locks: Arc<MemberLockManager>,
        notifier: Option<NotificationSender>,
        pool: PgPool,
    ) -> Self {
        Self {
            member_repo,
            transaction_repo,
            locks,
            notifier,
            pool,
        }
    }

    /// 入住订单入账
    ///
    /// 基础积分 = 消费金额（元）+ 间夜数 × 100，再按会员当前等级倍率放大。
    /// 幂等：同一 booking_ref 重复上报时返回已存在的入账流水，
    /// 不产生任何新的余额变更。并发重复由 booking_ref 唯一索引兜底。
    #[instrument(skip(self, stay), fields(
        booking_ref = %stay.booking_ref,
        member_id = %stay.member_id,
    ))]
    pub async fn add_points_from_booking(
        &self,
        stay: CompletedStay,
    ) -> Result<TransactionResponse> {
        if stay.booking_ref.trim().is_empty() {
            return Err(LoyaltyError::Validation("booking_ref 不能为空".to_string()));
        }
        if stay.amount_cents <= 0 {
            return Err(LoyaltyError::Validation(format!(
                "消费金额必须为正: {}",
                stay.amount_cents
            )));
        }
        if stay.nights <= 0 {
            return Err(LoyaltyError::Validation(format!(
                "间夜数必须为正: {}",
                stay.nights
            )));
        }

        // 幂等预检：订单号已入账时直接返回已有流水
        if let Some(existing) = self
            .transaction_repo
            .get_by_booking_ref(&stay.booking_ref)
            .await?
        {
            return self.duplicate_response(existing).await;
        }

        let base_points = stay.amount_cents / CENTS_PER_POINT + i64::from(stay.nights) * POINTS_PER_NIGHT;
        let entry = LedgerEntry::Earn {
            base_points,
            source: PointsSource::Booking,
            booking_ref: Some(stay.booking_ref.clone()),
            description: format!(
                "入住订单 {} 入账（{} 晚）",
                stay.booking_ref, stay.nights
            ),
        };

        let result = self.apply_transaction(stay.member_id, entry, Some(&stay)).await;

        // 预检与写入之间的并发重复：唯一索引拒绝后回读已有流水
        if let Err(LoyaltyError::Database(sqlx::Error::Database(ref db))) = result
            && db.is_unique_violation()
            && let Some(existing) = self
                .transaction_repo
                .get_by_booking_ref(&stay.booking_ref)
                .await?
        {
            info!(booking_ref = %stay.booking_ref, "并发重复入账，返回已有流水");
            return self.duplicate_response(existing).await;
        }

        let (outcome, member) = result?;
        metrics::counter!("loyalty.points.earned")
            .increment(outcome.primary().points as u64);

        Ok(self.respond(outcome, &member))
    }

    /// 授予非入住来源的积分（点评、推荐、活动）
    #[instrument(skip(self, request), fields(
        member_id = %request.member_id,
        source = ?request.source,
    ))]
    pub async fn grant_points(&self, request: GrantPointsRequest) -> Result<TransactionResponse> {
        Self::validate_grant(&request)?;

        let entry = LedgerEntry::Earn {
            base_points: request.base_points,
            source: request.source,
            booking_ref: None,
            description: request.description,
        };

        let (outcome, member) = self.apply_transaction(request.member_id, entry, None).await?;
        metrics::counter!("loyalty.points.earned")
            .increment(outcome.primary().points as u64);

        Ok(self.respond(outcome, &member))
    }

    /// 授予促销奖励积分
    ///
    /// 与普通赚取的区别：不计入 lifetime 累计，来源固定为 bonus 流水
    #[instrument(skip(self, request), fields(member_id = %request.member_id))]
    pub async fn grant_bonus(&self, request: GrantPointsRequest) -> Result<TransactionResponse> {
        Self::validate_grant(&request)?;

        let entry = LedgerEntry::Bonus {
            base_points: request.base_points,
            source: request.source,
            description: request.description,
        };

        let (outcome, member) = self.apply_transaction(request.member_id, entry, None).await?;
        Ok(self.respond(outcome, &member))
    }

    /// 人工积分调整
    ///
    /// delta 为带符号增量；扣减会导致余额为负时整个调整被拒绝。
    /// `affects_tier` 控制调整是否计入等级进度。
    #[instrument(skip(self, request), fields(
        member_id = %request.member_id,
        delta = %request.delta,
    ))]
    pub async fn adjust_points(&self, request: AdjustPointsRequest) -> Result<TransactionResponse> {
        if request.delta == 0 {
            return Err(LoyaltyError::Validation("调整量不能为 0".to_string()));
        }
        if request.reason.trim().is_empty() {
            return Err(LoyaltyError::Validation("调整原因不能为空".to_string()));
        }

        let entry = LedgerEntry::Adjust {
            delta: request.delta,
            affects_tier: request.affects_tier,
            description: request.reason,
        };

        let (outcome, member) = self.apply_transaction(request.member_id, entry, None).await?;
        Ok(self.respond(outcome, &member))
    }

    /// 查询会员积分流水，按时间倒序
    #[instrument(skip(self), fields(member_id = %member_id))]
    pub async fn get_transaction_history(
        &self,
        member_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Transaction>> {
        self.transaction_repo.list_by_member(member_id, limit).await
    }

    // ==================== 私有方法 ====================

    /// 在会员锁与数据库事务内应用一个账本事件
    ///
    /// 进程内锁串行化同一会员的并发写入，事务内 FOR UPDATE 行锁
    /// 保证多实例部署下的读-改-写原子性
    async fn apply_transaction(
        &self,
        member_id: Uuid,
        entry: LedgerEntry,
        stay: Option<&CompletedStay>,
    ) -> Result<(PostOutcome, Member)> {
        let _guard = self.locks.acquire(member_id).await?;

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let mut member = MemberRepository::get_for_update_in_tx(&mut tx, member_id)
            .await?
            .ok_or(LoyaltyError::MemberNotFound(member_id))?;

        let outcome = ledger::post(&mut member, entry, now)?;

        if let Some(stay) = stay {
            member.record_stay(stay.amount_cents, stay.nights, &stay.property_id);
        }

        for transaction in &outcome.transactions {
            TransactionRepository::create_in_tx(&mut tx, transaction).await?;
        }
        MemberRepository::update_in_tx(&mut tx, &member).await?;

        tx.commit().await?;

        // 提交后副作用：升级通知（尽力而为，失败不回滚）
        if let Some(change) = outcome.tier_change {
            if change.is_upgrade() {
                metrics::counter!("loyalty.tier.upgrades").increment(1);
                info!(
                    member_id = %member.id,
                    from = %change.from,
                    to = %change.to,
                    "会员等级升级"
                );

                if let Some(notifier) = &self.notifier {
                    let bonus_points = outcome
                        .transactions
                        .get(1)
                        .map(|t| t.points)
                        .unwrap_or_default();
                    notifier.send_tier_upgrade(&member, change.from, change.to, bonus_points);
                }
            } else {
                metrics::counter!("loyalty.tier.downgrades").increment(1);
            }
        }

        Ok((outcome, member))
    }

    fn respond(&self, outcome: PostOutcome, member: &Member) -> TransactionResponse {
        let primary = outcome.primary();
        TransactionResponse {
            transaction_id: primary.id,
            member_id: primary.member_id,
            transaction_type: primary.tx_type,
            points: primary.points,
            balance_after: primary.balance_after,
            tier: member.tier,
            tier_changed_from: outcome.tier_change.map(|c| c.from),
            bonus_points: outcome
                .tier_change
                .filter(|c| c.is_upgrade())
                .and_then(|_| outcome.transactions.get(1).map(|t| t.points)),
            duplicate: false,
        }
    }

    /// 构造幂等命中响应，等级取会员当前状态
    async fn duplicate_response(&self, existing: Transaction) -> Result<TransactionResponse> {
        let member = self
            .member_repo
            .get_by_id(existing.member_id)
            .await?
            .ok_or(LoyaltyError::MemberNotFound(existing.member_id))?;

        metrics::counter!("loyalty.bookings.duplicate").increment(1);
        Ok(TransactionResponse::from_existing(&existing, member.tier))
    }

    fn validate_grant(request: &GrantPointsRequest) -> Result<()> {
        if request.base_points <= 0 {
            return Err(LoyaltyError::Validation(format!(
                "基础积分必须为正: {}",
                request.base_points
            )));
        }
        if matches!(
            request.source,
            PointsSource::Booking | PointsSource::Redemption
        ) {
            return Err(LoyaltyError::Validation(format!(
                "来源 {:?} 不允许手动授予",
                request.source
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_base_points_formula() {
        // 500 元消费 + 3 晚 = 500 + 300 基础积分
        let amount_cents = 50_000i64;
        let nights = 3i32;
        let base = amount_cents / CENTS_PER_POINT + i64::from(nights) * POINTS_PER_NIGHT;
        assert_eq!(base, 800);
    }

    #[test]
    fn test_booking_base_points_floor_division() {
        // 不足一元的部分舍去
        let base = 10_150i64 / CENTS_PER_POINT;
        assert_eq!(base, 101);
    }

    #[test]
    fn test_validate_grant_rejects_reserved_sources() {
        let request = GrantPointsRequest {
            member_id: Uuid::now_v7(),
            base_points: 100,
            source: PointsSource::Booking,
            description: "x".to_string(),
        };
        assert!(TransactionService::validate_grant(&request).is_err());

        let request = GrantPointsRequest {
            source: PointsSource::Review,
            ..request
        };
        assert!(TransactionService::validate_grant(&request).is_ok());
    }

    #[test]
    fn test_validate_grant_rejects_non_positive_points() {
        let request = GrantPointsRequest {
            member_id: Uuid::now_v7(),
            base_points: 0,
            source: PointsSource::Review,
            description: "x".to_string(),
        };
        assert!(TransactionService::validate_grant(&request).is_err());
    }
}
