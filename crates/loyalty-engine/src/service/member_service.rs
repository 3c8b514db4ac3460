//! 会员账户服务
//!
//! 处理会员的注册与查询：
//! - 幂等注册（同一 user_id 并发注册只产生一个账户）
//! - 注册成功后发送欢迎通知
//! - 会员概要（余额、等级、进度）查询

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{LoyaltyError, Result};
use crate::models::Member;
use crate::notification::NotificationSender;
use crate::repository::MemberRepositoryTrait;
use crate::service::dto::{EnrollRequest, EnrollResponse, MemberSummaryDto};
use crate::tier;

/// 会员账户服务
///
/// 泛型仓储参数便于在单元测试中注入 mock
pub struct MemberService<R: MemberRepositoryTrait> {
    member_repo: R,
    notifier: Option<NotificationSender>,
}

impl<R: MemberRepositoryTrait> MemberService<R> {
    pub fn new(member_repo: R, notifier: Option<NotificationSender>) -> Self {
        Self {
            member_repo,
            notifier,
        }
    }

    /// 注册会员
    ///
    /// 幂等：user_id 已注册时返回已有账户，`newly_enrolled = false`。
    /// 并发注册同一 user_id 时由唯一约束保证只有一个写入成功，
    /// 落败方读回胜出方创建的账户。
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn enroll(&self, request: EnrollRequest) -> Result<EnrollResponse> {
        if request.user_id.trim().is_empty() {
            return Err(LoyaltyError::Validation("user_id 不能为空".to_string()));
        }
        if !request.email.contains('@') {
            return Err(LoyaltyError::Validation(format!(
                "邮箱格式无效: {}",
                request.email
            )));
        }

        let candidate = Member::new(&request.user_id, &request.email, Utc::now());
        let inserted = self.member_repo.insert_if_absent(&candidate).await?;

        let member = if inserted {
            metrics::counter!("loyalty.members.enrolled").increment(1);
            info!(member_id = %candidate.id, "会员注册成功");

            if let Some(notifier) = &self.notifier {
                notifier.send_welcome(&candidate);
            }
            candidate
        } else {
            // 冲突：读回已存在的账户
            self.member_repo
                .get_by_user_id(&request.user_id)
                .await?
                .ok_or_else(|| {
                    LoyaltyError::Internal(format!(
                        "注册冲突但未找到已有会员: user_id={}",
                        request.user_id
                    ))
                })?
        };

        Ok(EnrollResponse {
            member_id: member.id,
            user_id: member.user_id,
            tier: member.tier,
            newly_enrolled: inserted,
            enrolled_at: member.enrolled_at,
        })
    }

    /// 查询会员概要
    #[instrument(skip(self), fields(member_id = %member_id))]
    pub async fn get_member(&self, member_id: Uuid) -> Result<MemberSummaryDto> {
        let member = self
            .member_repo
            .get_by_id(member_id)
            .await?
            .ok_or(LoyaltyError::MemberNotFound(member_id))?;

        Ok(Self::to_summary(member))
    }

    /// 按 user_id 查询会员概要
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_member_by_user_id(&self, user_id: &str) -> Result<MemberSummaryDto> {
        let member = self
            .member_repo
            .get_by_user_id(user_id)
            .await?
            .ok_or_else(|| LoyaltyError::UserNotEnrolled(user_id.to_string()))?;

        Ok(Self::to_summary(member))
    }

    fn to_summary(member: Member) -> MemberSummaryDto {
        MemberSummaryDto {
            member_id: member.id,
            user_id: member.user_id,
            email: member.email,
            available_points: member.available_points,
            total_points: member.total_points,
            lifetime_points: member.lifetime_points,
            tier: member.tier,
            multiplier: tier::multiplier_of(member.tier),
            progress: tier::progress_of(member.total_points),
            total_stays: member.total_stays,
            total_nights: member.total_nights,
            enrolled_at: member.enrolled_at,
        }
    }
}
