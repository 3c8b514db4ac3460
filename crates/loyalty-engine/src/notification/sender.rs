//! 业务侧通知出口
//!
//! 业务服务在事务提交之后通过 `NotificationSender` 触发通知。发送在独立任务中
//! 异步执行（fire-and-forget），失败只记录日志，绝不影响已提交的账本结果。

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Member, Tier};
use crate::notification::service::NotificationService;
use crate::notification::types::{Notification, NotificationBuilder};

/// 通知触发器
#[derive(Clone)]
pub struct NotificationSender {
    service: Arc<NotificationService>,
}

impl NotificationSender {
    pub fn new(service: Arc<NotificationService>) -> Self {
        Self { service }
    }

    /// 注册欢迎通知
    pub fn send_welcome(&self, member: &Member) {
        self.dispatch(NotificationBuilder::welcome(member));
    }

    /// 等级升级通知
    pub fn send_tier_upgrade(&self, member: &Member, from: Tier, to: Tier, bonus_points: i64) {
        self.dispatch(NotificationBuilder::tier_upgrade(member, from, to, bonus_points));
    }

    /// 兑换确认通知
    pub fn send_redemption_confirmed(
        &self,
        member: &Member,
        redemption_id: Uuid,
        reward_name: &str,
        points_used: i64,
    ) {
        self.dispatch(NotificationBuilder::redemption_confirmed(
            member,
            redemption_id,
            reward_name,
            points_used,
        ));
    }

    fn dispatch(&self, notification: Notification) {
        let service = self.service.clone();
        tokio::spawn(async move {
            let result = service.send(&notification).await;
            if result.results.is_empty() {
                debug!(
                    notification_id = %notification.notification_id,
                    "会员已关闭全部通知渠道，跳过发送"
                );
            } else if !result.any_succeeded() {
                warn!(
                    notification_id = %notification.notification_id,
                    member_id = %notification.member_id,
                    kind = ?notification.kind,
                    "通知所有渠道均发送失败"
                );
            }
        });
    }
}
