//! 多渠道通知发送器
//!
//! 通过 `NotificationChannel` trait 抽象发送行为，各渠道（邮件、APP Push）
//! 提供独立实现。当前版本为模拟发送（仅记录日志），便于在无外部依赖的情况下
//! 验证通知管道的完整性。未来替换为真实 SDK 调用时只需实现同一 trait。

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::error::LoyaltyError;
use crate::notification::types::{ChannelKind, ChannelResult, Notification};

/// 通知渠道 trait，各渠道实现具体的推送逻辑
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// 发送通知到该渠道
    async fn send(&self, notification: &Notification) -> Result<ChannelResult, LoyaltyError>;

    /// 该发送器支持的渠道类型
    fn kind(&self) -> ChannelKind;
}

// ---------------------------------------------------------------------------
// 邮件渠道
// ---------------------------------------------------------------------------

/// 模拟邮件发送器
///
/// 生产环境中替换为 SMTP 或邮件服务商（如 SendGrid）的 API 调用
pub struct EmailChannel {
    from_address: String,
}

impl EmailChannel {
    pub fn new(from_address: impl Into<String>) -> Self {
        Self {
            from_address: from_address.into(),
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    async fn send(&self, notification: &Notification) -> Result<ChannelResult, LoyaltyError> {
        let message_id = Uuid::now_v7().to_string();

        info!(
            channel = "EMAIL",
            notification_id = %notification.notification_id,
            member_id = %notification.member_id,
            from = %self.from_address,
            to = %notification.recipient,
            message_id = %message_id,
            title = %notification.title,
            body = %notification.body,
            "模拟发送邮件通知"
        );

        Ok(ChannelResult::ok(ChannelKind::Email, message_id))
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }
}

// ---------------------------------------------------------------------------
// APP 推送渠道
// ---------------------------------------------------------------------------

/// 模拟 APP 推送发送器
///
/// 生产环境中替换为 APNs / FCM 等推送服务的 SDK 调用
pub struct AppPushChannel;

#[async_trait]
impl NotificationChannel for AppPushChannel {
    async fn send(&self, notification: &Notification) -> Result<ChannelResult, LoyaltyError> {
        let message_id = Uuid::now_v7().to_string();

        info!(
            channel = "APP_PUSH",
            notification_id = %notification.notification_id,
            member_id = %notification.member_id,
            message_id = %message_id,
            title = %notification.title,
            "模拟发送 APP 推送通知"
        );

        Ok(ChannelResult::ok(ChannelKind::AppPush, message_id))
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::AppPush
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
