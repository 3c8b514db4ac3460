//! 通知分发服务
//!
//! 按通知声明的渠道列表并行分发，单渠道失败不影响其余渠道。
//! 发送结果汇总返回给调用方，同时以 metrics 计数便于观测投递质量。

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use loyalty_shared::config::NotificationConfig;
use tracing::{instrument, warn};

use crate::notification::channels::{AppPushChannel, EmailChannel, NotificationChannel};
use crate::notification::types::{ChannelResult, Notification, NotificationResult};

/// 通知分发服务
pub struct NotificationService {
    channels: Vec<Arc<dyn NotificationChannel>>,
    send_timeout: Duration,
}

impl NotificationService {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>, send_timeout: Duration) -> Self {
        Self {
            channels,
            send_timeout,
        }
    }

    /// 按配置装配默认渠道（邮件 + APP 推送）
    pub fn with_defaults(config: &NotificationConfig) -> Self {
        Self::new(
            vec![
                Arc::new(EmailChannel::new(config.email_from.clone())),
                Arc::new(AppPushChannel),
            ],
            Duration::from_millis(config.send_timeout_ms),
        )
    }

    /// 发送一条通知到它声明的所有渠道
    ///
    /// 渠道间相互独立并行发送。没有任何渠道匹配时（如会员关闭了全部通讯偏好）
    /// 直接返回空结果，不视为错误。
    #[instrument(skip(self, notification), fields(
        notification_id = %notification.notification_id,
        member_id = %notification.member_id,
    ))]
    pub async fn send(&self, notification: &Notification) -> NotificationResult {
        let tasks: Vec<_> = self
            .channels
            .iter()
            .filter(|c| notification.channels.contains(&c.kind()))
            .map(|channel| self.send_one(channel.clone(), notification))
            .collect();

        let results = join_all(tasks).await;

        for r in &results {
            if r.success {
                metrics::counter!("loyalty.notifications.sent").increment(1);
            } else {
                metrics::counter!("loyalty.notifications.failed").increment(1);
                warn!(
                    notification_id = %notification.notification_id,
                    channel = ?r.channel,
                    error = ?r.error,
                    "通知渠道发送失败"
                );
            }
        }

        NotificationResult {
            notification_id: notification.notification_id.clone(),
            results,
        }
    }

    async fn send_one(
        &self,
        channel: Arc<dyn NotificationChannel>,
        notification: &Notification,
    ) -> ChannelResult {
        let kind = channel.kind();
        match tokio::time::timeout(self.send_timeout, channel.send(notification)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => ChannelResult::failed(kind, e.to_string()),
            Err(_) => ChannelResult::failed(kind, "send timeout"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Member;
    use crate::notification::types::{ChannelKind, NotificationBuilder};
    use chrono::Utc;

    fn service() -> NotificationService {
        NotificationService::with_defaults(&NotificationConfig::default())
    }

    #[tokio::test]
    async fn test_send_to_all_channels() {
        let member = Member::new("user-1", "user-1@example.com", Utc::now());
        let notification = NotificationBuilder::welcome(&member);

        let result = service().send(&notification).await;
        assert_eq!(result.results.len(), 2);
        assert!(result.any_succeeded());
    }

    #[tokio::test]
    async fn test_send_respects_channel_selection() {
        let mut member = Member::new("user-1", "user-1@example.com", Utc::now());
        member.preferences.0.push_enabled = false;
        let notification = NotificationBuilder::welcome(&member);

        let result = service().send(&notification).await;
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].channel, ChannelKind::Email);
    }

    #[tokio::test]
    async fn test_send_with_no_channels_is_noop() {
        let mut member = Member::new("user-1", "user-1@example.com", Utc::now());
        member.preferences.0.email_enabled = false;
        member.preferences.0.push_enabled = false;
        let notification = NotificationBuilder::welcome(&member);

        let result = service().send(&notification).await;
        assert!(result.results.is_empty());
        assert!(!result.any_succeeded());
    }
}
