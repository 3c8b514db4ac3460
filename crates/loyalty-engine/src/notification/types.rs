//! 通知类型定义

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Member, Tier};

/// 通知类型
///
/// 积分引擎只产生三类出站通知，各自对应不同的消息模板
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// 注册欢迎
    Welcome,
    /// 等级升级
    TierUpgrade,
    /// 兑换确认
    RedemptionConfirmed,
}

/// 通知投递渠道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelKind {
    Email,
    AppPush,
}

/// 通知请求
///
/// 包含发送通知所需的全部信息。通知是尽力而为的外部副作用，
/// 发送失败只记录日志，绝不回滚已提交的账本变更。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// 通知唯一标识
    pub notification_id: String,
    /// 目标会员
    pub member_id: Uuid,
    /// 投递地址（邮箱）
    pub recipient: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    /// 要发送的渠道列表（按会员通讯偏好筛选）
    pub channels: Vec<ChannelKind>,
    /// 通知携带的业务数据
    pub data: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        member: &Member,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        // 渠道由会员通讯偏好决定，偏好全关时通知自然落空
        let mut channels = Vec::new();
        if member.preferences.0.email_enabled {
            channels.push(ChannelKind::Email);
        }
        if member.preferences.0.push_enabled {
            channels.push(ChannelKind::AppPush);
        }

        Self {
            notification_id: Uuid::now_v7().to_string(),
            member_id: member.id,
            recipient: member.email.clone(),
            kind,
            title: title.into(),
            body: body.into(),
            channels,
            data: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// 添加业务数据
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// 通知构建器
///
/// 提供各业务事件对应的通知创建方法
pub struct NotificationBuilder;

impl NotificationBuilder {
    /// 注册欢迎通知
    pub fn welcome(member: &Member) -> Notification {
        Notification::new(
            member,
            NotificationKind::Welcome,
            "欢迎加入会员计划！",
            "您的会员账户已开通，完成入住即可开始累积积分。",
        )
        .with_data("memberId", serde_json::json!(member.id))
    }

    /// 等级升级通知
    pub fn tier_upgrade(member: &Member, from: Tier, to: Tier, bonus_points: i64) -> Notification {
        Notification::new(
            member,
            NotificationKind::TierUpgrade,
            "恭喜您升级了！",
            format!(
                "您的会员等级已从 {from} 升级为 {to}，并获得 {bonus_points} 升级奖励积分。"
            ),
        )
        .with_data("fromTier", serde_json::json!(from))
        .with_data("toTier", serde_json::json!(to))
        .with_data("bonusPoints", serde_json::json!(bonus_points))
    }

    /// 兑换确认通知
    pub fn redemption_confirmed(
        member: &Member,
        redemption_id: Uuid,
        reward_name: &str,
        points_used: i64,
    ) -> Notification {
        Notification::new(
            member,
            NotificationKind::RedemptionConfirmed,
            "兑换成功",
            format!("您已使用 {points_used} 积分兑换「{reward_name}」。"),
        )
        .with_data("redemptionId", serde_json::json!(redemption_id))
        .with_data("rewardName", serde_json::json!(reward_name))
        .with_data("pointsUsed", serde_json::json!(points_used))
    }
}

/// 单渠道发送结果
#[derive(Debug, Clone)]
pub struct ChannelResult {
    pub channel: ChannelKind,
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl ChannelResult {
    pub fn ok(channel: ChannelKind, message_id: impl Into<String>) -> Self {
        Self {
            channel,
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failed(channel: ChannelKind, error: impl Into<String>) -> Self {
        Self {
            channel,
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// 通知发送汇总结果
#[derive(Debug, Clone)]
pub struct NotificationResult {
    pub notification_id: String,
    pub results: Vec<ChannelResult>,
}

impl NotificationResult {
    /// 是否至少有一个渠道发送成功
    pub fn any_succeeded(&self) -> bool {
        self.results.iter().any(|r| r.success)
    }
}
