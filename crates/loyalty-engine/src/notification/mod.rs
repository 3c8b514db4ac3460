//! 出站通知模块
//!
//! 账本变更提交后触发的外部副作用：欢迎、升级、兑换确认三类通知，
//! 经会员通讯偏好筛选渠道后并行投递。通知永远是尽力而为的，
//! 发送失败不影响已提交的积分事务。

pub mod channels;
pub mod sender;
pub mod service;
pub mod types;

pub use channels::{AppPushChannel, EmailChannel, NotificationChannel};
pub use sender::NotificationSender;
pub use service::NotificationService;
pub use types::{
    ChannelKind, ChannelResult, Notification, NotificationBuilder, NotificationKind,
    NotificationResult,
};
