//! 积分忠诚度引擎
//!
//! 酒店会员计划的积分账本与等级推进引擎。
//!
//! ## 核心功能
//!
//! - **会员注册**：幂等注册，并发注册同一用户只产生一个账户
//! - **积分累积**：入住订单按消费与间夜入账，倍率随会员等级放大
//! - **等级推进**：五级等级体系，等级永远由 total_points 唯一决定
//! - **升级奖励**：升级时按新等级序号发放一次性奖励积分
//! - **奖励兑换**：余额、等级门槛、年度次数等全量资格检查后原子扣减
//! - **积分过期**：周期性幂等清扫，逐笔过期超期的 earned 流水
//! - **通知发送**：注册/升级/兑换后的多渠道通知
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `tier`: 等级阈值与推进规则
//! - `ledger`: 积分账本流水管道（纯函数核心）
//! - `lock`: 进程内会员锁
//! - `repository`: 数据库仓储层
//! - `service`: 业务服务层
//! - `notification`: 通知服务模块

pub mod error;
pub mod ledger;
pub mod lock;
pub mod models;
pub mod notification;
pub mod repository;
pub mod service;
pub mod tier;

pub use error::{LoyaltyError, Result};
pub use ledger::{LedgerEntry, PostOutcome, TierChange};
pub use lock::{LockConfig, MemberLockGuard, MemberLockManager};
pub use models::*;
pub use notification::{
    Notification, NotificationBuilder, NotificationChannel, NotificationResult,
    NotificationSender, NotificationService,
};
pub use repository::{
    MemberRepository, MemberRepositoryTrait, RewardRepository, TransactionRepository,
};
pub use service::{
    ExpiryService, MemberService, QueryService, RedemptionService, TransactionService, dto,
};
pub use tier::{TierProgress, multiplier_of, tier_of};
