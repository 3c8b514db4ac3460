//! 领域模型定义
//!
//! 会员账户、积分流水、奖励目录与兑换记录的持久化形态。

mod enums;
mod member;
mod reward;
mod transaction;

pub use enums::{PointsSource, RedemptionStatus, Tier, TransactionType};
pub use member::{CommunicationPreferences, Member};
pub use reward::{Redemption, Reward, RewardRestrictions};
pub use transaction::{EARNED_POINTS_VALIDITY_DAYS, Transaction};
