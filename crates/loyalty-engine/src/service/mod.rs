//! 业务服务层
//!
//! 编排账本管道、仓储与通知的业务入口。写路径统一遵循：
//! 校验 -> 会员锁 -> 事务内 FOR UPDATE -> 账本应用 -> 原子提交
//! -> 提交后副作用（通知、metrics）。

pub mod dto;
mod expiry_service;
mod member_service;
mod query_service;
mod redemption_service;
mod transaction_service;

pub use dto::*;
pub use expiry_service::ExpiryService;
pub use member_service::MemberService;
pub use query_service::{ProgramStatsDto, QueryService, TierDistributionDto};
pub use redemption_service::RedemptionService;
pub use transaction_service::TransactionService;
