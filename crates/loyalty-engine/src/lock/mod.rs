//! 会员锁模块

mod member_lock;

pub use member_lock::{LockConfig, MemberLockGuard, MemberLockManager};
