//! 会员锁管理器
//!
//! 以会员 ID 为键的进程内互斥锁仲裁池：同一会员的读-改-写全程串行，
//! 不同会员之间完全并行，避免单一全局锁成为吞吐瓶颈。
//! 锁只在账本事件应用的加载-变更-持久化区间内持有，守卫释放时
//! 若无其他持有者或等待者则从仲裁池中移除对应条目。

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::error::{LoyaltyError, Result};

/// 锁配置
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// 获取锁的最长等待时间，超时返回 LockTimeout 而不是无限阻塞
    pub acquire_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// 会员锁管理器
pub struct MemberLockManager {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
    config: LockConfig,
}

impl MemberLockManager {
    pub fn new(config: LockConfig) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            config,
        }
    }

    /// 使用默认配置创建
    pub fn with_defaults() -> Self {
        Self::new(LockConfig::default())
    }

    /// 获取指定会员的互斥锁
    ///
    /// 返回的守卫在 drop 时自动释放。超过配置的等待时间返回
    /// `LockTimeout`，调用方可按可重试错误处理。
    pub async fn acquire(&self, member_id: Uuid) -> Result<MemberLockGuard> {
        let lock = self
            .locks
            .entry(member_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = tokio::time::timeout(self.config.acquire_timeout, lock.lock_owned())
            .await
            .map_err(|_| LoyaltyError::LockTimeout(member_id))?;

        debug!(member_id = %member_id, "Member lock acquired");

        Ok(MemberLockGuard {
            member_id,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        })
    }

    /// 当前仲裁池中的锁数量（用于监控）
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// 会员锁守卫
///
/// RAII 包装器，drop 时释放锁并尝试回收仲裁池条目
#[derive(Debug)]
pub struct MemberLockGuard {
    member_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl MemberLockGuard {
    pub fn member_id(&self) -> Uuid {
        self.member_id
    }
}

impl Drop for MemberLockGuard {
    fn drop(&mut self) {
        // 先释放互斥锁；仅当无其他引用时回收条目（等待者持有的克隆会使计数 > 1）
        self.guard.take();
        self.locks
            .remove_if(&self.member_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    #[tokio::test]
    async fn test_same_member_serializes() {
        let manager = Arc::new(MemberLockManager::with_defaults());
        let member_id = Uuid::now_v7();
        let in_critical = Arc::new(AtomicBool::new(false));
        let completed = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            let in_critical = in_critical.clone();
            let completed = completed.clone();
            handles.push(tokio::spawn(async move {
                let _guard = manager.acquire(member_id).await.unwrap();
                // 临界区内不允许出现第二个持有者
                assert!(!in_critical.swap(true, Ordering::SeqCst));
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_critical.store(false, Ordering::SeqCst);
                completed.fetch_add(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(completed.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_different_members_do_not_block() {
        let manager = MemberLockManager::with_defaults();
        let guard_a = manager.acquire(Uuid::now_v7()).await.unwrap();
        // 持有 A 的锁时获取 B 的锁不应超时
        let guard_b = manager.acquire(Uuid::now_v7()).await.unwrap();
        assert_ne!(guard_a.member_id(), guard_b.member_id());
    }

    #[tokio::test]
    async fn test_entry_evicted_after_release() {
        let manager = MemberLockManager::with_defaults();
        let member_id = Uuid::now_v7();

        let guard = manager.acquire(member_id).await.unwrap();
        assert_eq!(manager.len(), 1);
        drop(guard);
        assert!(manager.is_empty());

        // 大量不同会员依次加锁释放后仲裁池不应累积条目
        for _ in 0..64 {
            let g = manager.acquire(Uuid::now_v7()).await.unwrap();
            drop(g);
        }
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_eviction_keeps_waiter_serialized() {
        let manager = Arc::new(MemberLockManager::with_defaults());
        let member_id = Uuid::now_v7();

        let first = manager.acquire(member_id).await.unwrap();
        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.acquire(member_id).await.unwrap() })
        };
        tokio::task::yield_now().await;

        // 等待者持有克隆，首个守卫释放时不得回收条目
        drop(first);
        let second = waiter.await.unwrap();
        assert_eq!(second.member_id(), member_id);
        drop(second);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_acquire_timeout() {
        let manager = MemberLockManager::new(LockConfig {
            acquire_timeout: Duration::from_millis(20),
        });
        let member_id = Uuid::now_v7();

        let _held = manager.acquire(member_id).await.unwrap();
        let err = manager.acquire(member_id).await.unwrap_err();
        assert!(matches!(err, LoyaltyError::LockTimeout(_)));
        assert!(err.is_retryable());
    }
}
