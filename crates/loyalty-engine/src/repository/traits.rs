//! 仓储 Trait 定义
//!
//! 定义仓储接口，便于服务层依赖抽象而非具体实现，支持 mock 测试

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::Member;

/// 会员账户仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemberRepositoryTrait: Send + Sync {
    /// 创建会员；user_id 已存在时不写入并返回 false
    async fn insert_if_absent(&self, member: &Member) -> Result<bool>;
    async fn get_by_id(&self, member_id: Uuid) -> Result<Option<Member>>;
    async fn get_by_user_id(&self, user_id: &str) -> Result<Option<Member>>;
}
