//! Challenge 存储后端抽象接口
//!
//! 定义了所有存储后端必须实现的统一异步接口

use crate::error::ChallengeResult;
use crate::random::CHALLENGE_RANDOM_LEN;
use crate::types::{ChallengeRecord, TenantId};
use async_trait::async_trait;

/// Challenge 存储后端抽象接口
///
/// 所有存储后端（SQLite, Redis, Memory）都需要实现此 trait。
/// `insert` 与 `use_challenge` 必须各自是一次原子操作，协议层不做先读后写。
#[async_trait]
pub trait ChallengeStoreBackend: Send + Sync {
    /// 初始化存储后端
    ///
    /// 执行必要的初始化操作，如创建表、唯一索引等
    async fn init(&self) -> ChallengeResult<()>;

    /// 插入新签发的记录
    ///
    /// # Errors
    /// * `DuplicateChallenge` - `value` 已存在
    /// * `BackendUnavailable` - 存储错误
    async fn insert(&self, record: &ChallengeRecord) -> ChallengeResult<()>;

    /// 原子地查找并递增使用次数
    ///
    /// 只匹配 `value`、`tenant_id` 都相同且 `expires_at > now` 的记录
    ///
    /// # Returns
    /// * `Ok(Some(uses))` - 递增后的使用次数
    /// * `Ok(None)` - 没有匹配的有效记录
    async fn use_challenge(
        &self,
        value: &[u8; CHALLENGE_RANDOM_LEN],
        tenant: &TenantId,
        now: i64,
    ) -> ChallengeResult<Option<u64>>;

    /// 删除 `expires_at <= now` 的记录
    ///
    /// # Returns
    /// 被清理的记录数量（原生过期的后端返回 0）
    async fn purge_expired(&self, now: i64) -> ChallengeResult<u64>;

    /// 存储中的记录总数（包括尚未清理的过期记录）
    async fn count(&self) -> ChallengeResult<u64>;

    /// 关闭连接
    async fn close(&self);
}
