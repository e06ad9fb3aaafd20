//! Challenge 存储模块
//!
//! 提供多种存储后端支持：SQLite, Redis, Memory
//!
//! # 设计
//!
//! - `ChallengeStoreBackend` trait 定义统一的异步接口
//! - `ChallengeStore` enum 封装不同的后端实现
//! - 通过 `StorageConfig` 配置选择和初始化后端
//! - 存储句柄显式创建、显式关闭，不使用全局单例

use std::path::Path;

pub mod backend;
pub mod config;
pub mod memory;

#[cfg(feature = "backend-sqlite")]
pub mod sqlite;

#[cfg(feature = "backend-redis")]
pub mod redis;

use crate::error::{ChallengeError, ChallengeResult};
use crate::random::CHALLENGE_RANDOM_LEN;
use crate::types::{ChallengeRecord, TenantId};

pub use backend::ChallengeStoreBackend;
pub use config::{RedisConfig, SqliteConfig, StorageBackend, StorageConfig};

use memory::MemoryBackend;

#[cfg(feature = "backend-sqlite")]
use sqlite::SqliteBackend;

#[cfg(feature = "backend-redis")]
use redis::RedisBackend;

/// Challenge 存储统一接口
#[derive(Clone, Debug)]
pub enum ChallengeStore {
    /// SQLite 存储后端
    #[cfg(feature = "backend-sqlite")]
    Sqlite(Box<SqliteBackend>),

    /// Redis 存储后端
    #[cfg(feature = "backend-redis")]
    Redis(RedisBackend),

    /// 内存存储后端（始终可用）
    Memory(MemoryBackend),
}

impl ChallengeStore {
    /// 从配置创建存储实例
    ///
    /// # Arguments
    /// * `config` - 存储配置
    /// * `db_path` - 数据库文件存储目录路径（当 backend = "sqlite" 时使用，来自 ChallengerConfig.sqlite_path）
    ///
    /// # Errors
    /// - 后端初始化失败
    /// - 后端功能未启用（feature flag）
    pub async fn from_config<P: AsRef<Path>>(
        config: &StorageConfig,
        db_path: P,
    ) -> ChallengeResult<Self> {
        match config.backend {
            #[cfg(feature = "backend-sqlite")]
            StorageBackend::Sqlite => {
                let cfg = config.sqlite.clone().unwrap_or_default();
                let backend = SqliteBackend::new(&cfg, db_path.as_ref()).await?;
                Ok(Self::Sqlite(Box::new(backend)))
            }

            #[cfg(feature = "backend-redis")]
            StorageBackend::Redis => {
                let cfg = config
                    .redis
                    .as_ref()
                    .ok_or_else(|| ChallengeError::Config("Missing Redis config".into()))?;
                let backend = RedisBackend::new(cfg).await?;
                Ok(Self::Redis(backend))
            }

            StorageBackend::Memory => {
                let _ = db_path;
                Ok(Self::Memory(MemoryBackend::new()))
            }

            #[cfg(not(feature = "backend-sqlite"))]
            StorageBackend::Sqlite => Err(ChallengeError::Config(
                "SQLite backend not enabled. Compile with --features backend-sqlite".into(),
            )),

            #[cfg(not(feature = "backend-redis"))]
            StorageBackend::Redis => Err(ChallengeError::Config(
                "Redis backend not enabled. Compile with --features backend-redis".into(),
            )),
        }
    }

    /// 内存存储
    pub fn memory() -> Self {
        Self::Memory(MemoryBackend::new())
    }

    fn backend(&self) -> &dyn ChallengeStoreBackend {
        match self {
            #[cfg(feature = "backend-sqlite")]
            Self::Sqlite(b) => &**b,

            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b,

            Self::Memory(b) => b,
        }
    }

    /// 插入新签发的记录
    pub async fn insert(&self, record: &ChallengeRecord) -> ChallengeResult<()> {
        self.backend().insert(record).await
    }

    /// 原子地查找并递增使用次数
    pub async fn use_challenge(
        &self,
        value: &[u8; CHALLENGE_RANDOM_LEN],
        tenant: &TenantId,
        now: i64,
    ) -> ChallengeResult<Option<u64>> {
        self.backend().use_challenge(value, tenant, now).await
    }

    /// 清理过期记录
    ///
    /// 正常运行时由存储自身负责清理，这里只供测试观察
    #[cfg(any(test, feature = "test-util"))]
    pub async fn purge_expired(&self, now: i64) -> ChallengeResult<u64> {
        self.backend().purge_expired(now).await
    }

    /// 记录总数
    #[cfg(any(test, feature = "test-util"))]
    pub async fn count(&self) -> ChallengeResult<u64> {
        self.backend().count().await
    }

    /// 关闭存储连接
    pub async fn close(&self) {
        self.backend().close().await
    }

    /// 获取后端类型名称
    pub fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "backend-sqlite")]
            Self::Sqlite(_) => "SQLite",

            #[cfg(feature = "backend-redis")]
            Self::Redis(_) => "Redis",

            Self::Memory(_) => "Memory",
        }
    }
}
