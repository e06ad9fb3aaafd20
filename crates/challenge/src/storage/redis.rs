//! Redis 存储后端实现
//!
//! 每个 challenge 一个 Hash，使用 `PEXPIREAT` 原生过期。
//! 插入与使用都通过 Lua 脚本在服务端原子执行。

use crate::error::{ChallengeError, ChallengeResult};
use crate::random::CHALLENGE_RANDOM_LEN;
use crate::storage::backend::ChallengeStoreBackend;
use crate::storage::config::RedisConfig;
use crate::types::{ChallengeRecord, TenantId};
use async_trait::async_trait;
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use redis::Script;
use std::sync::Arc;
use tracing::{debug, info};

/// 不存在时写入并设置过期时间；已存在返回 0
const INSERT_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1],
    'tenant_id', ARGV[1],
    'expires_at', ARGV[2],
    'uses', 0,
    'created_at', ARGV[3],
    'updated_at', ARGV[3])
redis.call('PEXPIREAT', KEYS[1], ARGV[2])
return 1
"#;

/// 租户匹配且未过期时递增 uses 并返回新值；否则返回 -1
const USE_SCRIPT: &str = r#"
local fields = redis.call('HMGET', KEYS[1], 'tenant_id', 'expires_at')
if not fields[1] or fields[1] ~= ARGV[1] then
    return -1
end
if tonumber(fields[2]) <= tonumber(ARGV[2]) then
    return -1
end
redis.call('HSET', KEYS[1], 'updated_at', ARGV[2])
return redis.call('HINCRBY', KEYS[1], 'uses', 1)
"#;

/// Redis 存储后端
///
/// 数据结构设计：
/// - {prefix}:{hex(value)} -> Hash {tenant_id, expires_at, uses, created_at, updated_at}
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
    key_prefix: String,
    insert_script: Arc<Script>,
    use_script: Arc<Script>,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl RedisBackend {
    /// 创建新的 Redis 后端实例
    pub async fn new(config: &RedisConfig) -> ChallengeResult<Self> {
        let mut cfg = Config::from_url(&config.url);
        cfg.pool = Some(PoolConfig::new(config.pool_size.max(1)));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| ChallengeError::Config(format!("Failed to create Redis pool: {e}")))?;

        let backend = Self {
            pool,
            key_prefix: config.key_prefix.clone(),
            insert_script: Arc::new(Script::new(INSERT_SCRIPT)),
            use_script: Arc::new(Script::new(USE_SCRIPT)),
        };
        backend.init().await?;

        info!(
            "Redis challenge store initialized: url={}, prefix={}",
            config.url, config.key_prefix
        );

        Ok(backend)
    }

    fn record_key(&self, value: &[u8; CHALLENGE_RANDOM_LEN]) -> String {
        format!("{}:{}", self.key_prefix, hex::encode(value))
    }

    async fn connection(&self) -> ChallengeResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| ChallengeError::unavailable(format!("Failed to get Redis connection: {e}")))
    }
}

#[async_trait]
impl ChallengeStoreBackend for RedisBackend {
    async fn init(&self) -> ChallengeResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut *conn)
            .await
            .map_err(|e| ChallengeError::unavailable(format!("Redis PING failed: {e}")))?;

        debug!("Redis backend initialized (no schema needed)");
        Ok(())
    }

    async fn insert(&self, record: &ChallengeRecord) -> ChallengeResult<()> {
        let mut conn = self.connection().await?;
        let key = self.record_key(&record.value);

        let inserted: i64 = self
            .insert_script
            .key(&key)
            .arg(record.tenant_id.as_str())
            .arg(record.expires_at)
            .arg(record.created_at)
            .invoke_async(&mut *conn)
            .await?;

        if inserted == 0 {
            return Err(ChallengeError::DuplicateChallenge);
        }
        Ok(())
    }

    async fn use_challenge(
        &self,
        value: &[u8; CHALLENGE_RANDOM_LEN],
        tenant: &TenantId,
        now: i64,
    ) -> ChallengeResult<Option<u64>> {
        let mut conn = self.connection().await?;

        let uses: i64 = self
            .use_script
            .key(self.record_key(value))
            .arg(tenant.as_str())
            .arg(now)
            .invoke_async(&mut *conn)
            .await?;

        Ok(u64::try_from(uses).ok())
    }

    async fn purge_expired(&self, _now: i64) -> ChallengeResult<u64> {
        // 依赖 PEXPIREAT，无需手动清理
        Ok(0)
    }

    async fn count(&self) -> ChallengeResult<u64> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}:*", self.key_prefix);

        let mut cursor: u64 = 0;
        let mut total: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut *conn)
                .await?;
            total += keys.len() as u64;
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(total)
    }

    async fn close(&self) {
        self.pool.close();
        debug!("Redis challenge store closed");
    }
}
