//! 持久化 challenge
//!
//! 签发时写入一条带过期时间的记录，验证时原子地递增使用次数。
//! 同一个 challenge 在过期前可以被多次验证，每次返回递增后的 `uses`，
//! 是否只允许一次使用由调用方根据 `uses` 决定。

use crate::clock::{Clock, SystemClock};
use crate::codec::ChallengeCodec;
use crate::error::{ChallengeError, ChallengeResult};
use crate::random::{CHALLENGE_RANDOM_LEN, OsRandom, RandomSource};
use crate::storage::ChallengeStore;
use crate::types::{ChallengeRecord, TenantId, VerifyOutcome};
use std::sync::Arc;
use tracing::{debug, warn};

/// 默认有效期：15 分钟
pub const DEFAULT_TTL_MS: u64 = 15 * 60 * 1000;

/// 持久化 challenge 存储
#[derive(Clone)]
pub struct PersistentChallengeStore {
    store: ChallengeStore,
    ttl_ms: u64,
    random: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PersistentChallengeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentChallengeStore")
            .field("backend", &self.store.backend_name())
            .field("ttl_ms", &self.ttl_ms)
            .finish()
    }
}

impl PersistentChallengeStore {
    pub fn new(store: ChallengeStore, ttl_ms: u64) -> Self {
        Self {
            store,
            ttl_ms,
            random: Arc::new(OsRandom),
            clock: Arc::new(SystemClock),
        }
    }

    /// 替换随机数来源
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// 替换时钟
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn store(&self) -> &ChallengeStore {
        &self.store
    }

    /// 签发 challenge，有效期为配置的默认值
    pub async fn create(&self, tenant: &TenantId) -> ChallengeResult<String> {
        self.create_with_ttl(tenant, self.ttl_ms).await
    }

    /// 签发 challenge，指定有效期（毫秒）
    ///
    /// # Errors
    /// * `DuplicateChallenge` - 随机值与现有记录冲突，不使用相同的值重试
    /// * `BackendUnavailable` - 存储不可用
    pub async fn create_with_ttl(&self, tenant: &TenantId, ttl_ms: u64) -> ChallengeResult<String> {
        let value = self.random.challenge_bytes();
        let record = ChallengeRecord::issued(value, tenant.clone(), self.clock.now_millis(), ttl_ms);

        self.store.insert(&record).await.inspect_err(|e| {
            warn!("Failed to store challenge for tenant {}: {}", tenant, e);
        })?;

        debug!(
            "Issued persistent challenge: tenant={}, expires_at={}",
            tenant, record.expires_at
        );
        ChallengeCodec::encode(&value)
    }

    /// 验证 challenge 并递增使用次数
    ///
    /// 格式错误、过期、不存在或租户不符都返回 `verified = false`
    pub async fn verify(&self, tenant: &TenantId, token: &str) -> ChallengeResult<VerifyOutcome> {
        VerifyOutcome::recover(self.use_token(tenant, token).await)
    }

    async fn use_token(&self, tenant: &TenantId, token: &str) -> ChallengeResult<VerifyOutcome> {
        let decoded = ChallengeCodec::decode(token, CHALLENGE_RANDOM_LEN).inspect_err(|e| {
            debug!("Rejected persistent challenge for tenant {}: {}", tenant, e);
        })?;
        let mut value = [0u8; CHALLENGE_RANDOM_LEN];
        value.copy_from_slice(&decoded);

        match self
            .store
            .use_challenge(&value, tenant, self.clock.now_millis())
            .await?
        {
            Some(uses) => {
                debug!("Verified persistent challenge: tenant={}, uses={}", tenant, uses);
                Ok(VerifyOutcome::verified(Some(uses)))
            }
            None => {
                debug!("No live challenge matched for tenant {}", tenant);
                Err(ChallengeError::InvalidOrExpired)
            }
        }
    }

    /// 关闭底层存储
    pub async fn close(&self) {
        self.store.close().await;
    }
}
