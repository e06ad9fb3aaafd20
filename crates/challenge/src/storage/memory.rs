//! 内存存储后端实现
//!
//! 进程内 HashMap，用于测试与单机开发。过期记录对查询不可见，在插入时顺带清理。

use crate::error::{ChallengeError, ChallengeResult};
use crate::random::CHALLENGE_RANDOM_LEN;
use crate::storage::backend::ChallengeStoreBackend;
use crate::types::{ChallengeRecord, TenantId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// 内存存储后端
#[derive(Clone, Default)]
pub struct MemoryBackend {
    records: Arc<Mutex<HashMap<[u8; CHALLENGE_RANDOM_LEN], ChallengeRecord>>>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend").finish_non_exhaustive()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChallengeStoreBackend for MemoryBackend {
    async fn init(&self) -> ChallengeResult<()> {
        Ok(())
    }

    async fn insert(&self, record: &ChallengeRecord) -> ChallengeResult<()> {
        let mut records = self.records.lock().await;

        let now = record.created_at;
        records.retain(|_, existing| existing.is_live(now));

        if records.contains_key(&record.value) {
            return Err(ChallengeError::DuplicateChallenge);
        }
        records.insert(record.value, record.clone());
        Ok(())
    }

    async fn use_challenge(
        &self,
        value: &[u8; CHALLENGE_RANDOM_LEN],
        tenant: &TenantId,
        now: i64,
    ) -> ChallengeResult<Option<u64>> {
        let mut records = self.records.lock().await;

        let Some(record) = records
            .get_mut(value)
            .filter(|r| &r.tenant_id == tenant && r.is_live(now))
        else {
            return Ok(None);
        };

        record.uses += 1;
        record.updated_at = now;
        Ok(Some(record.uses))
    }

    async fn purge_expired(&self, now: i64) -> ChallengeResult<u64> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| r.is_live(now));
        let removed = (before - records.len()) as u64;
        if removed > 0 {
            debug!("Purged {} expired challenges from memory", removed);
        }
        Ok(removed)
    }

    async fn count(&self) -> ChallengeResult<u64> {
        Ok(self.records.lock().await.len() as u64)
    }

    async fn close(&self) {
        self.records.lock().await.clear();
    }
}
