//! Challenge 服务
//!
//! 按配置选择持久化或无状态后端，对外只暴露 `issue` / `verify`

use crate::config::{ChallengeBackend, ChallengeConfig};
use crate::digest::{DerivedKeyResolver, HmacDigestProvider};
use crate::error::{ChallengeError, ChallengeResult};
use crate::persistent::PersistentChallengeStore;
use crate::stateless::StatelessChallengeSigner;
use crate::storage::ChallengeStore;
use crate::types::{TenantId, VerifyOutcome};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Challenge 服务
///
/// clone 共享同一个存储连接池
#[derive(Clone, Debug)]
pub enum ChallengeService {
    Persistent(PersistentChallengeStore),
    Stateless(StatelessChallengeSigner),
}

impl ChallengeService {
    /// 从配置创建服务
    ///
    /// # Arguments
    /// * `config` - Challenge 配置
    /// * `data_dir` - SQLite 数据库目录
    pub async fn from_config<P: AsRef<Path>>(
        config: &ChallengeConfig,
        data_dir: P,
    ) -> ChallengeResult<Self> {
        let service = match config.backend {
            ChallengeBackend::Persistent => {
                let store =
                    ChallengeStore::from_config(&config.persistent.storage, data_dir).await?;
                Self::Persistent(PersistentChallengeStore::new(store, config.persistent.ttl_ms))
            }
            ChallengeBackend::Stateless => {
                let stateless = config.stateless.as_ref().ok_or_else(|| {
                    ChallengeError::Config("Missing stateless challenge config".into())
                })?;
                let resolver = DerivedKeyResolver::from_source(&stateless.secret)?;
                let signer = StatelessChallengeSigner::new(
                    stateless.delta_secs,
                    Arc::new(HmacDigestProvider::new(resolver)),
                )?;
                Self::Stateless(signer)
            }
        };

        info!("Challenge service initialized: backend={}", service.backend_name());
        Ok(service)
    }

    /// 签发 challenge
    pub async fn issue(&self, tenant: &TenantId) -> ChallengeResult<String> {
        match self {
            Self::Persistent(store) => store.create(tenant).await,
            Self::Stateless(signer) => signer.issue(tenant).await,
        }
    }

    /// 验证 challenge
    ///
    /// 验证失败返回 `Ok(VerifyOutcome { verified: false, .. })`，
    /// 只有后端不可用时返回 `Err`
    pub async fn verify(&self, tenant: &TenantId, token: &str) -> ChallengeResult<VerifyOutcome> {
        let result = match self {
            Self::Persistent(store) => store.verify(tenant, token).await,
            Self::Stateless(signer) => signer.verify(tenant, token).await,
        };

        if let Err(e) = &result {
            warn!("Challenge verification failed for tenant {}: {}", tenant, e);
        }
        result
    }

    /// 获取后端类型名称
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Persistent(store) => store.store().backend_name(),
            Self::Stateless(_) => "Stateless",
        }
    }

    /// 关闭服务
    pub async fn close(&self) {
        if let Self::Persistent(store) = self {
            store.close().await;
        }
    }
}
