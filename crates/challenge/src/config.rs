//! Challenge 服务配置

use crate::digest::SecretSource;
use crate::persistent::DEFAULT_TTL_MS;
use crate::stateless::validate_delta;
use crate::storage::{StorageBackend, StorageConfig};
use serde::{Deserialize, Serialize};

/// Challenge 后端类型
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeBackend {
    /// 持久化记录 + 使用计数
    #[default]
    Persistent,
    /// 无状态 HMAC token
    Stateless,
}

/// Challenge 服务配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChallengeConfig {
    /// 使用的后端
    #[serde(default)]
    pub backend: ChallengeBackend,

    /// 持久化后端配置
    #[serde(default)]
    pub persistent: PersistentConfig,

    /// 无状态后端配置（当 backend = "stateless" 时必需）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stateless: Option<StatelessConfig>,
}

/// 持久化后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentConfig {
    /// challenge 有效期（毫秒），默认 15 分钟
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// 存储配置
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            storage: StorageConfig::default(),
        }
    }
}

fn default_ttl_ms() -> u64 {
    DEFAULT_TTL_MS
}

/// 无状态后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatelessConfig {
    /// 时间桶宽度（秒），必须整除 3600
    #[serde(default = "default_delta_secs")]
    pub delta_secs: u32,

    /// 主密钥来源
    pub secret: SecretSource,
}

fn default_delta_secs() -> u32 {
    900
}

impl ChallengeConfig {
    /// 是否需要本地 SQLite 数据目录
    pub fn uses_sqlite(&self) -> bool {
        self.backend == ChallengeBackend::Persistent
            && self.persistent.storage.backend == StorageBackend::Sqlite
    }

    /// 验证配置有效性
    ///
    /// 以 "Warning:" 开头的条目不阻止启动
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match self.backend {
            ChallengeBackend::Persistent => {
                let storage = &self.persistent.storage;
                if storage.backend == StorageBackend::Redis && storage.redis.is_none() {
                    errors.push(
                        "Challenge store is configured to use Redis but redis config is missing"
                            .to_string(),
                    );
                }
                if storage.backend == StorageBackend::Memory {
                    errors.push(
                        "Warning: memory challenge store is process-local and not shared between instances"
                            .to_string(),
                    );
                }
                if self.persistent.ttl_ms == 0 {
                    errors.push(
                        "Warning: persistent.ttl_ms is 0, issued challenges will never verify"
                            .to_string(),
                    );
                }
            }
            ChallengeBackend::Stateless => match &self.stateless {
                None => errors.push(
                    "Stateless challenge backend selected but [stateless] config is missing"
                        .to_string(),
                ),
                Some(stateless) => {
                    if let Err(e) = validate_delta(stateless.delta_secs) {
                        errors.push(e.to_string());
                    }
                    if matches!(stateless.secret, SecretSource::Direct(_)) {
                        errors.push(
                            "Warning: stateless master key is stored directly in the config file"
                                .to_string(),
                        );
                    }
                }
            },
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
