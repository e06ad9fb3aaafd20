//! 存储后端配置
//!
//! 定义各种存储后端的配置结构

use serde::{Deserialize, Serialize};

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 存储后端类型
    pub backend: StorageBackend,

    /// SQLite 配置（当 backend = "sqlite" 时必需）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite: Option<SqliteConfig>,

    /// Redis 配置（当 backend = "redis" 时必需）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite: Some(SqliteConfig::default()),
            redis: None,
        }
    }
}

/// 存储后端类型枚举
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite 数据库
    Sqlite,
    /// Redis 内存数据库
    Redis,
    /// 进程内存（测试与单机开发）
    Memory,
}

/// SQLite 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// 数据库文件名（位于 `sqlite_path` 目录下）
    #[serde(default = "default_sqlite_file")]
    pub file: String,

    /// 连接池大小
    #[serde(default = "default_sqlite_pool_size")]
    pub pool_size: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            file: default_sqlite_file(),
            pool_size: default_sqlite_pool_size(),
        }
    }
}

fn default_sqlite_file() -> String {
    "challenges.db".to_string()
}

fn default_sqlite_pool_size() -> u32 {
    10
}

/// Redis 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis 连接 URL
    ///
    /// 格式：redis://[username:password@]host[:port][/database]
    /// 示例：redis://localhost:6379/0
    pub url: String,

    /// 连接池大小
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// 键前缀
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            pool_size: default_redis_pool_size(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_redis_pool_size() -> usize {
    20
}

fn default_key_prefix() -> String {
    "challenge".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_storage_config() {
        let config = StorageConfig::default();
        assert_eq!(config.backend, StorageBackend::Sqlite);
        assert_eq!(config.sqlite.unwrap().file, "challenges.db");
    }

    #[test]
    fn test_serialize_sqlite_config() {
        let config = StorageConfig::default();
        let toml = toml::to_string(&config).unwrap();
        assert!(toml.contains("backend = \"sqlite\""));
        assert!(!toml.contains("[redis]"));
    }

    #[test]
    fn test_deserialize_redis_config() {
        let toml_str = r#"
            backend = "redis"

            [redis]
            url = "redis://localhost:6379/1"
            pool_size = 30
        "#;

        let config: StorageConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.backend, StorageBackend::Redis);
        assert!(config.sqlite.is_none());

        let redis = config.redis.unwrap();
        assert_eq!(redis.url, "redis://localhost:6379/1");
        assert_eq!(redis.pool_size, 30);
        assert_eq!(redis.key_prefix, "challenge");
    }

    #[test]
    fn test_deserialize_memory_backend() {
        let config: StorageConfig = toml::from_str(r#"backend = "memory""#).unwrap();
        assert_eq!(config.backend, StorageBackend::Memory);
    }
}
