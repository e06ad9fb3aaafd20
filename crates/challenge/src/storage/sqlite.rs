//! SQLite 存储后端实现
//!
//! 使用 sqlx 提供原生异步 SQLite 存储支持

use crate::error::{ChallengeError, ChallengeResult};
use crate::random::CHALLENGE_RANDOM_LEN;
use crate::storage::backend::ChallengeStoreBackend;
use crate::storage::config::SqliteConfig;
use crate::types::{ChallengeRecord, TenantId};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite 存储后端
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    file: PathBuf,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("file", &self.file)
            .finish()
    }
}

impl SqliteBackend {
    /// 创建新的 SQLite 后端实例
    ///
    /// # Arguments
    /// * `config` - SQLite 配置
    /// * `db_path` - 数据库文件存储目录路径（来自 ChallengerConfig.sqlite_path）
    pub async fn new(config: &SqliteConfig, db_path: &Path) -> ChallengeResult<Self> {
        let file = db_path.join(&config.file);

        // 创建连接选项并启用 WAL 模式
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", file.display()))
            .map_err(|e| ChallengeError::Config(format!("Failed to parse SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.pool_size.max(1))
            .connect_with(options)
            .await
            .map_err(|e| ChallengeError::unavailable(format!("Failed to connect to SQLite: {e}")))?;

        let backend = Self { pool, file };
        backend.init().await?;

        info!(
            "SQLite challenge store initialized: path={}, WAL mode enabled",
            backend.file.display()
        );

        Ok(backend)
    }
}

#[async_trait]
impl ChallengeStoreBackend for SqliteBackend {
    async fn init(&self) -> ChallengeResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS challenges (
                value BLOB NOT NULL UNIQUE,
                tenant_id TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                uses INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ChallengeError::unavailable(format!("Failed to create challenges table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_challenges_expires_at ON challenges(expires_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ChallengeError::unavailable(format!("Failed to create index: {e}")))?;

        debug!("SQLite challenge table and indexes initialized");
        Ok(())
    }

    async fn insert(&self, record: &ChallengeRecord) -> ChallengeResult<()> {
        let mut tx = self.pool.begin().await?;

        let purged = sqlx::query("DELETE FROM challenges WHERE expires_at <= ?")
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let inserted = sqlx::query(
            r#"INSERT INTO challenges (value, tenant_id, expires_at, uses, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        )
        .bind(&record.value[..])
        .bind(record.tenant_id.as_str())
        .bind(record.expires_at)
        .bind(i64::try_from(record.uses).unwrap_or(i64::MAX))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(ChallengeError::DuplicateChallenge);
            }
            Err(e) => {
                return Err(ChallengeError::unavailable(format!(
                    "Failed to insert challenge: {e}"
                )));
            }
        }

        tx.commit().await?;

        if purged > 0 {
            debug!("Purged {} expired challenges during insert", purged);
        }
        Ok(())
    }

    async fn use_challenge(
        &self,
        value: &[u8; CHALLENGE_RANDOM_LEN],
        tenant: &TenantId,
        now: i64,
    ) -> ChallengeResult<Option<u64>> {
        let uses = sqlx::query_scalar::<_, i64>(
            r#"UPDATE challenges SET uses = uses + 1, updated_at = ?1
               WHERE value = ?2 AND tenant_id = ?3 AND expires_at > ?1
               RETURNING uses"#,
        )
        .bind(now)
        .bind(&value[..])
        .bind(tenant.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ChallengeError::unavailable(format!("Failed to use challenge: {e}")))?;

        Ok(uses.map(|n| n.max(0) as u64))
    }

    async fn purge_expired(&self, now: i64) -> ChallengeResult<u64> {
        let result = sqlx::query("DELETE FROM challenges WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                ChallengeError::unavailable(format!("Failed to purge expired challenges: {e}"))
            })?;

        let purged = result.rows_affected();
        if purged > 0 {
            info!("Purged {} expired challenges from SQLite", purged);
        }
        Ok(purged)
    }

    async fn count(&self) -> ChallengeResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM challenges")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ChallengeError::unavailable(format!("Failed to count challenges: {e}")))?;

        Ok(count.max(0) as u64)
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("SQLite challenge store closed: {}", self.file.display());
    }
}
