//! Challenge 服务
//!
//! 为可验证凭证出示协议签发并验证一次性 challenge（nonce），防止重放已截获的出示。
//!
//! 两种后端：
//!
//! - 持久化：随机 128 位值写入存储，带过期时间与使用计数（SQLite / Redis / 内存）
//! - 无状态：随机值 + 按时间桶计算的 HMAC，无需存储
//!
//! ```no_run
//! # async fn demo() -> challenge::ChallengeResult<()> {
//! use challenge::{ChallengeConfig, ChallengeService, TenantId};
//!
//! let service = ChallengeService::from_config(&ChallengeConfig::default(), "./data").await?;
//! let tenant = TenantId::new("z1verifier")?;
//! let token = service.issue(&tenant).await?;
//! let outcome = service.verify(&tenant, &token).await?;
//! assert!(outcome.verified);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod digest;
pub mod error;
pub mod gate;
pub mod persistent;
pub mod random;
pub mod service;
pub mod stateless;
pub mod storage;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::ChallengeCodec;
pub use config::{ChallengeBackend, ChallengeConfig, PersistentConfig, StatelessConfig};
pub use digest::{
    DerivedKeyResolver, HmacDigestProvider, KeyedDigestProvider, SecretSource, TenantKeyResolver,
    generate_master_key,
};
pub use error::{ChallengeError, ChallengeResult, ErrorKind, INVALID_OR_EXPIRED_MESSAGE};
pub use gate::{ChallengeCheck, PresentationGate};
pub use persistent::{DEFAULT_TTL_MS, PersistentChallengeStore};
#[cfg(any(test, feature = "test-util"))]
pub use random::FixedRandom;
pub use random::{CHALLENGE_RANDOM_LEN, OsRandom, RandomSource};
pub use service::ChallengeService;
pub use stateless::{StatelessChallengeSigner, next_bucket_boundary};
pub use storage::{ChallengeStore, ChallengeStoreBackend, StorageBackend, StorageConfig};
pub use types::{ChallengeRecord, TenantId, VerifyOutcome};
