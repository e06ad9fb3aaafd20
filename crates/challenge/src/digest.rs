//! 带密钥摘要（HMAC）
//!
//! 无状态后端通过 `KeyedDigestProvider` 对 challenge 计算 MAC。
//! 租户密钥只在单次调用内存在，使用 `Zeroizing` 在离开作用域时清零，
//! 不出现在日志、`Debug` 输出或错误信息中。

use crate::error::{ChallengeError, ChallengeResult};
use crate::types::TenantId;
use async_trait::async_trait;
use base64::prelude::*;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 输出长度
pub const HMAC_SHA256_LEN: usize = 32;

/// 主密钥长度
pub const MASTER_KEY_LEN: usize = 32;

/// 租户密钥派生标签
const TENANT_KEY_LABEL: &[u8] = b"tenant-key:";

/// 主密钥来源
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", content = "value", rename_all = "lowercase")]
pub enum SecretSource {
    /// 直接从配置文件读取
    Direct(String),
    /// 从环境变量读取
    Env(String),
    /// 从文件路径读取
    File(String),
}

impl std::fmt::Debug for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct(_) => f.write_str("Direct(<redacted>)"),
            Self::Env(name) => f.debug_tuple("Env").field(name).finish(),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

impl SecretSource {
    /// 读取并解析主密钥
    ///
    /// 支持 64 字符十六进制或 43/44 字符 Base64（32 字节）
    pub fn load(&self) -> ChallengeResult<Zeroizing<Vec<u8>>> {
        let raw = Zeroizing::new(match self {
            Self::Direct(value) => {
                debug!("Loading challenge master key from direct configuration");
                value.clone()
            }
            Self::Env(var) => {
                debug!("Loading challenge master key from environment variable: {}", var);
                std::env::var(var).map_err(|e| {
                    ChallengeError::Config(format!(
                        "Failed to read master key from environment variable {var}: {e}"
                    ))
                })?
            }
            Self::File(path) => {
                debug!("Loading challenge master key from file: {}", path);
                std::fs::read_to_string(path).map_err(|e| {
                    ChallengeError::Config(format!("Failed to read master key from file {path}: {e}"))
                })?
            }
        });

        parse_master_key(raw.trim())
    }
}

/// 解析主密钥字符串
fn parse_master_key(encoded: &str) -> ChallengeResult<Zeroizing<Vec<u8>>> {
    let bytes = if encoded.len() == 64 {
        hex::decode(encoded)
            .map_err(|e| ChallengeError::Config(format!("Invalid master key hex format: {e}")))?
    } else if encoded.len() == 44 || encoded.len() == 43 {
        let engine = if encoded.len() == 44 {
            &BASE64_STANDARD
        } else {
            &BASE64_STANDARD_NO_PAD
        };
        engine
            .decode(encoded)
            .map_err(|e| ChallengeError::Config(format!("Invalid master key base64 format: {e}")))?
    } else {
        return Err(ChallengeError::Config(format!(
            "Invalid master key length: expected 64 hex chars or 44 base64 chars, got {}",
            encoded.len()
        )));
    };
    let bytes = Zeroizing::new(bytes);

    if bytes.len() != MASTER_KEY_LEN {
        return Err(ChallengeError::Config(format!(
            "Invalid master key size: expected {MASTER_KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    Ok(bytes)
}

/// 租户密钥解析
///
/// 返回的密钥只应在当次调用中使用
pub trait TenantKeyResolver: Send + Sync {
    fn resolve(&self, tenant: &TenantId) -> ChallengeResult<Zeroizing<Vec<u8>>>;
}

/// 从主密钥派生租户密钥：`HMAC-SHA256(master, "tenant-key:" || tenant)`
#[derive(Clone)]
pub struct DerivedKeyResolver {
    master: Arc<Zeroizing<Vec<u8>>>,
}

impl std::fmt::Debug for DerivedKeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKeyResolver").finish_non_exhaustive()
    }
}

impl DerivedKeyResolver {
    pub fn from_source(source: &SecretSource) -> ChallengeResult<Self> {
        Ok(Self {
            master: Arc::new(source.load()?),
        })
    }

    /// 直接使用原始主密钥字节
    pub fn from_bytes(master: &[u8]) -> ChallengeResult<Self> {
        if master.len() != MASTER_KEY_LEN {
            return Err(ChallengeError::Config(format!(
                "Invalid master key size: expected {MASTER_KEY_LEN} bytes, got {}",
                master.len()
            )));
        }
        Ok(Self {
            master: Arc::new(Zeroizing::new(master.to_vec())),
        })
    }
}

impl TenantKeyResolver for DerivedKeyResolver {
    fn resolve(&self, tenant: &TenantId) -> ChallengeResult<Zeroizing<Vec<u8>>> {
        let mut mac = HmacSha256::new_from_slice(&self.master)
            .map_err(|e| ChallengeError::Config(format!("Invalid master key: {e}")))?;
        mac.update(TENANT_KEY_LABEL);
        mac.update(tenant.as_bytes());
        Ok(Zeroizing::new(mac.finalize().into_bytes().to_vec()))
    }
}

/// 带密钥摘要能力
///
/// 确定性、按租户加密钥、固定输出长度
#[async_trait]
pub trait KeyedDigestProvider: Send + Sync {
    /// 输出长度（字节）
    fn mac_len(&self) -> usize;

    /// 计算 `data` 在租户密钥下的 MAC
    ///
    /// 摘要服务不可达时返回 `BackendUnavailable`
    async fn sign(&self, tenant: &TenantId, data: &[u8]) -> ChallengeResult<Vec<u8>>;
}

/// 本地 HMAC-SHA256 实现
#[derive(Clone, Debug)]
pub struct HmacDigestProvider<R> {
    resolver: R,
}

impl<R: TenantKeyResolver> HmacDigestProvider<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl<R: TenantKeyResolver> KeyedDigestProvider for HmacDigestProvider<R> {
    fn mac_len(&self) -> usize {
        HMAC_SHA256_LEN
    }

    async fn sign(&self, tenant: &TenantId, data: &[u8]) -> ChallengeResult<Vec<u8>> {
        let key = self.resolver.resolve(tenant)?;
        let mut mac = HmacSha256::new_from_slice(&key)
            .map_err(|e| ChallengeError::unavailable(format!("Failed to key HMAC: {e}")))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// 生成新的主密钥（十六进制）
pub fn generate_master_key() -> String {
    use rand::RngCore;
    let mut key = Zeroizing::new([0u8; MASTER_KEY_LEN]);
    rand::rngs::OsRng.fill_bytes(&mut key[..]);
    hex::encode(&key[..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn provider() -> HmacDigestProvider<DerivedKeyResolver> {
        HmacDigestProvider::new(DerivedKeyResolver::from_bytes(&[42u8; 32]).unwrap())
    }

    #[tokio::test]
    async fn test_sign_is_deterministic() {
        let provider = provider();
        let tenant = TenantId::new("verifier-a").unwrap();

        let mac1 = provider.sign(&tenant, b"payload").await.unwrap();
        let mac2 = provider.sign(&tenant, b"payload").await.unwrap();
        assert_eq!(mac1, mac2);
        assert_eq!(mac1.len(), provider.mac_len());

        let other = provider.sign(&tenant, b"payload2").await.unwrap();
        assert_ne!(mac1, other);
    }

    #[tokio::test]
    async fn test_tenant_keys_differ() {
        let provider = provider();
        let a = TenantId::new("verifier-a").unwrap();
        let b = TenantId::new("verifier-b").unwrap();

        let mac_a = provider.sign(&a, b"payload").await.unwrap();
        let mac_b = provider.sign(&b, b"payload").await.unwrap();
        assert_ne!(mac_a, mac_b);
    }

    #[test]
    fn test_parse_master_key_formats() {
        let hex_key = generate_master_key();
        assert_eq!(hex_key.len(), 64);
        assert_eq!(parse_master_key(&hex_key).unwrap().len(), 32);

        let b64 = BASE64_STANDARD.encode([9u8; 32]);
        assert_eq!(parse_master_key(&b64).unwrap().as_slice(), &[9u8; 32]);

        let b64_no_pad = BASE64_STANDARD_NO_PAD.encode([9u8; 32]);
        assert_eq!(parse_master_key(&b64_no_pad).unwrap().as_slice(), &[9u8; 32]);

        let err = parse_master_key("too-short").unwrap_err();
        assert!(err.to_string().contains("Invalid master key length"));
    }

    #[test]
    fn test_debug_never_prints_secret() {
        let source = SecretSource::Direct("00ff00ff".to_string());
        let printed = format!("{source:?}");
        assert!(!printed.contains("00ff00ff"));

        let resolver = DerivedKeyResolver::from_bytes(&[7u8; 32]).unwrap();
        assert_eq!(format!("{resolver:?}"), "DerivedKeyResolver { .. }");
    }

    #[test]
    #[serial]
    fn test_master_key_from_environment() {
        let key = generate_master_key();
        unsafe {
            std::env::set_var("TEST_CHALLENGE_MASTER_KEY", &key);
        }

        let resolver =
            DerivedKeyResolver::from_source(&SecretSource::Env("TEST_CHALLENGE_MASTER_KEY".into()));
        assert!(resolver.is_ok());

        unsafe {
            std::env::remove_var("TEST_CHALLENGE_MASTER_KEY");
        }

        let missing =
            DerivedKeyResolver::from_source(&SecretSource::Env("TEST_CHALLENGE_MASTER_KEY".into()));
        assert!(matches!(missing, Err(ChallengeError::Config(_))));
    }

    #[test]
    fn test_master_key_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let key = generate_master_key();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{key}").unwrap();
        file.flush().unwrap();

        let source = SecretSource::File(file.path().to_string_lossy().to_string());
        assert!(DerivedKeyResolver::from_source(&source).is_ok());
    }

    #[test]
    fn test_secret_source_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            secret: SecretSource,
        }

        let parsed: Wrapper = toml::from_str(
            r#"
            [secret]
            source = "env"
            value = "CHALLENGE_MASTER_KEY"
            "#,
        )
        .unwrap();
        assert_eq!(
            parsed.secret,
            SecretSource::Env("CHALLENGE_MASTER_KEY".to_string())
        );
    }
}
