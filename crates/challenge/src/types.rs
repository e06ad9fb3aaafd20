//! Challenge 服务数据类型定义

use crate::error::{ChallengeError, ChallengeResult, ErrorKind};
use crate::random::CHALLENGE_RANDOM_LEN;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 租户（验证者实例）ID
///
/// challenge 的签发与验证都限定在同一租户内
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// 创建租户 ID，去除首尾空白，不允许为空
    pub fn new(id: impl Into<String>) -> ChallengeResult<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ChallengeError::Config("tenant id cannot be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = ChallengeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(tenant: TenantId) -> Self {
        tenant.0
    }
}

impl std::str::FromStr for TenantId {
    type Err = ChallengeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// 存储中的 challenge 记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRecord {
    /// 解码后的 challenge 值，全局唯一
    pub value: [u8; CHALLENGE_RANDOM_LEN],
    /// 签发租户
    pub tenant_id: TenantId,
    /// 过期时间（Unix 毫秒），创建后不再修改
    pub expires_at: i64,
    /// 验证次数，只增不减
    pub uses: u64,
    /// 创建时间（Unix 毫秒）
    pub created_at: i64,
    /// 最后更新时间（Unix 毫秒）
    pub updated_at: i64,
}

impl ChallengeRecord {
    /// 新签发的记录，`uses = 0`
    pub fn issued(
        value: [u8; CHALLENGE_RANDOM_LEN],
        tenant_id: TenantId,
        now: i64,
        ttl_ms: u64,
    ) -> Self {
        let ttl = i64::try_from(ttl_ms).unwrap_or(i64::MAX);
        Self {
            value,
            tenant_id,
            expires_at: now.saturating_add(ttl),
            uses: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// 在 `now` 时刻是否仍然有效
    pub fn is_live(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

/// 验证结果
///
/// 验证失败不作为错误抛出，而是 `verified = false` 并附带错误种类
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub verified: bool,
    /// 更新后的使用次数（仅持久化后端）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uses: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl VerifyOutcome {
    /// 验证成功
    pub fn verified(uses: Option<u64>) -> Self {
        Self {
            verified: true,
            uses,
            error: None,
        }
    }

    /// 验证失败
    pub fn rejected(kind: ErrorKind) -> Self {
        Self {
            verified: false,
            uses: None,
            error: Some(kind),
        }
    }

    /// 把验证类错误折叠为 `verified = false`，其他错误继续向上传播
    pub fn recover(result: ChallengeResult<Self>) -> ChallengeResult<Self> {
        match result {
            Err(e) if e.is_verification_failure() => Ok(Self::rejected(e.kind())),
            other => other,
        }
    }

    /// 对外展示的错误信息
    pub fn message(&self) -> Option<&'static str> {
        self.error.map(|kind| kind.public_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_trimmed_and_non_empty() {
        let tenant = TenantId::new("  z1verifier  ").unwrap();
        assert_eq!(tenant.as_str(), "z1verifier");
        assert!(TenantId::new("   ").is_err());
        assert!("".parse::<TenantId>().is_err());
    }

    #[test]
    fn test_tenant_id_deserialization_is_validated() {
        let tenant: TenantId = serde_json::from_str(r#"" verifier-a ""#).unwrap();
        assert_eq!(tenant.as_str(), "verifier-a");
        assert_eq!(serde_json::to_string(&tenant).unwrap(), r#""verifier-a""#);

        assert!(serde_json::from_str::<TenantId>(r#""   ""#).is_err());
        assert!(serde_json::from_str::<TenantId>(r#""""#).is_err());
    }

    #[test]
    fn test_record_expiry() {
        let tenant = TenantId::new("t").unwrap();
        let record = ChallengeRecord::issued([0u8; 16], tenant.clone(), 1_000, 500);
        assert_eq!(record.expires_at, 1_500);
        assert_eq!(record.uses, 0);
        assert!(record.is_live(1_499));
        assert!(!record.is_live(1_500));

        let zero_ttl = ChallengeRecord::issued([0u8; 16], tenant, 1_000, 0);
        assert!(!zero_ttl.is_live(1_000));
    }

    #[test]
    fn test_recover_folds_verification_failures() {
        let outcome = VerifyOutcome::recover(Err(ChallengeError::InvalidOrExpired)).unwrap();
        assert!(!outcome.verified);
        assert_eq!(outcome.error, Some(ErrorKind::InvalidOrExpired));
        assert_eq!(outcome.message(), Some("Invalid or expired challenge."));

        let unavailable = VerifyOutcome::recover(Err(ChallengeError::unavailable("down")));
        assert!(matches!(
            unavailable,
            Err(ChallengeError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn test_outcome_serialization_skips_empty_fields() {
        let json = serde_json::to_value(VerifyOutcome::verified(Some(2))).unwrap();
        assert_eq!(json, serde_json::json!({"verified": true, "uses": 2}));

        let json = serde_json::to_value(VerifyOutcome::verified(None)).unwrap();
        assert_eq!(json, serde_json::json!({"verified": true}));

        let json = serde_json::to_value(VerifyOutcome::rejected(ErrorKind::MalformedToken)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"verified": false, "error": "malformed_token"})
        );
    }
}
