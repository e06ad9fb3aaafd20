//! Challenge 服务错误定义

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 对外统一展示的验证失败信息
///
/// 不区分 token 格式错误、MAC 不匹配和已过期，避免泄露验证细节
pub const INVALID_OR_EXPIRED_MESSAGE: &str = "Invalid or expired challenge.";

/// Challenge 服务错误类型
#[derive(Error, Debug)]
pub enum ChallengeError {
    /// Token 无法解码（编码错误、前缀错误或长度不符）
    #[error("Malformed challenge: {reason}")]
    MalformedToken { reason: String },

    /// 没有匹配的有效 challenge（已过期、不存在或 MAC 不匹配）
    #[error("Invalid or expired challenge")]
    InvalidOrExpired,

    /// 插入时发生唯一性冲突
    #[error("Duplicate challenge")]
    DuplicateChallenge,

    /// 存储或摘要服务不可用
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),
}

/// 对外可见的错误种类
///
/// `VerifyOutcome` 中只携带种类，不携带内部原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedToken,
    InvalidOrExpired,
    DuplicateChallenge,
    BackendUnavailable,
}

impl ErrorKind {
    /// 对外展示的错误信息
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::MalformedToken | Self::InvalidOrExpired => INVALID_OR_EXPIRED_MESSAGE,
            Self::DuplicateChallenge => "Duplicate challenge.",
            Self::BackendUnavailable => "Challenge service unavailable.",
        }
    }
}

impl ChallengeError {
    /// 创建格式错误
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedToken {
            reason: reason.into(),
        }
    }

    /// 创建后端不可用错误
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable(message.into())
    }

    /// 获取错误种类
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedToken { .. } => ErrorKind::MalformedToken,
            Self::InvalidOrExpired => ErrorKind::InvalidOrExpired,
            Self::DuplicateChallenge => ErrorKind::DuplicateChallenge,
            Self::BackendUnavailable(_) | Self::Config(_) => ErrorKind::BackendUnavailable,
        }
    }

    /// 是否为验证失败（应转换为 `verified = false`，而不是向上抛出）
    pub fn is_verification_failure(&self) -> bool {
        matches!(self, Self::MalformedToken { .. } | Self::InvalidOrExpired)
    }

    /// 检查是否为可重试错误
    ///
    /// 唯一性冲突需要重新调用 `issue` 生成新的随机值，视为可重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::DuplicateChallenge)
    }
}

#[cfg(feature = "backend-sqlite")]
impl From<sqlx::Error> for ChallengeError {
    fn from(err: sqlx::Error) -> Self {
        Self::BackendUnavailable(format!("SQLite error: {err}"))
    }
}

#[cfg(feature = "backend-redis")]
impl From<redis::RedisError> for ChallengeError {
    fn from(err: redis::RedisError) -> Self {
        Self::BackendUnavailable(format!("Redis error: {err}"))
    }
}

/// Challenge 结果类型别名
pub type ChallengeResult<T> = Result<T, ChallengeError>;
