//! 凭证出示验证前的 challenge 检查
//!
//! 出示验证先检查 challenge，通过后再进入证明校验（不在本 crate 范围内）。

use crate::error::{ChallengeError, ChallengeResult, ErrorKind};
use crate::service::ChallengeService;
use crate::types::TenantId;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Challenge 检查结果，随出示验证结果一并返回
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeCheck {
    /// 本次验证后的使用次数（无状态后端为空）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_uses: Option<u64>,
}

/// 出示验证的 challenge 关卡
#[derive(Debug, Clone)]
pub struct PresentationGate {
    service: ChallengeService,
}

impl PresentationGate {
    pub fn new(service: ChallengeService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &ChallengeService {
        &self.service
    }

    /// 检查出示请求中携带的 challenge
    ///
    /// challenge 缺失或验证失败时返回错误，调用方应直接拒绝该出示
    pub async fn check(
        &self,
        tenant: &TenantId,
        challenge: Option<&str>,
    ) -> ChallengeResult<ChallengeCheck> {
        let challenge = challenge
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ChallengeError::malformed("presentation options carry no challenge"))?;

        let outcome = self.service.verify(tenant, challenge).await?;
        if outcome.verified {
            return Ok(ChallengeCheck {
                challenge_uses: outcome.uses,
            });
        }

        debug!(
            "Presentation rejected by challenge check: tenant={}, error={:?}",
            tenant, outcome.error
        );
        Err(match outcome.error {
            Some(ErrorKind::MalformedToken) => ChallengeError::malformed("undecodable challenge"),
            Some(ErrorKind::DuplicateChallenge) => ChallengeError::DuplicateChallenge,
            Some(ErrorKind::BackendUnavailable) => {
                ChallengeError::unavailable("challenge backend reported failure")
            }
            Some(ErrorKind::InvalidOrExpired) | None => ChallengeError::InvalidOrExpired,
        })
    }
}
