//! 无状态 challenge 签名
//!
//! Token 为 `encode(random[16] || mac[32])`，其中
//! `mac = HMAC(tenant_key, random || be32(expires_bucket) || tenant_id)`。
//!
//! `expires_bucket` 不随 token 传输：验证方根据当前时间重新计算。时间轴以整点为锚，
//! 按 `delta` 秒划分为桶，签发时取下一个桶边界。验证时同时尝试当前桶边界与前一个
//! 桶边界，所以一个 token 的实际有效期介于 `delta` 与 `2 * delta` 之间，取决于签发
//! 时刻在桶内的位置。调用方不应假设固定的 TTL。

use crate::clock::{Clock, SystemClock};
use crate::codec::ChallengeCodec;
use crate::digest::KeyedDigestProvider;
use crate::error::{ChallengeError, ChallengeResult};
use crate::random::{CHALLENGE_RANDOM_LEN, OsRandom, RandomSource};
use crate::types::{TenantId, VerifyOutcome};
use std::sync::Arc;
use subtle::{Choice, ConstantTimeEq};
use tracing::debug;

const SECONDS_PER_HOUR: i64 = 3600;

/// 计算 `now` 之后的下一个桶边界
///
/// 以 `now` 所在整点为锚，边界严格大于 `now`
pub fn next_bucket_boundary(now_secs: i64, delta_secs: u32) -> i64 {
    let delta = i64::from(delta_secs);
    let seconds_past_hour = now_secs.rem_euclid(SECONDS_PER_HOUR);
    let hour_start = now_secs - seconds_past_hour;
    hour_start + (seconds_past_hour / delta + 1) * delta
}

/// 校验桶宽度：必须大于 0 且能整除 3600
pub fn validate_delta(delta_secs: u32) -> ChallengeResult<()> {
    if delta_secs == 0 || SECONDS_PER_HOUR % i64::from(delta_secs) != 0 {
        return Err(ChallengeError::Config(format!(
            "Invalid bucket width {delta_secs}s: must be positive and divide 3600"
        )));
    }
    Ok(())
}

/// 无状态 challenge 签名器
#[derive(Clone)]
pub struct StatelessChallengeSigner {
    delta_secs: u32,
    digest: Arc<dyn KeyedDigestProvider>,
    random: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for StatelessChallengeSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatelessChallengeSigner")
            .field("delta_secs", &self.delta_secs)
            .field("mac_len", &self.digest.mac_len())
            .finish()
    }
}

impl StatelessChallengeSigner {
    /// 创建签名器（系统时钟、OS 随机数）
    pub fn new(delta_secs: u32, digest: Arc<dyn KeyedDigestProvider>) -> ChallengeResult<Self> {
        Self::with_parts(
            delta_secs,
            digest,
            Arc::new(OsRandom),
            Arc::new(SystemClock),
        )
    }

    /// 指定随机数来源与时钟
    pub fn with_parts(
        delta_secs: u32,
        digest: Arc<dyn KeyedDigestProvider>,
        random: Arc<dyn RandomSource>,
        clock: Arc<dyn Clock>,
    ) -> ChallengeResult<Self> {
        validate_delta(delta_secs)?;
        Ok(Self {
            delta_secs,
            digest,
            random,
            clock,
        })
    }

    pub fn delta_secs(&self) -> u32 {
        self.delta_secs
    }

    /// 解码后的 token 长度
    pub fn token_len(&self) -> usize {
        CHALLENGE_RANDOM_LEN + self.digest.mac_len()
    }

    /// 签发 challenge
    pub async fn issue(&self, tenant: &TenantId) -> ChallengeResult<String> {
        let expires = next_bucket_boundary(self.clock.now_secs(), self.delta_secs);
        let random = self.random.challenge_bytes();
        let mac = self.mac_for(tenant, &random, expires).await?;

        let mut payload = Vec::with_capacity(self.token_len());
        payload.extend_from_slice(&random);
        payload.extend_from_slice(&mac);

        debug!(
            "Issued stateless challenge: tenant={}, expires_bucket={}",
            tenant, expires
        );
        ChallengeCodec::encode(&payload)
    }

    /// 验证 challenge
    ///
    /// 格式错误或 MAC 不匹配返回 `verified = false`；摘要服务不可用时返回错误
    pub async fn verify(&self, tenant: &TenantId, token: &str) -> ChallengeResult<VerifyOutcome> {
        VerifyOutcome::recover(self.check(tenant, token).await.map(|()| VerifyOutcome::verified(None)))
    }

    async fn check(&self, tenant: &TenantId, token: &str) -> ChallengeResult<()> {
        let payload = ChallengeCodec::decode(token, self.token_len()).inspect_err(|e| {
            debug!("Rejected stateless challenge for tenant {}: {}", tenant, e);
        })?;
        let (random, provided_mac) = payload.split_at(CHALLENGE_RANDOM_LEN);

        let expires_current = next_bucket_boundary(self.clock.now_secs(), self.delta_secs);
        let expires_previous = expires_current - i64::from(self.delta_secs);

        // 两个 MAC 都计算、都比较，不提前返回
        let mac_current = self.mac_for(tenant, random, expires_current).await?;
        let mac_previous = self.mac_for(tenant, random, expires_previous).await?;

        let matched: Choice =
            provided_mac.ct_eq(mac_current.as_slice()) | provided_mac.ct_eq(mac_previous.as_slice());

        if bool::from(matched) {
            Ok(())
        } else {
            debug!("Stateless challenge MAC mismatch for tenant {}", tenant);
            Err(ChallengeError::InvalidOrExpired)
        }
    }

    async fn mac_for(
        &self,
        tenant: &TenantId,
        random: &[u8],
        expires_bucket: i64,
    ) -> ChallengeResult<Vec<u8>> {
        let bucket = u32::try_from(expires_bucket).map_err(|_| {
            ChallengeError::unavailable(format!(
                "expires bucket {expires_bucket} does not fit in 32 bits"
            ))
        })?;

        let mut input =
            Vec::with_capacity(random.len() + std::mem::size_of::<u32>() + tenant.as_bytes().len());
        input.extend_from_slice(random);
        input.extend_from_slice(&bucket.to_be_bytes());
        input.extend_from_slice(tenant.as_bytes());

        let mac = self.digest.sign(tenant, &input).await?;
        if mac.len() != self.digest.mac_len() {
            return Err(ChallengeError::unavailable(format!(
                "digest provider returned {} bytes, expected {}",
                mac.len(),
                self.digest.mac_len()
            )));
        }
        Ok(mac)
    }
}
