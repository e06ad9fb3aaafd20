//! Challenge 编解码
//!
//! 线上格式：`"z" || base58btc(0x00 || len || payload)`
//!
//! - `z`：multibase 前缀，表示 base58btc
//! - `0x00`：multihash 的 identity 编码
//! - `len`：payload 长度（单字节 varint，payload 不超过 127 字节）
//!
//! 前缀与长度自描述，格式不符的输入在任何密码学运算之前被拒绝。

use crate::error::{ChallengeError, ChallengeResult};
use base58::{FromBase58, ToBase58};

/// multibase base58btc 前缀
const MULTIBASE_BASE58BTC: char = 'z';

/// multihash identity 编码
const MULTIHASH_IDENTITY: u8 = 0x00;

/// 单字节 varint 能表示的最大长度
const MAX_PAYLOAD_LEN: usize = 0x7f;

/// Challenge 编解码器
#[derive(Debug, Clone, Copy, Default)]
pub struct ChallengeCodec;

impl ChallengeCodec {
    /// 编码为线上字符串
    ///
    /// # Errors
    /// payload 为空或超过 127 字节时返回 `MalformedToken`
    pub fn encode(payload: &[u8]) -> ChallengeResult<String> {
        if payload.is_empty() || payload.len() > MAX_PAYLOAD_LEN {
            return Err(ChallengeError::malformed(format!(
                "payload length {} out of range",
                payload.len()
            )));
        }

        let mut framed = Vec::with_capacity(payload.len() + 2);
        framed.push(MULTIHASH_IDENTITY);
        framed.push(payload.len() as u8);
        framed.extend_from_slice(payload);

        Ok(format!("{MULTIBASE_BASE58BTC}{}", framed.to_base58()))
    }

    /// 解码线上字符串，并要求 payload 长度恰好为 `expected_len`
    pub fn decode(token: &str, expected_len: usize) -> ChallengeResult<Vec<u8>> {
        let encoded = token
            .strip_prefix(MULTIBASE_BASE58BTC)
            .ok_or_else(|| ChallengeError::malformed("unsupported multibase prefix"))?;

        let framed = encoded
            .from_base58()
            .map_err(|e| ChallengeError::malformed(format!("invalid base58btc: {e:?}")))?;

        let [code, declared_len, payload @ ..] = framed.as_slice() else {
            return Err(ChallengeError::malformed("missing multihash header"));
        };

        if *code != MULTIHASH_IDENTITY {
            return Err(ChallengeError::malformed(format!(
                "unsupported multihash code 0x{code:02x}"
            )));
        }

        if usize::from(*declared_len) != payload.len() {
            return Err(ChallengeError::malformed(format!(
                "declared length {declared_len} does not match payload length {}",
                payload.len()
            )));
        }

        if payload.len() != expected_len {
            return Err(ChallengeError::malformed(format!(
                "expected {expected_len} bytes, got {}",
                payload.len()
            )));
        }

        Ok(payload.to_vec())
    }
}
