//! 随机数来源
//!
//! Challenge 的 128 位随机值均来自此模块

use rand::RngCore;
use rand::rngs::OsRng;

/// Challenge 随机值长度（128 位）
pub const CHALLENGE_RANDOM_LEN: usize = 16;

/// 密码学安全随机数来源
pub trait RandomSource: Send + Sync {
    /// 生成一个 challenge 随机值
    fn challenge_bytes(&self) -> [u8; CHALLENGE_RANDOM_LEN];
}

/// 操作系统 CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn challenge_bytes(&self) -> [u8; CHALLENGE_RANDOM_LEN] {
        let mut bytes = [0u8; CHALLENGE_RANDOM_LEN];
        OsRng.fill_bytes(&mut bytes);
        bytes
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use fixed::FixedRandom;

#[cfg(any(test, feature = "test-util"))]
mod fixed {
    use super::{CHALLENGE_RANDOM_LEN, RandomSource};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 按顺序循环返回预设值的随机来源
    ///
    /// 仅用于测试：强制两次签发得到相同的随机值，以触发唯一性冲突
    #[derive(Debug, Clone)]
    pub struct FixedRandom {
        values: Arc<Vec<[u8; CHALLENGE_RANDOM_LEN]>>,
        cursor: Arc<AtomicUsize>,
    }

    impl FixedRandom {
        /// 每次都返回同一个值
        pub fn repeating(value: [u8; CHALLENGE_RANDOM_LEN]) -> Self {
            Self::sequence(vec![value])
        }

        /// 按顺序返回，到末尾后从头开始
        ///
        /// # Panics
        /// `values` 为空时 panic
        pub fn sequence(values: Vec<[u8; CHALLENGE_RANDOM_LEN]>) -> Self {
            assert!(!values.is_empty(), "FixedRandom requires at least one value");
            Self {
                values: Arc::new(values),
                cursor: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl RandomSource for FixedRandom {
        fn challenge_bytes(&self) -> [u8; CHALLENGE_RANDOM_LEN] {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed);
            self.values[index % self.values.len()]
        }
    }
}
