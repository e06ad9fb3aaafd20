//! 时钟抽象
//!
//! 过期时间与时间桶都基于此取当前时间，测试中可替换为手动时钟

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// 当前时间来源
pub trait Clock: Send + Sync {
    /// Unix 毫秒时间戳
    fn now_millis(&self) -> i64;

    /// Unix 秒时间戳
    fn now_secs(&self) -> i64 {
        self.now_millis().div_euclid(1000)
    }
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// 手动推进的时钟，clone 之间共享同一时间
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn at_millis(millis: i64) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(millis)),
        }
    }

    pub fn at(time: DateTime<Utc>) -> Self {
        Self::at_millis(time.timestamp_millis())
    }

    pub fn set(&self, time: DateTime<Utc>) {
        self.set_millis(time.timestamp_millis());
    }

    pub fn set_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn set_secs(&self, secs: i64) {
        self.set_millis(secs * 1000);
    }

    pub fn advance_millis(&self, delta: i64) {
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::at(Utc.with_ymd_and_hms(2024, 5, 1, 17, 4, 0).unwrap());
        let other = clock.clone();
        clock.advance_millis(1_500);

        assert_eq!(other.now_millis(), clock.now_millis());
        assert_eq!(
            other.now_secs(),
            Utc.with_ymd_and_hms(2024, 5, 1, 17, 4, 1).unwrap().timestamp()
        );
    }

    #[test]
    fn test_now_secs_floors_negative_millis() {
        let clock = ManualClock::at_millis(-1);
        assert_eq!(clock.now_secs(), -1);
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2020-01-01 之后
        assert!(SystemClock.now_secs() > 1_577_836_800);
    }
}
