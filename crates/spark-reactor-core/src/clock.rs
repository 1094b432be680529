//! 进程级单调时钟。
//!
//! 会话时间戳统一以“自首次调用起的毫秒数”表示，避免墙钟回拨导致空闲判定抖动。

use std::{sync::OnceLock, time::Instant};

static ORIGIN: OnceLock<Instant> = OnceLock::new();

/// 返回单调毫秒时间戳。
pub fn now_millis() -> u64 {
    let elapsed = ORIGIN.get_or_init(Instant::now).elapsed().as_millis();
    u64::try_from(elapsed).unwrap_or(u64::MAX)
}
