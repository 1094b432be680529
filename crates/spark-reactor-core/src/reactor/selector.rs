use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use mio::{Poll, Registry, Token, Waker};
use parking_lot::Mutex;

use crate::error::{self, TransportError, map_io_error};

/// 唤醒器占用的令牌。
pub const WAKE_TOKEN: Token = Token(0);

/// 通道令牌的起始值，`0` 保留给唤醒器。
pub const FIRST_CHANNEL_TOKEN: usize = 1;

/// `mio::Poll` 的共享封装。
///
/// # 教案式说明
/// - **意图 (Why)**：`Poll::poll` 需要 `&mut`，只能由 reactor 线程独占；而兴趣集合的修改来自任意线程。
///   因此把 `Poll` 放在 `Option` 中由选择循环取走，其余线程通过克隆出的 `Registry` 注册并用 `Waker` 唤醒；
/// - **契约 (What)**：
///   - 同一时刻至多一个选择循环持有 `Poll`；循环退出时 `Poll` 随之释放，即“关闭选择器”；
///   - 非 reactor 线程修改兴趣集合后必须调用 [`Selector::wake`]，否则改动要等到下一次超时才生效。
pub struct Selector {
    poll: Mutex<Option<Poll>>,
    registry: Registry,
    waker: Waker,
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("polling", &self.poll.lock().is_none())
            .finish_non_exhaustive()
    }
}

impl Selector {
    pub fn open() -> Result<Self, TransportError> {
        let poll = Poll::new().map_err(|err| map_io_error(error::SELECTOR_OPEN, err))?;
        let registry = poll
            .registry()
            .try_clone()
            .map_err(|err| map_io_error(error::SELECTOR_OPEN, err))?;
        let waker = Waker::new(poll.registry(), WAKE_TOKEN)
            .map_err(|err| map_io_error(error::SELECTOR_OPEN, err))?;
        Ok(Self {
            poll: Mutex::new(Some(poll)),
            registry,
            waker,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// 唤醒阻塞中的选择循环。
    pub fn wake(&self) -> Result<(), TransportError> {
        self.waker.wake().map_err(|err| map_io_error(error::WAKE, err))
    }

    /// 取走 `Poll`；已被其它循环取走时返回 `None`。
    pub(crate) fn take_poll(&self) -> Option<Poll> {
        self.poll.lock().take()
    }
}

/// 单调递增的通道令牌分配器。
#[derive(Debug)]
pub struct TokenAllocator {
    next: AtomicUsize,
}

impl Default for TokenAllocator {
    fn default() -> Self {
        Self {
            next: AtomicUsize::new(FIRST_CHANNEL_TOKEN),
        }
    }
}

impl TokenAllocator {
    pub fn next(&self) -> Token {
        Token(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
