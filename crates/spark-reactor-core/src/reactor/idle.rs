use std::{
    hash::Hash,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{
    error::{self, TransportError, map_io_error, panic_message},
    reactor::table::SessionTable,
    session::{IdleStatus, Session},
};

/// 对会话表执行一轮空闲检测，返回本轮触发的空闲事件数。
///
/// # 教案式说明
/// - **意图 (Why)**：把检测逻辑与调度线程分离，测试可以用受控的 `now` 直接驱动；
/// - **逻辑 (How)**：
///   1. 对会话表取快照；已关闭会话直接删除条目；
///   2. 打开的会话先检查写空闲，再检查读空闲：阈值非零且 `now - latest >= 阈值` 时触发
///      `session_idle`，并把对应时间戳重置为 `now`；
/// - **契约 (What)**：单个会话检测中的 panic 被捕获并记录，不影响其它会话与调度线程；
/// - **风险 (Trade-offs)**：触发后重置时间戳意味着在没有真实流量时空闲事件按检测周期节流，
///   而不是每轮都触发。
pub fn sweep_idle<K, A>(table: &SessionTable<K, A>, now: u64) -> usize
where
    K: Eq + Hash + Clone,
    A: Clone,
{
    let mut fired = 0;
    for (key, entry) in table.snapshot() {
        let session = entry.session;
        if session.is_closed() {
            table.remove_if_same(&key, &session);
            continue;
        }
        if !session.is_open() {
            continue;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| check_session(&session, now))) {
            Ok(count) => fired += count,
            Err(payload) => warn!(
                session = %session,
                panic = %panic_message(payload.as_ref()),
                "idle check panicked"
            ),
        }
    }
    fired
}

fn check_session(session: &Arc<Session>, now: u64) -> usize {
    let mut fired = 0;
    if is_expired(
        session.idle_time(IdleStatus::WriteIdle),
        session.latest_write_time(),
        now,
    ) {
        session.chain().fire_session_idle(session, IdleStatus::WriteIdle);
        session.set_latest_write_time(now);
        fired += 1;
    }
    if is_expired(
        session.idle_time(IdleStatus::ReadIdle),
        session.latest_read_time(),
        now,
    ) {
        session.chain().fire_session_idle(session, IdleStatus::ReadIdle);
        session.set_latest_read_time(now);
        fired += 1;
    }
    fired
}

fn is_expired(threshold: Duration, latest: u64, now: u64) -> bool {
    let threshold = threshold.as_millis();
    threshold > 0 && u128::from(now.saturating_sub(latest)) >= threshold
}

struct Signal {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

/// 固定周期的后台任务线程。
///
/// # 教案式说明
/// - **意图 (Why)**：空闲检测不能依赖选择器就绪事件，需要独立于 reactor 线程按周期运行；
/// - **契约 (What)**：
///   - 首次执行发生在启动后一个周期，此后按固定节拍执行，落后时从当前时刻重新对齐；
///   - `cancel` 通过条件变量立即唤醒线程并等待其退出；在任务线程内部调用时不等待自身；
///   - 任务中的 panic 被捕获并记录，线程继续运行。
pub struct IdleScheduler {
    name: String,
    signal: Arc<Signal>,
    handle: Option<JoinHandle<()>>,
}

impl IdleScheduler {
    pub fn spawn<F>(
        name: impl Into<String>,
        period: Duration,
        mut task: F,
    ) -> Result<Self, TransportError>
    where
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        let signal = Arc::new(Signal {
            cancelled: Mutex::new(false),
            wakeup: Condvar::new(),
        });
        let worker = signal.clone();
        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let mut cancelled = worker.cancelled.lock();
                let mut deadline = Instant::now() + period;
                while !*cancelled {
                    if !worker.wakeup.wait_until(&mut cancelled, deadline).timed_out() {
                        continue;
                    }
                    if *cancelled {
                        break;
                    }
                    MutexGuard::unlocked(&mut cancelled, || {
                        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task())) {
                            warn!(
                                scheduler = %thread_name,
                                panic = %panic_message(payload.as_ref()),
                                "scheduled task panicked"
                            );
                        }
                    });
                    deadline += period;
                    let now = Instant::now();
                    if deadline <= now {
                        deadline = now + period;
                    }
                }
                debug!(scheduler = %thread_name, "scheduler exited");
            })
            .map_err(|err| map_io_error(error::SPAWN, err))?;
        Ok(Self {
            name,
            signal,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 取消调度并等待线程退出。
    pub fn cancel(&mut self) {
        *self.signal.cancelled.lock() = true;
        self.signal.wakeup.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!(scheduler = %self.name, "scheduler thread terminated abnormally");
            }
        }
    }
}

impl Drop for IdleScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
