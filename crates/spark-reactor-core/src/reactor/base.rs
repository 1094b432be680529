use std::{
    fmt,
    hash::Hash,
    io,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

use mio::{Events, event::Event};
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::{
    clock,
    config::{ReactorConfig, validate_buffer_size},
    error::{self, TransportError, map_io_error, panic_message},
    filter::FilterChain,
    handler::Handler,
    reactor::{
        idle::{IdleScheduler, sweep_idle},
        lifecycle::{Lifecycle, LifecycleState},
        receive_buffer::ReceiveBuffer,
        selector::{Selector, WAKE_TOKEN},
        table::SessionTable,
    },
    session::{IdleStatus, Session, SessionBuilder, SessionKind},
};

const EVENT_CAPACITY: usize = 1024;

/// acceptor/connector 共享的 reactor 骨架。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 六种 reactor（TCP/UDP × 接收端/单目标连接器/多目标连接器）共享同一套生命周期、配置校验、
///   过滤器链、接收缓冲、空闲检测与选择循环；差异只在“如何把就绪事件翻译为会话事件”。
///
/// ## 逻辑 (How)
/// - `init` → `activate` → `run_loop` → `shutdown` 构成完整生命周期；
/// - `run_loop` 独占 `Poll`，逐个处理就绪事件，任何事件处理中的错误或 panic 都以占位会话送入
///   `exception_caught`，循环本身不会因此退出；
/// - 配置 setter 在激活态返回 `IllegalState`，选择器超时与默认空闲阈值除外。
///
/// ## 契约 (What)
/// - `activate` 失败的三种情形：已激活、未初始化、未绑定处理器；
/// - `shutdown` 只在首次从激活态退出时返回 `true`，调用方据此决定是否执行资源回收。
pub struct ReactorCore {
    name: &'static str,
    kind: SessionKind,
    lifecycle: Lifecycle,
    config: RwLock<ReactorConfig>,
    chain: Arc<FilterChain>,
    handler: RwLock<Option<Arc<dyn Handler>>>,
    receive_buffer: ReceiveBuffer,
    idle: Mutex<Option<IdleScheduler>>,
}

impl fmt::Debug for ReactorCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactorCore")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("config", &*self.config.read())
            .finish_non_exhaustive()
    }
}

impl ReactorCore {
    pub fn new(
        name: &'static str,
        kind: SessionKind,
        config: ReactorConfig,
    ) -> Result<Self, TransportError> {
        config.validate()?;
        Ok(Self {
            name,
            kind,
            lifecycle: Lifecycle::new(name),
            receive_buffer: ReceiveBuffer::new(config.receive_buffer_size),
            config: RwLock::new(config),
            chain: Arc::new(FilterChain::new()),
            handler: RwLock::new(None),
            idle: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    pub fn config(&self) -> ReactorConfig {
        self.config.read().clone()
    }

    pub fn filter_chain(&self) -> &Arc<FilterChain> {
        &self.chain
    }

    pub fn receive_buffer(&self) -> &ReceiveBuffer {
        &self.receive_buffer
    }

    /// 设置处理器；在下一次启动时绑定到过滤器链终端。
    pub fn set_handler(&self, handler: Arc<dyn Handler>) {
        *self.handler.write() = Some(handler);
    }

    pub fn handler(&self) -> Option<Arc<dyn Handler>> {
        self.handler.read().clone()
    }

    /// 选择器等待超时，`Duration::ZERO` 表示无限期阻塞；运行期间修改在下一轮等待生效。
    pub fn set_select_timeout(&self, timeout: Duration) {
        self.config.write().select_timeout_ms =
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    }

    pub fn set_send_buffer_size(&self, size: usize) -> Result<(), TransportError> {
        validate_buffer_size("send_buffer_size", size)?;
        self.update_inactive(|config| config.send_buffer_size = size)
    }

    pub fn set_receive_buffer_size(&self, size: usize) -> Result<(), TransportError> {
        validate_buffer_size("receive_buffer_size", size)?;
        self.update_inactive(|config| config.receive_buffer_size = size)?;
        self.receive_buffer.resize(size)
    }

    pub fn set_reuse_address(&self, reuse: bool) -> Result<(), TransportError> {
        self.update_inactive(|config| config.reuse_address = reuse)
    }

    pub fn set_idle_check_period(&self, period: Duration) -> Result<(), TransportError> {
        let millis = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return Err(TransportError::invalid_argument("idle check period must be at least 1ms"));
        }
        self.update_inactive(|config| config.idle_check_period_ms = millis)
    }

    /// 新建会话时默认采用的空闲阈值。
    pub fn set_default_idle_time(&self, status: IdleStatus, idle: Duration) {
        let millis = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX);
        let mut config = self.config.write();
        match status {
            IdleStatus::ReadIdle => config.read_idle_ms = millis,
            IdleStatus::WriteIdle => config.write_idle_ms = millis,
        }
    }

    /// 初始化：重新分配接收缓冲并执行传输层的资源重建。
    pub fn init<F>(&self, rebuild: F) -> Result<(), TransportError>
    where
        F: FnOnce() -> Result<(), TransportError>,
    {
        self.lifecycle.begin_init(|| {
            let capacity = self.config.read().receive_buffer_size;
            self.receive_buffer.resize(capacity)?;
            rebuild()
        })
    }

    /// `Initialized → Active`，同时把处理器绑定到过滤器链终端。
    pub fn activate(&self) -> Result<(), TransportError> {
        self.lifecycle.activate(|| self.bind_handler())
    }

    /// 多目标连接器登记目标前的检查：已初始化（或已激活）且已绑定处理器。
    pub fn ensure_ready(&self) -> Result<(), TransportError> {
        self.lifecycle.ensure_ready()?;
        self.bind_handler()
    }

    /// 启动失败回退。
    pub fn abort_start(&self) {
        self.lifecycle.abort();
        self.stop_idle_sweep();
    }

    /// 退出激活态并取消空闲检测；仅首次调用返回 `true`。
    pub fn shutdown(&self) -> bool {
        if !self.lifecycle.deactivate() {
            return false;
        }
        self.stop_idle_sweep();
        true
    }

    /// 预先填好会话类型、过滤器链、发送缓冲与默认空闲阈值的构造器。
    pub fn session_builder(&self) -> SessionBuilder {
        let config = self.config.read();
        Session::builder(self.kind, self.chain.clone())
            .send_buffer_size(config.send_buffer_size)
            .idle_time(IdleStatus::ReadIdle, Duration::from_millis(config.read_idle_ms))
            .idle_time(IdleStatus::WriteIdle, Duration::from_millis(config.write_idle_ms))
    }

    /// 启动空闲检测线程，线程名为 `<reactor>-session-lifecycle`。
    pub fn start_idle_sweep<K, A>(
        &self,
        table: Arc<SessionTable<K, A>>,
    ) -> Result<(), TransportError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        A: Clone + Send + Sync + 'static,
    {
        let period = self.config.read().idle_check_period();
        let scheduler = IdleScheduler::spawn(
            format!("{}-session-lifecycle", self.name),
            period,
            move || {
                sweep_idle(&table, clock::now_millis());
            },
        )?;
        let previous = self.idle.lock().replace(scheduler);
        drop(previous);
        Ok(())
    }

    pub fn stop_idle_sweep(&self) {
        let scheduler = self.idle.lock().take();
        drop(scheduler);
    }

    /// 把不属于任何会话的故障送入 `exception_caught`，使用占位会话承载。
    pub fn report_fault(&self, fault: &TransportError) {
        warn!(reactor = self.name, code = fault.code(), error = %fault, "reactor fault");
        let placeholder = Session::detached(self.kind, self.chain.clone());
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
            self.chain.fire_exception_caught(&placeholder, fault);
        }));
        if let Err(payload) = delivered {
            warn!(
                reactor = self.name,
                panic = %panic_message(payload.as_ref()),
                "exception handler panicked while reporting reactor fault"
            );
        }
    }

    /// 阻塞式选择循环，在调用线程上运行直至 `shutdown`。
    ///
    /// - 每轮等待 `select_timeout`，唤醒器事件直接跳过；
    /// - `handle` 对单个事件返回的错误或 panic 被转为 reactor 故障上报，循环继续；
    /// - 退出时释放 `Poll`。
    pub fn run_loop<F>(&self, selector: &Selector, mut handle: F) -> Result<(), TransportError>
    where
        F: FnMut(&Event) -> Result<(), TransportError>,
    {
        let mut poll = selector.take_poll().ok_or_else(|| {
            TransportError::illegal_state(format!("{} selector is already being polled", self.name))
        })?;
        let mut events = Events::with_capacity(EVENT_CAPACITY);
        info!(reactor = self.name, "select loop started");
        while self.is_active() {
            let timeout = self.config.read().select_timeout();
            if let Err(err) = poll.poll(&mut events, timeout) {
                if err.kind() != io::ErrorKind::Interrupted && self.is_active() {
                    self.report_fault(&map_io_error(error::POLL, err));
                }
                continue;
            }
            for event in events.iter() {
                if event.token() == WAKE_TOKEN {
                    continue;
                }
                if !self.is_active() {
                    break;
                }
                let fault = match panic::catch_unwind(AssertUnwindSafe(|| handle(event))) {
                    Ok(Ok(())) => continue,
                    Ok(Err(err)) => err,
                    Err(payload) => TransportError::Panicked {
                        context: "reactor event",
                        message: panic_message(payload.as_ref()),
                    },
                };
                if self.is_active() {
                    self.report_fault(&fault);
                }
            }
        }
        drop(poll);
        info!(reactor = self.name, "select loop exited");
        Ok(())
    }

    fn update_inactive<F>(&self, apply: F) -> Result<(), TransportError>
    where
        F: FnOnce(&mut ReactorConfig),
    {
        let mut config = self.config.write();
        if self.lifecycle.is_active() {
            return Err(TransportError::illegal_state(format!(
                "{} is active, configure it before starting",
                self.name
            )));
        }
        apply(&mut config);
        Ok(())
    }

    fn bind_handler(&self) -> Result<(), TransportError> {
        match self.handler() {
            Some(handler) => {
                self.chain.set_handler(handler);
                Ok(())
            }
            None => Err(TransportError::illegal_state(format!(
                "no handler bound to {}, call set_handler() first",
                self.name
            ))),
        }
    }
}

/// 六种 reactor 共享的配置与绑定入口，默认实现全部转发给 [`ReactorCore`]。
///
/// 实现者只需给出 `core`；`init`/`start`/`stop` 等与传输相关的动作由各类型自行提供。
pub trait Reactor {
    fn core(&self) -> &ReactorCore;

    fn name(&self) -> &'static str {
        self.core().name()
    }

    fn state(&self) -> LifecycleState {
        self.core().state()
    }

    fn is_active(&self) -> bool {
        self.core().is_active()
    }

    fn config(&self) -> ReactorConfig {
        self.core().config()
    }

    fn filter_chain(&self) -> &Arc<FilterChain> {
        self.core().filter_chain()
    }

    fn set_handler(&self, handler: Arc<dyn Handler>) {
        self.core().set_handler(handler);
    }

    fn handler(&self) -> Option<Arc<dyn Handler>> {
        self.core().handler()
    }

    fn set_select_timeout(&self, timeout: Duration) {
        self.core().set_select_timeout(timeout);
    }

    fn set_send_buffer_size(&self, size: usize) -> Result<(), TransportError> {
        self.core().set_send_buffer_size(size)
    }

    fn set_receive_buffer_size(&self, size: usize) -> Result<(), TransportError> {
        self.core().set_receive_buffer_size(size)
    }

    fn set_reuse_address(&self, reuse: bool) -> Result<(), TransportError> {
        self.core().set_reuse_address(reuse)
    }

    fn set_idle_check_period(&self, period: Duration) -> Result<(), TransportError> {
        self.core().set_idle_check_period(period)
    }

    fn set_default_idle_time(&self, status: IdleStatus, idle: Duration) {
        self.core().set_default_idle_time(status, idle);
    }
}
