//! # session 模块说明
//!
//! ## 角色定位（Why）
//! - `Session` 是一条逻辑连接（TCP 流或 UDP 对端）的句柄，承载身份、时间戳、属性表与出站队列；
//! - 出站数据先经过滤器链的 `send_data` 事件，再由终端阶段入队，最后在可写事件中按
//!   `send_buffer_size` 分片冲刷。
//!
//! ## 状态机（What）
//! - `Created → Open → Closed`，`open` 只能从 `Created` 发起，`close` 幂等；
//! - 出站队列由独立的发送锁保护；队列由空变非空时申请写兴趣，排空后撤销。
//!
//! ## 并发约束（How）
//! - 任何事件都在释放发送锁之后触发，处理器因此可以在回调中再次 `send`；
//! - 时间戳使用原子量，`latest_*` 只前进不后退。

mod channel;
mod packet;

use std::{
    any::Any,
    collections::VecDeque,
    fmt, io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::{
    clock,
    config::{DEFAULT_BUFFER_SIZE, validate_buffer_size},
    error::{self, TransportError, map_io_error},
    filter::FilterChain,
};

pub(crate) use channel::DetachedChannel;
pub use channel::{Pushable, SessionChannel};
pub use packet::Packet;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// 会话承载的传输形态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionKind {
    Stream,
    Datagram,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stream => "stream",
            Self::Datagram => "datagram",
        })
    }
}

/// 会话生命周期状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Created,
    Open,
    Closed,
}

/// 空闲类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdleStatus {
    /// 超过阈值未收到入站数据。
    ReadIdle,
    /// 超过阈值未写出出站数据。
    WriteIdle,
}

impl fmt::Display for IdleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadIdle => "READ_IDLE",
            Self::WriteIdle => "WRITE_IDLE",
        })
    }
}

type AttributeValue = Arc<dyn Any + Send + Sync>;

/// 连接句柄。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 把“连接身份 + 生命周期 + 出站缓冲”封装为一个可跨线程共享的对象，reactor 线程、
///   空闲检测线程与应用线程都通过 `Arc<Session>` 访问；
/// - 读写方法只依赖 [`SessionChannel`] 与 [`Pushable`] 两个接缝，TCP/UDP 共享同一套冲刷协议。
///
/// ## 逻辑 (How)
/// - `send` 校验状态后触发过滤器链 `send_data`，终端阶段回到 [`Session::send_data`] 入队；
/// - reactor 在可写事件中经过滤器链 `push_data` 回到 [`Session::push_data`]，每次至多写出
///   `send_buffer_size` 字节，按实际写出量推进游标；
/// - `close` 首次调用时清空队列、撤销写兴趣、释放通道并触发一次 `session_closed`。
///
/// ## 契约 (What)
/// - 需要触发事件的方法接收 `self: &Arc<Self>`，事件回调拿到的就是同一个共享句柄；
/// - 属性写入仅在 `Open` 状态合法；`active` 在 `Closed` 状态返回 `IllegalState`；
/// - 出站数据严格按入队顺序写出，部分写不会让后续数据插队。
///
/// ## 注意事项 (Trade-offs)
/// - UDP 会话写出时使用会话记录的对端地址，共享套接字上的会话关闭不会关闭套接字本身。
pub struct Session {
    id: u64,
    kind: SessionKind,
    state: Mutex<SessionState>,
    local_addr: RwLock<Option<SocketAddr>>,
    remote_addr: RwLock<Option<SocketAddr>>,
    create_time: u64,
    active_time: AtomicU64,
    latest_read_time: AtomicU64,
    latest_write_time: AtomicU64,
    read_idle_ms: AtomicU64,
    write_idle_ms: AtomicU64,
    send_buffer_size: AtomicUsize,
    attributes: DashMap<String, AttributeValue>,
    send_queue: Mutex<VecDeque<Packet>>,
    channel: Arc<dyn SessionChannel>,
    pushable: Arc<dyn Pushable>,
    chain: Arc<FilterChain>,
}

/// [`Session`] 构造器。
///
/// 未指定通道或写兴趣控制器时使用占位实现，此时会话只能承载事件通知，无法写出数据。
#[must_use]
pub struct SessionBuilder {
    kind: SessionKind,
    chain: Arc<FilterChain>,
    channel: Option<Arc<dyn SessionChannel>>,
    pushable: Option<Arc<dyn Pushable>>,
    local_addr: Option<SocketAddr>,
    remote_addr: Option<SocketAddr>,
    send_buffer_size: usize,
    read_idle: Duration,
    write_idle: Duration,
}

impl SessionBuilder {
    pub fn channel(mut self, channel: Arc<dyn SessionChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn pushable(mut self, pushable: Arc<dyn Pushable>) -> Self {
        self.pushable = Some(pushable);
        self
    }

    pub fn local_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.local_addr = addr;
        self
    }

    pub fn remote_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.remote_addr = addr;
        self
    }

    pub fn send_buffer_size(mut self, size: usize) -> Self {
        self.send_buffer_size = size;
        self
    }

    pub fn idle_time(mut self, status: IdleStatus, idle: Duration) -> Self {
        match status {
            IdleStatus::ReadIdle => self.read_idle = idle,
            IdleStatus::WriteIdle => self.write_idle = idle,
        }
        self
    }

    /// 校验参数并创建会话；`send_buffer_size` 为 0 时返回 `InvalidArgument`。
    pub fn build(self) -> Result<Arc<Session>, TransportError> {
        validate_buffer_size("send_buffer_size", self.send_buffer_size)?;
        Ok(self.assemble())
    }

    fn assemble(self) -> Arc<Session> {
        let now = clock::now_millis();
        let detached = Arc::new(DetachedChannel);
        let channel: Arc<dyn SessionChannel> = match self.channel {
            Some(channel) => channel,
            None => detached.clone(),
        };
        let pushable: Arc<dyn Pushable> = match self.pushable {
            Some(pushable) => pushable,
            None => detached,
        };
        Arc::new(Session {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            kind: self.kind,
            state: Mutex::new(SessionState::Created),
            local_addr: RwLock::new(self.local_addr),
            remote_addr: RwLock::new(self.remote_addr),
            create_time: now,
            active_time: AtomicU64::new(now),
            latest_read_time: AtomicU64::new(now),
            latest_write_time: AtomicU64::new(now),
            read_idle_ms: AtomicU64::new(duration_millis(self.read_idle)),
            write_idle_ms: AtomicU64::new(duration_millis(self.write_idle)),
            send_buffer_size: AtomicUsize::new(self.send_buffer_size),
            attributes: DashMap::new(),
            send_queue: Mutex::new(VecDeque::new()),
            channel,
            pushable,
            chain: self.chain,
        })
    }
}

/// 单次冲刷尝试的结果。
enum Flush {
    Pending,
    Sent(Bytes),
    Failed(Bytes, TransportError),
}

/// 队首数据包在一次写尝试后的去向。
enum HeadStep {
    Keep,
    Dequeue,
    Fail(TransportError),
}

impl Session {
    pub fn builder(kind: SessionKind, chain: Arc<FilterChain>) -> SessionBuilder {
        SessionBuilder {
            kind,
            chain,
            channel: None,
            pushable: None,
            local_addr: None,
            remote_addr: None,
            send_buffer_size: DEFAULT_BUFFER_SIZE,
            read_idle: Duration::ZERO,
            write_idle: Duration::ZERO,
        }
    }

    /// 构造没有底层通道的占位会话，用于把 reactor 级故障送入 `exception_caught`。
    pub fn detached(kind: SessionKind, chain: Arc<FilterChain>) -> Arc<Self> {
        Self::builder(kind, chain).assemble()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// 会话绑定的过滤器链。
    pub fn chain(&self) -> &Arc<FilterChain> {
        &self.chain
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        *self.remote_addr.read()
    }

    /// 由 reactor 在异步连接完成或首个数据报到达后回填本端地址。
    pub fn set_local_addr(&self, addr: Option<SocketAddr>) {
        *self.local_addr.write() = addr;
    }

    /// 由 reactor 在异步连接完成后回填对端地址。
    pub fn set_remote_addr(&self, addr: Option<SocketAddr>) {
        *self.remote_addr.write() = addr;
    }

    pub fn create_time(&self) -> u64 {
        self.create_time
    }

    pub fn active_time(&self) -> u64 {
        self.active_time.load(Ordering::Acquire)
    }

    pub fn latest_read_time(&self) -> u64 {
        self.latest_read_time.load(Ordering::Acquire)
    }

    pub fn latest_write_time(&self) -> u64 {
        self.latest_write_time.load(Ordering::Acquire)
    }

    /// 推进最近读取时间；早于当前值的时间戳被忽略。
    pub fn set_latest_read_time(&self, millis: u64) {
        self.latest_read_time.fetch_max(millis, Ordering::AcqRel);
    }

    /// 推进最近写出时间；早于当前值的时间戳被忽略。
    pub fn set_latest_write_time(&self, millis: u64) {
        self.latest_write_time.fetch_max(millis, Ordering::AcqRel);
    }

    /// 指定类型的空闲阈值，`Duration::ZERO` 表示禁用。
    pub fn idle_time(&self, status: IdleStatus) -> Duration {
        let millis = match status {
            IdleStatus::ReadIdle => self.read_idle_ms.load(Ordering::Acquire),
            IdleStatus::WriteIdle => self.write_idle_ms.load(Ordering::Acquire),
        };
        Duration::from_millis(millis)
    }

    pub fn set_idle_time(&self, status: IdleStatus, idle: Duration) {
        let millis = duration_millis(idle);
        match status {
            IdleStatus::ReadIdle => self.read_idle_ms.store(millis, Ordering::Release),
            IdleStatus::WriteIdle => self.write_idle_ms.store(millis, Ordering::Release),
        }
    }

    pub fn send_buffer_size(&self) -> usize {
        self.send_buffer_size.load(Ordering::Acquire)
    }

    pub fn set_send_buffer_size(&self, size: usize) -> Result<(), TransportError> {
        validate_buffer_size("send_buffer_size", size)?;
        self.send_buffer_size.store(size, Ordering::Release);
        Ok(())
    }

    /// 读取属性并尝试向下转型为 `T`；键不存在或类型不符时返回 `None`。
    pub fn attribute<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let value = self.attributes.get(name)?.value().clone();
        value.downcast::<T>().ok()
    }

    pub fn contains_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// 写入属性；会话未打开或已关闭时返回 `IllegalState`。
    pub fn set_attribute<T>(&self, name: impl Into<String>, value: T) -> Result<(), TransportError>
    where
        T: Any + Send + Sync,
    {
        self.ensure_open("set attribute")?;
        self.attributes.insert(name.into(), Arc::new(value));
        Ok(())
    }

    /// 删除属性；会话未打开或已关闭时返回 `IllegalState`。
    pub fn remove_attribute(&self, name: &str) -> Result<(), TransportError> {
        self.ensure_open("remove attribute")?;
        self.attributes.remove(name);
        Ok(())
    }

    /// 刷新活跃时间；会话已关闭时返回 `IllegalState`。
    pub fn active(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::illegal_state("session has been closed"));
        }
        self.active_time.fetch_max(clock::now_millis(), Ordering::AcqRel);
        Ok(())
    }

    /// 出站队列中尚未写完的数据包个数。
    pub fn pending_packets(&self) -> usize {
        self.send_queue.lock().len()
    }

    pub fn has_pending(&self) -> bool {
        !self.send_queue.lock().is_empty()
    }

    /// 打开会话并触发 `session_opened`。
    ///
    /// - **契约 (What)**：只允许从 `Created` 发起；重复打开或重新打开已关闭会话返回 `IllegalState`，
    ///   且不会再次触发事件。
    pub fn open(self: &Arc<Self>) -> Result<(), TransportError> {
        {
            let mut state = self.state.lock();
            match *state {
                SessionState::Created => *state = SessionState::Open,
                SessionState::Open => {
                    return Err(TransportError::illegal_state("session has already been opened"));
                }
                SessionState::Closed => {
                    return Err(TransportError::illegal_state(
                        "session has been closed and cannot be reopened",
                    ));
                }
            }
        }
        self.chain.fire_session_opened(self);
        Ok(())
    }

    /// 关闭会话，幂等。
    ///
    /// - 首次调用：状态置为 `Closed`，清空出站队列并撤销写兴趣，释放通道后触发一次 `session_closed`；
    /// - 通道释放失败会转入 `exception_caught`，不会向调用方返回错误。
    pub fn close(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }
        let discarded = {
            let mut queue = self.send_queue.lock();
            let discarded = queue.len();
            queue.clear();
            if let Err(err) = self.pushable.remove(self) {
                debug!(session = self.id, error = %err, "write interest not withdrawn on close");
            }
            discarded
        };
        debug!(session = %self, discarded, "session closed");
        if let Err(err) = self.channel.close() {
            self.chain
                .fire_exception_caught(self, &map_io_error(error::CLOSE, err));
        }
        self.chain.fire_session_closed(self);
    }

    /// 发送数据：校验会话已打开后触发出站 `send_data` 事件。
    pub fn send(self: &Arc<Self>, data: impl Into<Bytes>) -> Result<(), TransportError> {
        self.ensure_open("send")?;
        self.chain.fire_send_data(self, data.into());
        Ok(())
    }

    /// 终端阶段：把负载包装为 [`Packet`] 追加到出站队列，并在队列由空变非空时申请写兴趣。
    ///
    /// 申请失败时数据包被撤回，随后依次触发 `data_not_sent` 与 `exception_caught`。
    pub fn send_data(self: &Arc<Self>, data: Bytes) {
        if !self.is_open() {
            self.chain.fire_data_not_sent(self, data);
            self.chain.fire_exception_caught(
                self,
                &TransportError::illegal_state("session is not open"),
            );
            return;
        }
        let rejected = {
            let mut queue = self.send_queue.lock();
            let was_idle = queue.is_empty();
            queue.push_back(Packet::new(data));
            if was_idle {
                match self.pushable.add(self) {
                    Ok(()) => None,
                    Err(err) => queue.pop_back().map(|packet| (packet.into_data(), err)),
                }
            } else {
                None
            }
        };
        if let Some((data, err)) = rejected {
            self.chain.fire_data_not_sent(self, data);
            self.chain.fire_exception_caught(self, &err);
        }
    }

    /// 终端阶段：对队首数据包做一次有界写出。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：支持部分写并保持顺序，同时在队列排空时撤销写兴趣，防止空转；
    /// - **逻辑 (How)**：
    ///   1. 发送锁内查看（不移除）队首，写出至多 `send_buffer_size` 字节；
    ///   2. 写出失败或零字节写出：出队，随后触发 `data_not_sent`、`exception_caught` 并关闭会话；
    ///   3. 部分写或 `WouldBlock`：游标按实际写出量前移，数据包留在队首；
    ///   4. 完整写出：出队并触发 `data_sent`；
    ///   5. 队列为空时在锁内撤销写兴趣；
    /// - **契约 (What)**：会话未打开时返回 `IllegalState`；所有事件在释放发送锁后触发。
    pub fn push_data(self: &Arc<Self>) -> Result<(), TransportError> {
        self.ensure_open("push data")?;
        let (flush, interest_fault) = {
            let mut queue = self.send_queue.lock();
            let step = match queue.front_mut() {
                None => HeadStep::Keep,
                Some(packet) if packet.is_drained() => HeadStep::Dequeue,
                Some(packet) => self.write_head(packet),
            };
            let flush = match step {
                HeadStep::Keep => Flush::Pending,
                HeadStep::Dequeue => match queue.pop_front() {
                    Some(packet) => Flush::Sent(packet.into_data()),
                    None => Flush::Pending,
                },
                HeadStep::Fail(err) => match queue.pop_front() {
                    Some(packet) => Flush::Failed(packet.into_data(), err),
                    None => Flush::Pending,
                },
            };
            let interest_fault = if queue.is_empty() {
                self.pushable.remove(self).err()
            } else {
                None
            };
            (flush, interest_fault)
        };
        match flush {
            Flush::Pending => {}
            Flush::Sent(data) => self.chain.fire_data_sent(self, data),
            Flush::Failed(data, err) => {
                self.chain.fire_data_not_sent(self, data);
                self.chain.fire_exception_caught(self, &err);
                self.close();
            }
        }
        if let Some(err) = interest_fault {
            self.chain.fire_exception_caught(self, &err);
        }
        Ok(())
    }

    fn write_head(&self, packet: &mut Packet) -> HeadStep {
        let limit = packet.remaining().len().min(self.send_buffer_size());
        let now = clock::now_millis();
        self.active_time.fetch_max(now, Ordering::AcqRel);
        self.set_latest_write_time(now);
        match self
            .channel
            .write(&packet.remaining()[..limit], self.remote_addr())
        {
            Ok(0) => HeadStep::Fail(TransportError::network("channel accepted zero bytes")),
            Ok(written) => {
                trace!(session = self.id, written, "session data written");
                packet.advance(written);
                if packet.is_drained() {
                    HeadStep::Dequeue
                } else {
                    HeadStep::Keep
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                HeadStep::Keep
            }
            Err(err) => HeadStep::Fail(map_io_error(error::WRITE, err)),
        }
    }

    fn ensure_open(&self, action: &'static str) -> Result<(), TransportError> {
        match self.state() {
            SessionState::Open => Ok(()),
            SessionState::Created => Err(TransportError::illegal_state(format!(
                "cannot {action}: session is not open"
            ))),
            SessionState::Closed => Err(TransportError::illegal_state(format!(
                "cannot {action}: session has been closed"
            ))),
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = |addr: Option<SocketAddr>| match addr {
            Some(addr) => addr.to_string(),
            None => "-".to_owned(),
        };
        write!(
            f,
            "Session#{} [{}, local={}, remote={}, state={:?}, create={}, active={}, read={}, write={}, readIdle={}ms, writeIdle={}ms]",
            self.id,
            self.kind,
            addr(self.local_addr()),
            addr(self.remote_addr()),
            self.state(),
            self.create_time,
            self.active_time(),
            self.latest_read_time(),
            self.latest_write_time(),
            self.read_idle_ms.load(Ordering::Acquire),
            self.write_idle_ms.load(Ordering::Acquire),
        )
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .field("remote_addr", &self.remote_addr())
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
