//! 集成测试共享的探针：记录事件的处理器、可编排写出行为的通道与写兴趣探针。
#![allow(dead_code)]

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use bytes::Bytes;
use parking_lot::Mutex;
use spark_reactor_core::{
    FilterChain, Handler, IdleStatus, Pushable, Session, SessionChannel, SessionKind,
    TransportError,
};

/// 处理器观察到的事件。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Seen {
    Created,
    Opened,
    Idle(IdleStatus),
    Closed,
    Exception(&'static str),
    Received(Bytes),
    NotSent(Bytes),
    Sent(Bytes),
}

/// 把所有事件按到达顺序记录下来的处理器。
#[derive(Default)]
pub struct RecordingHandler {
    seen: Mutex<Vec<Seen>>,
}

impl RecordingHandler {
    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().clone()
    }

    pub fn count(&self, expected: &Seen) -> usize {
        self.seen.lock().iter().filter(|seen| *seen == expected).count()
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.seen
            .lock()
            .iter()
            .filter_map(|seen| match seen {
                Seen::Sent(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, seen: Seen) {
        self.seen.lock().push(seen);
    }
}

impl Handler for RecordingHandler {
    fn session_created(&self, _session: &Arc<Session>) -> Result<(), TransportError> {
        self.push(Seen::Created);
        Ok(())
    }

    fn session_opened(&self, _session: &Arc<Session>) -> Result<(), TransportError> {
        self.push(Seen::Opened);
        Ok(())
    }

    fn session_idle(
        &self,
        _session: &Arc<Session>,
        status: IdleStatus,
    ) -> Result<(), TransportError> {
        self.push(Seen::Idle(status));
        Ok(())
    }

    fn session_closed(&self, _session: &Arc<Session>) -> Result<(), TransportError> {
        self.push(Seen::Closed);
        Ok(())
    }

    fn exception_caught(&self, _session: &Arc<Session>, cause: &TransportError) {
        self.push(Seen::Exception(cause.code()));
    }

    fn data_received(&self, _session: &Arc<Session>, data: Bytes) -> Result<(), TransportError> {
        self.push(Seen::Received(data));
        Ok(())
    }

    fn data_not_sent(&self, _session: &Arc<Session>, data: Bytes) -> Result<(), TransportError> {
        self.push(Seen::NotSent(data));
        Ok(())
    }

    fn data_sent(&self, _session: &Arc<Session>, data: Bytes) -> Result<(), TransportError> {
        self.push(Seen::Sent(data));
        Ok(())
    }
}

/// 可编排写出行为的内存通道。
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    wire: Mutex<Vec<u8>>,
    write_sizes: Mutex<Vec<usize>>,
    max_per_write: AtomicUsize,
    blocked: AtomicBool,
    failure: Mutex<Option<io::ErrorKind>>,
    closed: AtomicBool,
}

impl ScriptedChannel {
    /// 每次写出至多 `max` 字节；0 表示不限制。
    pub fn with_limit(max: usize) -> Arc<Self> {
        let channel = Self::default();
        channel.max_per_write.store(max, Ordering::SeqCst);
        Arc::new(channel)
    }

    pub fn wire(&self) -> Vec<u8> {
        self.wire.lock().clone()
    }

    pub fn write_sizes(&self) -> Vec<usize> {
        self.write_sizes.lock().clone()
    }

    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    pub fn fail_with(&self, kind: io::ErrorKind) {
        *self.failure.lock() = Some(kind);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SessionChannel for ScriptedChannel {
    fn write(&self, buf: &[u8], _remote: Option<SocketAddr>) -> io::Result<usize> {
        if let Some(kind) = *self.failure.lock() {
            return Err(io::Error::from(kind));
        }
        if self.blocked.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        let limit = match self.max_per_write.load(Ordering::SeqCst) {
            0 => buf.len(),
            max => max.min(buf.len()),
        };
        self.wire.lock().extend_from_slice(&buf[..limit]);
        self.write_sizes.lock().push(limit);
        Ok(limit)
    }

    fn close(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// 记录写兴趣状态的探针。
#[derive(Default)]
pub struct InterestRecorder {
    registered: AtomicBool,
    adds: AtomicUsize,
    reject_adds: AtomicBool,
}

impl InterestRecorder {
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn reject_adds(&self) {
        self.reject_adds.store(true, Ordering::SeqCst);
    }
}

impl Pushable for InterestRecorder {
    fn add(&self, _session: &Arc<Session>) -> Result<(), TransportError> {
        if self.reject_adds.load(Ordering::SeqCst) {
            return Err(TransportError::illegal_state("selector closed"));
        }
        self.adds.fetch_add(1, Ordering::SeqCst);
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, _session: &Arc<Session>) -> Result<(), TransportError> {
        self.registered.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// 组装一条绑定记录处理器的链与一个已打开的会话。
pub struct Fixture {
    pub chain: Arc<FilterChain>,
    pub handler: Arc<RecordingHandler>,
    pub channel: Arc<ScriptedChannel>,
    pub interest: Arc<InterestRecorder>,
    pub session: Arc<Session>,
}

impl Fixture {
    pub fn new(max_per_write: usize, send_buffer_size: usize) -> Self {
        let fixture = Self::created(max_per_write, send_buffer_size);
        fixture.session.open().expect("打开会话");
        fixture
    }

    /// 会话保持 `Created` 状态。
    pub fn created(max_per_write: usize, send_buffer_size: usize) -> Self {
        let chain = Arc::new(FilterChain::new());
        let handler = Arc::new(RecordingHandler::default());
        chain.set_handler(handler.clone());
        let channel = ScriptedChannel::with_limit(max_per_write);
        let interest = Arc::new(InterestRecorder::default());
        let session = Session::builder(SessionKind::Stream, chain.clone())
            .channel(channel.clone())
            .pushable(interest.clone())
            .send_buffer_size(send_buffer_size)
            .build()
            .expect("构造会话");
        Self {
            chain,
            handler,
            channel,
            interest,
            session,
        }
    }

    /// 反复冲刷直到队列排空，返回冲刷次数。
    pub fn drain(&self) -> usize {
        let mut rounds = 0;
        while self.session.has_pending() {
            self.session.push_data().expect("会话保持打开");
            rounds += 1;
            assert!(rounds < 10_000, "冲刷未能收敛");
        }
        rounds
    }
}
