use std::{io, net::SocketAddr, sync::Arc};

use mio::{Token, event::Event, net::TcpStream};
use parking_lot::RwLock;
use spark_reactor_core::{
    Pushable, ReactorConfig, ReactorCore, Selector, Session, SessionKind, SessionTable,
    TableEntry, TokenAllocator, TransportError, clock, map_io_error,
};
use tracing::{debug, trace};

use crate::{channel::StreamChannel, error};

pub(crate) type StreamTable = SessionTable<Token, Arc<StreamChannel>>;

/// 一次读就绪处理的结果。
enum ReadEnd {
    /// 读到 `WouldBlock`，或会话已被回调关闭。
    Drained,
    /// 对端关闭。
    Eof,
    Failed(TransportError),
}

/// 三种 TCP reactor 共享的部分：选择器、令牌、会话表以及“就绪事件 → 会话事件”的翻译。
///
/// # 教案式说明
/// - **意图 (Why)**：接收端与两种连接器只在“会话从哪里来、流结束后做什么”上不同；
/// - **契约 (What)**：
///   - [`StreamReactor::on_session_event`] 在流结束（EOF、读失败、建连失败）时关闭会话、移出会话表，
///     并把该会话返回给调用方，由调用方决定是否连带关闭整个 reactor；
///   - 读就绪时循环读取直到 `WouldBlock`，与 `mio` 的边沿触发语义匹配；
///   - 写就绪时冲刷一次，若仍有积压则重新武装写兴趣。
pub(crate) struct StreamReactor {
    core: ReactorCore,
    selector: RwLock<Option<Arc<Selector>>>,
    tokens: TokenAllocator,
    sessions: Arc<StreamTable>,
}

impl StreamReactor {
    pub(crate) fn new(name: &'static str, config: ReactorConfig) -> Result<Self, TransportError> {
        Ok(Self {
            core: ReactorCore::new(name, SessionKind::Stream, config)?,
            selector: RwLock::new(None),
            tokens: TokenAllocator::default(),
            sessions: Arc::new(SessionTable::new()),
        })
    }

    pub(crate) fn core(&self) -> &ReactorCore {
        &self.core
    }

    pub(crate) fn sessions(&self) -> &Arc<StreamTable> {
        &self.sessions
    }

    /// 关闭旧会话、释放旧选择器并打开新选择器。
    pub(crate) fn init<F>(&self, rebuild: F) -> Result<(), TransportError>
    where
        F: FnOnce() -> Result<(), TransportError>,
    {
        self.core.init(|| {
            self.sessions.close_all();
            let selector = Arc::new(Selector::open()?);
            *self.selector.write() = Some(selector);
            rebuild()
        })
    }

    pub(crate) fn selector(&self) -> Result<Arc<Selector>, TransportError> {
        self.selector.read().clone().ok_or_else(|| {
            TransportError::illegal_state(format!(
                "{} has no selector, call init() first",
                self.core.name()
            ))
        })
    }

    pub(crate) fn next_token(&self) -> Token {
        self.tokens.next()
    }

    pub(crate) fn wake(&self) {
        if let Some(selector) = self.selector.read().clone()
            && let Err(err) = selector.wake()
        {
            debug!(reactor = self.core.name(), error = %err, "selector wake failed");
        }
    }

    /// 关闭全部会话并清空会话表，返回被关闭的会话数。
    pub(crate) fn close_sessions(&self) -> usize {
        self.sessions.close_all()
    }

    /// 接纳一条已建立的流：注册可读兴趣、登记会话、触发 `session_created` 并打开会话。
    pub(crate) fn admit(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<Arc<Session>, TransportError> {
        let token = self.next_token();
        let channel = StreamChannel::established(stream, token, self.selector()?)?;
        let session = self
            .core
            .session_builder()
            .channel(channel.clone())
            .pushable(channel.clone())
            .local_addr(channel.local_addr())
            .remote_addr(Some(peer))
            .build()?;
        self.sessions.insert(token, session.clone(), channel);
        debug!(reactor = self.core.name(), session = %session, "connection accepted");
        session.chain().fire_session_created(&session);
        Self::open_session(&session);
        Ok(session)
    }

    /// 发起非阻塞建连并登记会话；会话在建连完成后才打开。
    pub(crate) fn connect(&self, target: SocketAddr) -> Result<Arc<Session>, TransportError> {
        let stream = TcpStream::connect(target).map_err(|err| map_io_error(error::CONNECT, err))?;
        let token = self.next_token();
        let channel = StreamChannel::connecting(stream, token, self.selector()?)?;
        let session = self
            .core
            .session_builder()
            .channel(channel.clone())
            .pushable(channel.clone())
            .remote_addr(Some(target))
            .build()?;
        self.sessions.insert(token, session.clone(), channel);
        debug!(reactor = self.core.name(), %target, "connection initiated");
        session.chain().fire_session_created(&session);
        self.wake();
        Ok(session)
    }

    /// 把一个通道事件翻译为会话事件；流结束时返回已关闭的会话。
    pub(crate) fn on_session_event(&self, event: &Event) -> Option<Arc<Session>> {
        let token = event.token();
        let Some(TableEntry {
            session,
            attachment: channel,
        }) = self.sessions.get(&token)
        else {
            trace!(
                reactor = self.core.name(),
                token = token.0,
                "event for unknown token"
            );
            return None;
        };
        if channel.is_connecting() {
            return self.complete_connect(&session, &channel, event);
        }
        if event.is_readable() || event.is_read_closed() || event.is_error() {
            match self.drain_readable(&session, &channel) {
                ReadEnd::Drained => {}
                ReadEnd::Eof => {
                    debug!(reactor = self.core.name(), session = %session, "peer closed stream");
                    return Some(self.finish(&session, token, None));
                }
                ReadEnd::Failed(err) => return Some(self.finish(&session, token, Some(err))),
            }
        }
        if event.is_writable() && session.is_open() {
            Self::flush(&session, &channel);
        }
        None
    }

    fn complete_connect(
        &self,
        session: &Arc<Session>,
        channel: &Arc<StreamChannel>,
        event: &Event,
    ) -> Option<Arc<Session>> {
        if !(event.is_writable() || event.is_error() || event.is_write_closed()) {
            return None;
        }
        match channel.finish_connect() {
            Ok(None) => None,
            Ok(Some((local, peer))) => {
                session.set_local_addr(Some(local));
                session.set_remote_addr(Some(peer));
                debug!(reactor = self.core.name(), session = %session, "connection established");
                Self::open_session(session);
                None
            }
            Err(err) => Some(self.finish(
                session,
                channel.token(),
                Some(map_io_error(error::CONNECT, err)),
            )),
        }
    }

    fn drain_readable(&self, session: &Arc<Session>, channel: &StreamChannel) -> ReadEnd {
        loop {
            if !session.is_open() {
                return ReadEnd::Drained;
            }
            let read = self
                .core
                .receive_buffer()
                .read_with(|buf| channel.read(buf).map(|len| (len, ())));
            match read {
                Ok((data, ())) if data.is_empty() => return ReadEnd::Eof,
                Ok((data, ())) => {
                    trace!(session = session.id(), len = data.len(), "stream data read");
                    session.set_latest_read_time(clock::now_millis());
                    if session.active().is_err() {
                        return ReadEnd::Drained;
                    }
                    session.chain().fire_data_received(session, data);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return ReadEnd::Drained,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return ReadEnd::Failed(map_io_error(error::READ, err)),
            }
        }
    }

    fn flush(session: &Arc<Session>, channel: &StreamChannel) {
        if session.active().is_err() {
            return;
        }
        session.chain().fire_push_data(session);
        if session.is_open()
            && session.has_pending()
            && let Err(err) = channel.add(session)
        {
            session.chain().fire_exception_caught(session, &err);
        }
    }

    fn finish(
        &self,
        session: &Arc<Session>,
        token: Token,
        cause: Option<TransportError>,
    ) -> Arc<Session> {
        if let Some(cause) = cause {
            session.chain().fire_exception_caught(session, &cause);
        }
        session.close();
        self.sessions.remove_if_same(&token, session);
        session.clone()
    }

    fn open_session(session: &Arc<Session>) {
        if session.active().is_err() {
            return;
        }
        if let Err(err) = session.open() {
            debug!(session = %session, error = %err, "session not opened");
        }
    }
}
