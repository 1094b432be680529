use std::{io, net::SocketAddr, sync::Arc};

use mio::{Token, event::Event};
use parking_lot::RwLock;
use spark_reactor_core::{
    ReactorConfig, ReactorCore, Selector, Session, SessionKind, SessionTable, TableEntry,
    TokenAllocator, TransportError, clock, map_io_error,
};
use tracing::{debug, trace};

use crate::{
    error,
    socket::{DatagramSocket, PeerChannel, PushRegistry},
    util::{bind_datagram, ephemeral_for},
};

/// 一个套接字及其写兴趣集合。
#[derive(Clone)]
pub(crate) struct Endpoint {
    pub(crate) socket: Arc<DatagramSocket>,
    pub(crate) pushes: Arc<PushRegistry>,
}

impl Endpoint {
    fn new(socket: Arc<DatagramSocket>) -> Self {
        let pushes = PushRegistry::new(socket.clone());
        Self { socket, pushes }
    }
}

/// 连接器会话表：键为套接字令牌，每个目标独占一个端点。
pub(crate) type ConnectedTable = SessionTable<Token, Endpoint>;

/// 三种 UDP reactor 共享的部分：选择器、令牌分配、端点创建、写冲刷与已连接套接字的读取。
pub(crate) struct DatagramReactor {
    core: ReactorCore,
    selector: RwLock<Option<Arc<Selector>>>,
    tokens: TokenAllocator,
}

impl DatagramReactor {
    pub(crate) fn new(name: &'static str, config: ReactorConfig) -> Result<Self, TransportError> {
        Ok(Self {
            core: ReactorCore::new(name, SessionKind::Datagram, config)?,
            selector: RwLock::new(None),
            tokens: TokenAllocator::default(),
        })
    }

    pub(crate) fn core(&self) -> &ReactorCore {
        &self.core
    }

    /// 先执行传输层清理（关闭旧会话与旧套接字），再打开新选择器。
    pub(crate) fn init<F>(&self, teardown: F) -> Result<(), TransportError>
    where
        F: FnOnce(),
    {
        self.core.init(|| {
            teardown();
            let selector = Arc::new(Selector::open()?);
            *self.selector.write() = Some(selector);
            Ok(())
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

    pub(crate) fn wake(&self) {
        if let Some(selector) = self.selector.read().clone()
            && let Err(err) = selector.wake()
        {
            debug!(reactor = self.core.name(), error = %err, "selector wake failed");
        }
    }

    /// 绑定本地地址并注册可读兴趣。
    pub(crate) fn bind(&self, addr: SocketAddr, reuse: bool) -> Result<Endpoint, TransportError> {
        let socket = bind_datagram(addr, reuse)?;
        let socket = DatagramSocket::register(socket, self.tokens.next(), self.selector()?, false)?;
        Ok(Endpoint::new(socket))
    }

    /// 绑定临时端口并连接到 `target`。
    fn connect_endpoint(&self, target: SocketAddr) -> Result<Endpoint, TransportError> {
        let socket = bind_datagram(ephemeral_for(target), false)?;
        socket
            .connect(target)
            .map_err(|err| map_io_error(error::CONNECT, err))?;
        let socket = DatagramSocket::register(socket, self.tokens.next(), self.selector()?, true)?;
        Ok(Endpoint::new(socket))
    }

    /// 为对端构造会话：通道写往 `remote`，写兴趣登记在端点上。
    pub(crate) fn session_for(
        &self,
        endpoint: &Endpoint,
        remote: SocketAddr,
        owns_socket: bool,
    ) -> Result<Arc<Session>, TransportError> {
        let channel = if owns_socket {
            PeerChannel::exclusive(endpoint.socket.clone())
        } else {
            PeerChannel::shared(endpoint.socket.clone())
        };
        self.core
            .session_builder()
            .channel(channel)
            .pushable(endpoint.pushes.clone())
            .local_addr(endpoint.socket.local_addr())
            .remote_addr(Some(remote))
            .build()
    }

    /// 触发 `session_created`、刷新活跃时间并打开会话。
    pub(crate) fn admit(session: &Arc<Session>) {
        session.chain().fire_session_created(session);
        if session.active().is_err() {
            return;
        }
        if let Err(err) = session.open() {
            debug!(session = %session, error = %err, "session not opened");
        }
    }

    /// 连接一个目标并登记到连接器会话表，会话立即打开。
    pub(crate) fn dial(
        &self,
        target: SocketAddr,
        table: &ConnectedTable,
    ) -> Result<Arc<Session>, TransportError> {
        let endpoint = self.connect_endpoint(target)?;
        let session = match self.session_for(&endpoint, target, true) {
            Ok(session) => session,
            Err(err) => {
                endpoint.socket.close();
                return Err(err);
            }
        };
        table.insert(endpoint.socket.token(), session.clone(), endpoint);
        debug!(reactor = self.core.name(), session = %session, "datagram target registered");
        Self::admit(&session);
        self.wake();
        Ok(session)
    }

    /// 冲刷端点上所有等待写出的会话，仍有积压时重新武装写兴趣。
    pub(crate) fn flush(&self, pushes: &PushRegistry) {
        for session in pushes.snapshot() {
            if !session.is_open() || session.active().is_err() {
                continue;
            }
            session.chain().fire_push_data(&session);
        }
        if let Err(err) = pushes.rearm() {
            self.core.report_fault(&err);
        }
    }

    /// 处理连接器端点上的事件；会话因读取失败结束时返回该会话。
    pub(crate) fn on_connected_event(
        &self,
        event: &Event,
        table: &ConnectedTable,
    ) -> Option<Arc<Session>> {
        let token = event.token();
        let Some(TableEntry {
            session,
            attachment: endpoint,
        }) = table.get(&token)
        else {
            trace!(
                reactor = self.core.name(),
                token = token.0,
                "event for unknown token"
            );
            return None;
        };
        if (event.is_readable() || event.is_error())
            && let Err(err) = self.receive_connected(&session, &endpoint.socket)
        {
            session.chain().fire_exception_caught(&session, &err);
            session.close();
            table.remove_if_same(&token, &session);
            return Some(session);
        }
        if event.is_writable() {
            self.flush(&endpoint.pushes);
        }
        None
    }

    fn receive_connected(
        &self,
        session: &Arc<Session>,
        socket: &DatagramSocket,
    ) -> Result<(), TransportError> {
        loop {
            if !session.is_open() {
                return Ok(());
            }
            let read = self
                .core
                .receive_buffer()
                .read_with(|buf| socket.recv(buf).map(|len| (len, ())));
            match read {
                Ok((data, ())) => {
                    trace!(
                        session = session.id(),
                        len = data.len(),
                        "datagram received"
                    );
                    session.set_latest_read_time(clock::now_millis());
                    if session.active().is_err() {
                        return Ok(());
                    }
                    session.chain().fire_data_received(session, data);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(map_io_error(error::RECEIVE, err)),
            }
        }
    }
}
