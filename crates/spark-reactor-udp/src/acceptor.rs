use std::{io, net::SocketAddr, sync::Arc};

use mio::event::Event;
use parking_lot::RwLock;
use spark_reactor_core::{
    Reactor, ReactorConfig, ReactorCore, Selector, Session, SessionTable, TransportError, clock,
    map_io_error, net,
};
use tracing::{debug, info, trace};

use crate::{
    error,
    reactor::{DatagramReactor, Endpoint},
};

struct Inner {
    reactor: DatagramReactor,
    endpoint: RwLock<Option<Endpoint>>,
    sessions: Arc<SessionTable<SocketAddr>>,
}

/// UDP 接收端：绑定一个本地套接字，按来源地址把数据报解复用为会话。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 数据报没有连接的概念，接收端以“对端地址 ↔ 会话”的映射模拟连接，
///   让上层沿用与 TCP 一致的会话事件模型；
///
/// ## 逻辑 (How)
/// - 读就绪时循环 `recv_from` 直到 `WouldBlock`；首次见到某个对端地址时创建会话，
///   依次触发 `session_created`、刷新活跃时间并打开，然后把负载交给 `data_received`；
/// - 同一地址下的会话若已关闭但尚未被空闲检测清理，新数据报会以新会话替换它；
/// - 写就绪时冲刷所有等待写出的会话，全部会话共享同一个套接字。
///
/// ## 契约 (What)
/// - 关闭单个会话不影响套接字与其它会话；`stop` 关闭全部会话后释放套接字。
#[derive(Clone)]
pub struct DatagramAcceptor {
    inner: Arc<Inner>,
}

impl Reactor for DatagramAcceptor {
    fn core(&self) -> &ReactorCore {
        self.inner.reactor.core()
    }
}

impl DatagramAcceptor {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, TransportError> {
        Self::with_config(ReactorConfig::new(host, port))
    }

    pub fn with_config(config: ReactorConfig) -> Result<Self, TransportError> {
        Ok(Self {
            inner: Arc::new(Inner {
                reactor: DatagramReactor::new("datagram-acceptor", config)?,
                endpoint: RwLock::new(None),
                sessions: Arc::new(SessionTable::new()),
            }),
        })
    }

    pub fn init(&self) -> Result<(), TransportError> {
        self.inner.reactor.init(|| {
            self.teardown();
        })
    }

    pub fn start(&self) -> Result<(), TransportError> {
        self.start_with_notify(|_| {})
    }

    /// 与 [`start`](Self::start) 相同，套接字绑定后以实际地址调用 `notify`。
    pub fn start_with_notify<F>(&self, notify: F) -> Result<(), TransportError>
    where
        F: FnOnce(SocketAddr),
    {
        let core = self.inner.reactor.core();
        core.activate()?;
        let (local, selector) = match self.bind() {
            Ok(bound) => bound,
            Err(err) => {
                core.abort_start();
                self.teardown();
                return Err(err);
            }
        };
        if let Err(err) = core.start_idle_sweep(self.inner.sessions.clone()) {
            core.abort_start();
            self.teardown();
            return Err(err);
        }
        info!(reactor = core.name(), %local, "datagram acceptor bound");
        notify(local);
        let outcome = core.run_loop(&selector, |event| self.on_event(event));
        self.teardown();
        outcome
    }

    /// 停止接收端；未激活时为空操作。
    pub fn stop(&self) {
        let core = self.inner.reactor.core();
        if !core.shutdown() {
            return;
        }
        self.inner.reactor.wake();
        let closed = self.teardown();
        info!(reactor = core.name(), closed, "datagram acceptor stopped");
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .endpoint
            .read()
            .as_ref()
            .and_then(|endpoint| endpoint.socket.local_addr())
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.inner.sessions.sessions()
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// 按对端地址查找会话。
    pub fn session(&self, peer: &SocketAddr) -> Option<Arc<Session>> {
        self.inner.sessions.session(peer)
    }

    fn bind(&self) -> Result<(SocketAddr, Arc<Selector>), TransportError> {
        let reactor = &self.inner.reactor;
        let selector = reactor.selector()?;
        let config = reactor.core().config();
        let addr = net::resolve(&config.host, config.port)?;
        let endpoint = reactor.bind(addr, config.reuse_address)?;
        let local = endpoint.socket.local_addr().unwrap_or(addr);
        *self.inner.endpoint.write() = Some(endpoint);
        Ok((local, selector))
    }

    /// 释放套接字并关闭全部会话，返回被关闭的会话数。
    fn teardown(&self) -> usize {
        let endpoint = self.inner.endpoint.write().take();
        if let Some(endpoint) = endpoint {
            endpoint.socket.close();
        }
        self.inner.sessions.close_all()
    }

    fn on_event(&self, event: &Event) -> Result<(), TransportError> {
        let Some(endpoint) = self.inner.endpoint.read().clone() else {
            return Ok(());
        };
        if event.token() != endpoint.socket.token() {
            trace!(token = event.token().0, "event for unknown token");
            return Ok(());
        }
        if event.is_readable() || event.is_error() {
            self.receive_all(&endpoint)?;
        }
        if event.is_writable() {
            self.inner.reactor.flush(&endpoint.pushes);
        }
        Ok(())
    }

    fn receive_all(&self, endpoint: &Endpoint) -> Result<(), TransportError> {
        let core = self.inner.reactor.core();
        loop {
            let read = core
                .receive_buffer()
                .read_with(|buf| endpoint.socket.recv_from(buf));
            match read {
                Ok((data, peer)) => {
                    trace!(%peer, len = data.len(), "datagram received");
                    let session = self.session_for_peer(endpoint, peer)?;
                    session.set_latest_read_time(clock::now_millis());
                    if session.active().is_ok() {
                        session.chain().fire_data_received(&session, data);
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(map_io_error(error::RECEIVE, err)),
            }
        }
    }

    fn session_for_peer(
        &self,
        endpoint: &Endpoint,
        peer: SocketAddr,
    ) -> Result<Arc<Session>, TransportError> {
        if let Some(session) = self.inner.sessions.session(&peer)
            && !session.is_closed()
        {
            return Ok(session);
        }
        let session = self.inner.reactor.session_for(endpoint, peer, false)?;
        self.inner.sessions.insert(peer, session.clone(), ());
        debug!(session = %session, "datagram session created");
        DatagramReactor::admit(&session);
        Ok(session)
    }
}
