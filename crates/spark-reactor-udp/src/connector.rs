use std::sync::Arc;

use mio::event::Event;
use parking_lot::RwLock;
use spark_reactor_core::{
    Reactor, ReactorConfig, ReactorCore, Selector, Session, SessionTable, TransportError, net,
};
use tracing::info;

use crate::reactor::{ConnectedTable, DatagramReactor};

struct Inner {
    reactor: DatagramReactor,
    sessions: Arc<ConnectedTable>,
    session: RwLock<Option<Arc<Session>>>,
}

/// 单目标 UDP 连接器：绑定临时端口并连接配置中的 `host:port`，会话在 `open` 时立即打开。
///
/// - **契约 (What)**：读取失败（例如对端端口不可达）或会话在 reactor 线程上被关闭时，
///   连接器随之关闭，选择循环退出。
#[derive(Clone)]
pub struct DatagramConnector {
    inner: Arc<Inner>,
}

impl Reactor for DatagramConnector {
    fn core(&self) -> &ReactorCore {
        self.inner.reactor.core()
    }
}

impl DatagramConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, TransportError> {
        Self::with_config(ReactorConfig::new(host, port))
    }

    pub fn with_config(config: ReactorConfig) -> Result<Self, TransportError> {
        Ok(Self {
            inner: Arc::new(Inner {
                reactor: DatagramReactor::new("datagram-connector", config)?,
                sessions: Arc::new(SessionTable::new()),
                session: RwLock::new(None),
            }),
        })
    }

    pub fn init(&self) -> Result<(), TransportError> {
        self.inner.reactor.init(|| {
            self.inner.sessions.close_all();
            *self.inner.session.write() = None;
        })
    }

    pub fn open(&self) -> Result<(), TransportError> {
        self.open_with_notify(|_| {})
    }

    /// 与 [`open`](Self::open) 相同，会话打开后以该会话调用 `notify`。
    pub fn open_with_notify<F>(&self, notify: F) -> Result<(), TransportError>
    where
        F: FnOnce(Arc<Session>),
    {
        let core = self.inner.reactor.core();
        core.activate()?;
        let (session, selector) = match self.dial() {
            Ok(dialed) => dialed,
            Err(err) => {
                core.abort_start();
                self.inner.sessions.close_all();
                return Err(err);
            }
        };
        if let Err(err) = core.start_idle_sweep(self.inner.sessions.clone()) {
            core.abort_start();
            self.inner.sessions.close_all();
            return Err(err);
        }
        info!(reactor = core.name(), session = %session, "datagram connector opened");
        notify(session);
        let outcome = core.run_loop(&selector, |event| {
            self.on_event(event);
            Ok(())
        });
        self.inner.sessions.close_all();
        outcome
    }

    /// 关闭连接器与其会话；未激活时为空操作。
    pub fn close(&self) {
        let core = self.inner.reactor.core();
        if !core.shutdown() {
            return;
        }
        self.inner.reactor.wake();
        self.inner.sessions.close_all();
        info!(reactor = core.name(), "datagram connector closed");
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.inner.session.read().clone()
    }

    fn dial(&self) -> Result<(Arc<Session>, Arc<Selector>), TransportError> {
        let reactor = &self.inner.reactor;
        let selector = reactor.selector()?;
        let config = reactor.core().config();
        let target = net::resolve(&config.host, config.port)?;
        let session = reactor.dial(target, &self.inner.sessions)?;
        *self.inner.session.write() = Some(session.clone());
        Ok((session, selector))
    }

    fn on_event(&self, event: &Event) {
        let ended = self
            .inner
            .reactor
            .on_connected_event(event, &self.inner.sessions)
            .is_some();
        if ended || self.session().is_some_and(|session| session.is_closed()) {
            self.close();
        }
    }
}
