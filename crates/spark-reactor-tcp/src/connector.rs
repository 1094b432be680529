use std::sync::Arc;

use mio::event::Event;
use parking_lot::RwLock;
use spark_reactor_core::{
    Reactor, ReactorConfig, ReactorCore, Selector, Session, TransportError, net,
};
use tracing::info;

use crate::stream::StreamReactor;

struct Inner {
    reactor: StreamReactor,
    session: RwLock<Option<Arc<Session>>>,
}

/// 单目标 TCP 连接器：连接配置中的 `host:port`，持有唯一的会话。
///
/// # 教案式说明
/// - **逻辑 (How)**：`open` 激活生命周期后发起非阻塞建连，注册可写兴趣并立即触发 `session_created`；
///   建连完成时切换为可读兴趣并打开会话；
/// - **契约 (What)**：对端关闭、读失败、建连失败或会话在 reactor 线程上被关闭，都会连带关闭整个连接器，
///   选择循环随之退出；
/// - **风险 (Trade-offs)**：`open` 阻塞调用线程直到连接器关闭，需要并发发送时请在其它线程持有会话。
#[derive(Clone)]
pub struct SocketConnector {
    inner: Arc<Inner>,
}

impl Reactor for SocketConnector {
    fn core(&self) -> &ReactorCore {
        self.inner.reactor.core()
    }
}

impl SocketConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, TransportError> {
        Self::with_config(ReactorConfig::new(host, port))
    }

    pub fn with_config(config: ReactorConfig) -> Result<Self, TransportError> {
        Ok(Self {
            inner: Arc::new(Inner {
                reactor: StreamReactor::new("socket-connector", config)?,
                session: RwLock::new(None),
            }),
        })
    }

    pub fn init(&self) -> Result<(), TransportError> {
        self.inner.reactor.init(|| {
            *self.inner.session.write() = None;
            Ok(())
        })
    }

    /// 建连并在当前线程运行选择循环，直到连接器关闭。
    pub fn open(&self) -> Result<(), TransportError> {
        self.open_with_notify(|_| {})
    }

    /// 与 [`open`](Self::open) 相同，会话登记后（建连完成前）以该会话调用 `notify`。
    pub fn open_with_notify<F>(&self, notify: F) -> Result<(), TransportError>
    where
        F: FnOnce(Arc<Session>),
    {
        let reactor = &self.inner.reactor;
        reactor.core().activate()?;
        let (session, selector) = match self.dial() {
            Ok(dialed) => dialed,
            Err(err) => {
                reactor.core().abort_start();
                reactor.close_sessions();
                return Err(err);
            }
        };
        if let Err(err) = reactor.core().start_idle_sweep(reactor.sessions().clone()) {
            reactor.core().abort_start();
            reactor.close_sessions();
            return Err(err);
        }
        info!(reactor = reactor.core().name(), session = %session, "connector opened");
        notify(session);
        let outcome = reactor.core().run_loop(&selector, |event| {
            self.on_event(event);
            Ok(())
        });
        reactor.close_sessions();
        outcome
    }

    /// 关闭连接器与其会话；未激活时为空操作。
    pub fn close(&self) {
        let reactor = &self.inner.reactor;
        if !reactor.core().shutdown() {
            return;
        }
        reactor.wake();
        reactor.close_sessions();
        info!(reactor = reactor.core().name(), "connector closed");
    }

    /// 当前（或最近一次）连接的会话。
    pub fn session(&self) -> Option<Arc<Session>> {
        self.inner.session.read().clone()
    }

    fn dial(&self) -> Result<(Arc<Session>, Arc<Selector>), TransportError> {
        let reactor = &self.inner.reactor;
        let selector = reactor.selector()?;
        let config = reactor.core().config();
        let target = net::resolve(&config.host, config.port)?;
        let session = reactor.connect(target)?;
        *self.inner.session.write() = Some(session.clone());
        Ok((session, selector))
    }

    /// 流结束，或会话在本次事件处理中被关闭（例如写出失败），都连带关闭连接器。
    fn on_event(&self, event: &Event) {
        let ended = self.inner.reactor.on_session_event(event).is_some();
        if ended || self.session().is_some_and(|session| session.is_closed()) {
            self.close();
        }
    }
}
