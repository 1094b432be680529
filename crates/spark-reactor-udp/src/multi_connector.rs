use std::sync::Arc;

use spark_reactor_core::{
    Reactor, ReactorConfig, ReactorCore, Session, SessionTable, TransportError, net,
};
use tracing::info;

use crate::reactor::{ConnectedTable, DatagramReactor};

struct Inner {
    reactor: DatagramReactor,
    sessions: Arc<ConnectedTable>,
}

/// 多目标 UDP 连接器：每个目标独占一个已连接套接字，全部注册在同一选择器上。
///
/// - **逻辑 (How)**：`open(host, port)` 创建套接字与会话并立即打开会话，不阻塞；
///   `connect` 在调用线程运行共享选择循环；
/// - **契约 (What)**：单个目标读取失败只关闭对应会话及其套接字，连接器继续运行。
#[derive(Clone)]
pub struct DatagramMultiConnector {
    inner: Arc<Inner>,
}

impl Reactor for DatagramMultiConnector {
    fn core(&self) -> &ReactorCore {
        self.inner.reactor.core()
    }
}

impl DatagramMultiConnector {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(ReactorConfig::default())
    }

    pub fn with_config(config: ReactorConfig) -> Result<Self, TransportError> {
        Ok(Self {
            inner: Arc::new(Inner {
                reactor: DatagramReactor::new("datagram-multi-connector", config)?,
                sessions: Arc::new(SessionTable::new()),
            }),
        })
    }

    pub fn init(&self) -> Result<(), TransportError> {
        self.inner.reactor.init(|| {
            self.inner.sessions.close_all();
        })
    }

    /// 登记目标并返回已打开的会话；`Initialized` 与 `Active` 状态均可调用。
    pub fn open(&self, host: &str, port: u16) -> Result<Arc<Session>, TransportError> {
        let reactor = &self.inner.reactor;
        reactor.core().ensure_ready()?;
        let target = net::resolve(host, port)?;
        reactor.dial(target, &self.inner.sessions)
    }

    /// 在当前线程运行选择循环，直到 `close`。
    pub fn connect(&self) -> Result<(), TransportError> {
        let reactor = &self.inner.reactor;
        let core = reactor.core();
        core.activate()?;
        let selector = match reactor.selector() {
            Ok(selector) => selector,
            Err(err) => {
                core.abort_start();
                return Err(err);
            }
        };
        if let Err(err) = core.start_idle_sweep(self.inner.sessions.clone()) {
            core.abort_start();
            return Err(err);
        }
        info!(
            reactor = core.name(),
            targets = self.inner.sessions.len(),
            "datagram multi-connector running"
        );
        let outcome = core.run_loop(&selector, |event| {
            reactor.on_connected_event(event, &self.inner.sessions);
            Ok(())
        });
        self.inner.sessions.close_all();
        outcome
    }

    pub fn close(&self) {
        let core = self.inner.reactor.core();
        if !core.shutdown() {
            return;
        }
        self.inner.reactor.wake();
        let closed = self.inner.sessions.close_all();
        info!(
            reactor = core.name(),
            closed,
            "datagram multi-connector closed"
        );
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.inner.sessions.sessions()
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }
}
