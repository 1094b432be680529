use std::sync::Arc;

use spark_reactor_core::{Reactor, ReactorConfig, ReactorCore, Session, TransportError, net};
use tracing::info;

use crate::stream::StreamReactor;

/// 多目标 TCP 连接器：一个选择器上管理任意多条出站连接。
///
/// # 教案式说明
/// - **意图 (Why)**：客户端需要同时连接多个服务端时，避免为每个目标各开一个线程；
/// - **逻辑 (How)**：`open(host, port)` 只登记目标并立即返回会话，不阻塞；`connect` 在调用线程运行
///   共享选择循环；两者顺序任意，循环运行期间登记的新目标会唤醒选择器；
/// - **契约 (What)**：
///   - `open` 在 `Initialized` 或 `Active` 状态均合法，但必须已绑定处理器；
///   - 单条连接结束只关闭该会话并移出会话表，连接器继续运行。
#[derive(Clone)]
pub struct SocketMultiConnector {
    reactor: Arc<StreamReactor>,
}

impl Reactor for SocketMultiConnector {
    fn core(&self) -> &ReactorCore {
        self.reactor.core()
    }
}

impl SocketMultiConnector {
    /// 创建使用默认配置的连接器；目标地址由 [`open`](Self::open) 给出。
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(ReactorConfig::default())
    }

    pub fn with_config(config: ReactorConfig) -> Result<Self, TransportError> {
        Ok(Self {
            reactor: Arc::new(StreamReactor::new("socket-multi-connector", config)?),
        })
    }

    pub fn init(&self) -> Result<(), TransportError> {
        self.reactor.init(|| Ok(()))
    }

    /// 登记一个目标，返回尚未打开的会话；建连完成后会话自动打开。
    pub fn open(&self, host: &str, port: u16) -> Result<Arc<Session>, TransportError> {
        self.reactor.core().ensure_ready()?;
        let target = net::resolve(host, port)?;
        self.reactor.connect(target)
    }

    /// 在当前线程运行选择循环，直到 `close`。
    pub fn connect(&self) -> Result<(), TransportError> {
        let reactor = &self.reactor;
        reactor.core().activate()?;
        let selector = match reactor.selector() {
            Ok(selector) => selector,
            Err(err) => {
                reactor.core().abort_start();
                return Err(err);
            }
        };
        if let Err(err) = reactor.core().start_idle_sweep(reactor.sessions().clone()) {
            reactor.core().abort_start();
            return Err(err);
        }
        info!(
            reactor = reactor.core().name(),
            targets = reactor.sessions().len(),
            "multi-connector running"
        );
        let outcome = reactor.core().run_loop(&selector, |event| {
            reactor.on_session_event(event);
            Ok(())
        });
        reactor.close_sessions();
        outcome
    }

    /// 关闭连接器与全部会话；未激活时为空操作。
    pub fn close(&self) {
        if !self.reactor.core().shutdown() {
            return;
        }
        self.reactor.wake();
        let closed = self.reactor.close_sessions();
        info!(
            reactor = self.reactor.core().name(),
            closed,
            "multi-connector closed"
        );
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.reactor.sessions().sessions()
    }

    pub fn session_count(&self) -> usize {
        self.reactor.sessions().len()
    }
}
