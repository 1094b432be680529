use std::{io, net::SocketAddr, sync::Arc};

use mio::{Interest, Token, event::Event, net::TcpListener};
use parking_lot::{Mutex, RwLock};
use spark_reactor_core::{
    Reactor, ReactorConfig, ReactorCore, Selector, Session, TransportError, error as core_error,
    map_io_error, net,
};
use tracing::{debug, info, warn};

use crate::{error, stream::StreamReactor, util::bind_listener};

struct Listening {
    token: Token,
    listener: TcpListener,
}

struct Inner {
    reactor: StreamReactor,
    listening: Mutex<Option<Listening>>,
    local_addr: RwLock<Option<SocketAddr>>,
}

/// TCP 接收端：监听本地地址，为每条入站连接创建会话。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 在调用线程上运行阻塞式选择循环，接入、读写与过滤器回调全部串行发生，应用无需额外同步；
///
/// ## 逻辑 (How)
/// 1. `init`：关闭旧会话、释放旧监听套接字并打开新选择器；
/// 2. `start`：激活生命周期 → 绑定监听 → 启动空闲检测 → 进入选择循环；
/// 3. 监听就绪时循环 `accept` 直到 `WouldBlock`，每条流注册可读兴趣后依次触发
///    `session_created`、刷新活跃时间并打开会话；
/// 4. `stop`：退出激活态、唤醒选择器、取消空闲检测、关闭监听套接字并关闭全部会话。
///
/// ## 契约 (What)
/// - 类型可廉价克隆，克隆体共享同一实例，便于在另一线程调用 `stop`；
/// - 启动失败时生命周期回退到 `Stopped`，需要重新 `init` 才能再次启动。
#[derive(Clone)]
pub struct SocketAcceptor {
    inner: Arc<Inner>,
}

impl Reactor for SocketAcceptor {
    fn core(&self) -> &ReactorCore {
        self.inner.reactor.core()
    }
}

impl SocketAcceptor {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, TransportError> {
        Self::with_config(ReactorConfig::new(host, port))
    }

    pub fn with_config(config: ReactorConfig) -> Result<Self, TransportError> {
        Ok(Self {
            inner: Arc::new(Inner {
                reactor: StreamReactor::new("socket-acceptor", config)?,
                listening: Mutex::new(None),
                local_addr: RwLock::new(None),
            }),
        })
    }

    /// 初始化或重新初始化；激活态返回 `IllegalState`。
    pub fn init(&self) -> Result<(), TransportError> {
        self.inner.reactor.init(|| {
            self.release_listener();
            Ok(())
        })
    }

    /// 启动并在当前线程运行选择循环，直到 `stop`。
    pub fn start(&self) -> Result<(), TransportError> {
        self.start_with_notify(|_| {})
    }

    /// 与 [`start`](Self::start) 相同，监听套接字就绪后以实际绑定地址调用 `notify`。
    pub fn start_with_notify<F>(&self, notify: F) -> Result<(), TransportError>
    where
        F: FnOnce(SocketAddr),
    {
        let reactor = &self.inner.reactor;
        reactor.core().activate()?;
        let (local, selector) = match self.listen() {
            Ok(bound) => bound,
            Err(err) => {
                reactor.core().abort_start();
                self.release_listener();
                return Err(err);
            }
        };
        if let Err(err) = reactor.core().start_idle_sweep(reactor.sessions().clone()) {
            reactor.core().abort_start();
            self.release_listener();
            return Err(err);
        }
        info!(reactor = reactor.core().name(), %local, "acceptor listening");
        notify(local);
        let outcome = reactor.core().run_loop(&selector, |event| self.on_event(event));
        self.release_listener();
        reactor.close_sessions();
        outcome
    }

    /// 停止接收端；未激活时为空操作。
    pub fn stop(&self) {
        let reactor = &self.inner.reactor;
        if !reactor.core().shutdown() {
            return;
        }
        reactor.wake();
        self.release_listener();
        let closed = reactor.close_sessions();
        info!(reactor = reactor.core().name(), closed, "acceptor stopped");
    }

    /// 监听套接字实际绑定的地址；尚未启动时为 `None`。
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.read()
    }

    /// 当前会话快照。
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.inner.reactor.sessions().sessions()
    }

    pub fn session_count(&self) -> usize {
        self.inner.reactor.sessions().len()
    }

    fn listen(&self) -> Result<(SocketAddr, Arc<Selector>), TransportError> {
        let reactor = &self.inner.reactor;
        let selector = reactor.selector()?;
        let config = reactor.core().config();
        let addr = net::resolve(&config.host, config.port)?;
        let mut listener = bind_listener(addr, config.reuse_address)?;
        let local = listener
            .local_addr()
            .map_err(|err| map_io_error(error::BIND, err))?;
        let token = reactor.next_token();
        selector
            .registry()
            .register(&mut listener, token, Interest::READABLE)
            .map_err(|err| map_io_error(core_error::REGISTER, err))?;
        *self.inner.listening.lock() = Some(Listening { token, listener });
        *self.inner.local_addr.write() = Some(local);
        Ok((local, selector))
    }

    fn release_listener(&self) {
        let Some(mut listening) = self.inner.listening.lock().take() else {
            return;
        };
        if let Ok(selector) = self.inner.reactor.selector()
            && let Err(err) = selector.registry().deregister(&mut listening.listener)
        {
            warn!(error = %err, "listener deregistration failed");
        }
    }

    fn on_event(&self, event: &Event) -> Result<(), TransportError> {
        let listener_token = self
            .inner
            .listening
            .lock()
            .as_ref()
            .map(|listening| listening.token);
        if Some(event.token()) == listener_token {
            return self.accept_ready();
        }
        self.inner.reactor.on_session_event(event);
        Ok(())
    }

    fn accept_ready(&self) -> Result<(), TransportError> {
        loop {
            let accepted = {
                let guard = self.inner.listening.lock();
                match guard.as_ref() {
                    Some(listening) => listening.listener.accept(),
                    None => return Ok(()),
                }
            };
            match accepted {
                Ok((stream, peer)) => {
                    if let Err(err) = self.inner.reactor.admit(stream, peer) {
                        debug!(%peer, error = %err, "connection rejected");
                        self.inner.reactor.core().report_fault(&err);
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(map_io_error(error::ACCEPT, err)),
            }
        }
    }
}
