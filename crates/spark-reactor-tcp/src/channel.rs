use std::{
    fmt,
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use mio::{Interest, Token, net::TcpStream};
use parking_lot::Mutex;
use spark_reactor_core::{
    Pushable, Selector, Session, SessionChannel, TransportError, error as core_error,
    map_io_error,
};
use tracing::debug;

/// 一条已注册到选择器的 TCP 流。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 同时扮演会话的 [`SessionChannel`]（写出/释放）与 [`Pushable`]（写兴趣控制），
///   因为 TCP 的写兴趣就是这条流自身在选择器上的兴趣集合；
///
/// ## 逻辑 (How)
/// - 流放在 `Mutex<Option<_>>` 中，`close` 取走后所有操作都退化为 `NotConnected` 或空操作；
/// - 建连阶段只关注 `WRITABLE`，完成后改为 `READABLE`，写兴趣只随第一个排队数据包出现；
/// - `add`/`remove` 修改兴趣集合后唤醒选择器，保证非 reactor 线程的修改立即生效。
///
/// ## 契约 (What)
/// - 锁顺序：会话发送锁 → 流锁；本类型从不回调会话或触发事件；
/// - `close` 幂等，注销失败只记录日志。
pub(crate) struct StreamChannel {
    token: Token,
    selector: Arc<Selector>,
    stream: Mutex<Option<TcpStream>>,
    connecting: AtomicBool,
}

impl fmt::Debug for StreamChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamChannel")
            .field("token", &self.token)
            .field("open", &self.stream.lock().is_some())
            .field("connecting", &self.connecting.load(Ordering::Acquire))
            .finish()
    }
}

impl StreamChannel {
    /// 注册一条已建立的流，只关注可读事件。
    pub(crate) fn established(
        stream: TcpStream,
        token: Token,
        selector: Arc<Selector>,
    ) -> Result<Arc<Self>, TransportError> {
        Self::register(stream, token, selector, Interest::READABLE, false)
    }

    /// 注册一条正在建连的流，只关注可写事件。
    pub(crate) fn connecting(
        stream: TcpStream,
        token: Token,
        selector: Arc<Selector>,
    ) -> Result<Arc<Self>, TransportError> {
        Self::register(stream, token, selector, Interest::WRITABLE, true)
    }

    fn register(
        mut stream: TcpStream,
        token: Token,
        selector: Arc<Selector>,
        interest: Interest,
        connecting: bool,
    ) -> Result<Arc<Self>, TransportError> {
        selector
            .registry()
            .register(&mut stream, token, interest)
            .map_err(|err| map_io_error(core_error::REGISTER, err))?;
        Ok(Arc::new(Self {
            token,
            selector,
            stream: Mutex::new(Some(stream)),
            connecting: AtomicBool::new(connecting),
        }))
    }

    pub(crate) fn token(&self) -> Token {
        self.token
    }

    pub(crate) fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::Acquire)
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        self.stream.lock().as_ref().and_then(|stream| stream.local_addr().ok())
    }

    /// 非阻塞读取一次；流已释放时返回 `NotConnected`。
    pub(crate) fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.lock().as_mut() {
            Some(stream) => stream.read(buf),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    /// 检查建连结果。
    ///
    /// - `Ok(None)`：尚未完成（虚假唤醒），继续等待；
    /// - `Ok(Some((local, peer)))`：已建立，兴趣集合已切换为 `READABLE`；
    /// - `Err`：建连失败。
    pub(crate) fn finish_connect(&self) -> io::Result<Option<(SocketAddr, SocketAddr)>> {
        let mut guard = self.stream.lock();
        let Some(stream) = guard.as_mut() else {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        };
        if let Some(err) = stream.take_error()? {
            return Err(err);
        }
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::NotConnected | io::ErrorKind::WouldBlock
                ) =>
            {
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let local = stream.local_addr()?;
        self.selector
            .registry()
            .reregister(stream, self.token, Interest::READABLE)?;
        self.connecting.store(false, Ordering::Release);
        Ok(Some((local, peer)))
    }

    fn reregister(&self, interest: Interest) -> Result<(), TransportError> {
        {
            let mut guard = self.stream.lock();
            let Some(stream) = guard.as_mut() else {
                return Ok(());
            };
            if self.is_connecting() {
                return Ok(());
            }
            self.selector
                .registry()
                .reregister(stream, self.token, interest)
                .map_err(|err| map_io_error(core_error::REGISTER, err))?;
        }
        self.selector.wake()
    }
}

impl SessionChannel for StreamChannel {
    fn write(&self, buf: &[u8], _remote: Option<SocketAddr>) -> io::Result<usize> {
        match self.stream.lock().as_mut() {
            Some(stream) => stream.write(buf),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    fn close(&self) -> io::Result<()> {
        let Some(mut stream) = self.stream.lock().take() else {
            return Ok(());
        };
        if let Err(err) = self.selector.registry().deregister(&mut stream) {
            debug!(token = self.token.0, error = %err, "stream deregistration failed");
        }
        match stream.shutdown(Shutdown::Both) {
            Err(err) if err.kind() != io::ErrorKind::NotConnected => Err(err),
            _ => Ok(()),
        }
    }
}

impl Pushable for StreamChannel {
    fn add(&self, _session: &Arc<Session>) -> Result<(), TransportError> {
        self.reregister(Interest::READABLE | Interest::WRITABLE)
    }

    fn remove(&self, _session: &Arc<Session>) -> Result<(), TransportError> {
        self.reregister(Interest::READABLE)
    }
}
