use std::{fmt, io, net::SocketAddr, sync::Arc};

use mio::{Interest, Token, net::UdpSocket};
use parking_lot::Mutex;
use spark_reactor_core::{
    Pushable, Selector, Session, SessionChannel, TransportError, error as core_error,
    map_io_error,
};
use tracing::debug;

/// 已注册到选择器的数据报套接字。
///
/// # 教案式说明
/// - **意图 (Why)**：接收端上所有对端会话共享一个套接字，连接器则每个目标独占一个；
///   两种情况都通过本类型读写与调整兴趣集合；
/// - **契约 (What)**：
///   - 已连接（`connected`）的套接字用 `send`/`recv`，否则按会话记录的对端地址 `send_to`；
///   - `close` 取走套接字并注销，之后所有读写返回 `NotConnected`，兴趣调整为空操作。
pub(crate) struct DatagramSocket {
    token: Token,
    selector: Arc<Selector>,
    socket: Mutex<Option<UdpSocket>>,
    connected: bool,
    local_addr: Option<SocketAddr>,
}

impl fmt::Debug for DatagramSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatagramSocket")
            .field("token", &self.token)
            .field("local_addr", &self.local_addr)
            .field("connected", &self.connected)
            .field("open", &self.socket.lock().is_some())
            .finish()
    }
}

impl DatagramSocket {
    pub(crate) fn register(
        mut socket: UdpSocket,
        token: Token,
        selector: Arc<Selector>,
        connected: bool,
    ) -> Result<Arc<Self>, TransportError> {
        selector
            .registry()
            .register(&mut socket, token, Interest::READABLE)
            .map_err(|err| map_io_error(core_error::REGISTER, err))?;
        let local_addr = socket.local_addr().ok();
        Ok(Arc::new(Self {
            token,
            selector,
            socket: Mutex::new(Some(socket)),
            connected,
            local_addr,
        }))
    }

    pub(crate) fn token(&self) -> Token {
        self.token
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub(crate) fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        match self.socket.lock().as_ref() {
            Some(socket) => socket.recv_from(buf),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    pub(crate) fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self.socket.lock().as_ref() {
            Some(socket) => socket.recv(buf),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    fn send(&self, buf: &[u8], remote: Option<SocketAddr>) -> io::Result<usize> {
        let guard = self.socket.lock();
        let Some(socket) = guard.as_ref() else {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        };
        if self.connected {
            return socket.send(buf);
        }
        match remote {
            Some(remote) => socket.send_to(buf, remote),
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "datagram session has no remote address",
            )),
        }
    }

    /// 切换写兴趣并唤醒选择器；套接字已关闭时为空操作。
    pub(crate) fn set_write_interest(&self, writable: bool) -> Result<(), TransportError> {
        let interest = if writable {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        {
            let mut guard = self.socket.lock();
            let Some(socket) = guard.as_mut() else {
                return Ok(());
            };
            self.selector
                .registry()
                .reregister(socket, self.token, interest)
                .map_err(|err| map_io_error(core_error::REGISTER, err))?;
        }
        self.selector.wake()
    }

    pub(crate) fn close(&self) {
        let Some(mut socket) = self.socket.lock().take() else {
            return;
        };
        if let Err(err) = self.selector.registry().deregister(&mut socket) {
            debug!(token = self.token.0, error = %err, "datagram socket deregistration failed");
        }
    }
}

/// 等待冲刷的会话集合，作为共享同一套接字的会话的 [`Pushable`]。
///
/// - **契约 (What)**：集合由空变非空时打开写兴趣，变空时撤销；集合锁内完成兴趣切换，
///   保证并发的 `add`/`remove` 不会留下错误的兴趣状态；
/// - 锁顺序：会话发送锁 → 集合锁 → 套接字锁。
pub(crate) struct PushRegistry {
    socket: Arc<DatagramSocket>,
    pending: Mutex<Vec<Arc<Session>>>,
}

impl PushRegistry {
    pub(crate) fn new(socket: Arc<DatagramSocket>) -> Arc<Self> {
        Arc::new(Self {
            socket,
            pending: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<Session>> {
        self.pending.lock().clone()
    }

    /// 冲刷一轮后仍有积压时重新武装写兴趣，以获得下一次边沿通知。
    pub(crate) fn rearm(&self) -> Result<(), TransportError> {
        let pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(());
        }
        self.socket.set_write_interest(true)
    }
}

impl Pushable for PushRegistry {
    fn add(&self, session: &Arc<Session>) -> Result<(), TransportError> {
        let mut pending = self.pending.lock();
        if !pending.iter().any(|queued| Arc::ptr_eq(queued, session)) {
            pending.push(session.clone());
        }
        self.socket.set_write_interest(true)
    }

    fn remove(&self, session: &Arc<Session>) -> Result<(), TransportError> {
        let mut pending = self.pending.lock();
        pending.retain(|queued| !Arc::ptr_eq(queued, session));
        if pending.is_empty() {
            self.socket.set_write_interest(false)
        } else {
            Ok(())
        }
    }
}

/// 数据报会话的通道：写出经由（可能共享的）套接字，只有独占时才在关闭会话时释放套接字。
#[derive(Debug)]
pub(crate) struct PeerChannel {
    socket: Arc<DatagramSocket>,
    owns_socket: bool,
}

impl PeerChannel {
    pub(crate) fn shared(socket: Arc<DatagramSocket>) -> Arc<Self> {
        Arc::new(Self {
            socket,
            owns_socket: false,
        })
    }

    pub(crate) fn exclusive(socket: Arc<DatagramSocket>) -> Arc<Self> {
        Arc::new(Self {
            socket,
            owns_socket: true,
        })
    }
}

impl SessionChannel for PeerChannel {
    fn write(&self, buf: &[u8], remote: Option<SocketAddr>) -> io::Result<usize> {
        self.socket.send(buf, remote)
    }

    fn close(&self) -> io::Result<()> {
        if self.owns_socket {
            self.socket.close();
        }
        Ok(())
    }
}
