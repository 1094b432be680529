//! 数据报回环测试共用的处理器与等待工具。
#![allow(dead_code)]

use std::{
    sync::{Arc, mpsc},
    thread,
    time::{Duration, Instant},
};

use bytes::Bytes;
use parking_lot::Mutex;
use spark_reactor_core::{Handler, Session, TransportError};

pub const WAIT: Duration = Duration::from_secs(5);

/// 轮询直到条件成立或超时。
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// 原样回显收到的数据。
#[derive(Default)]
pub struct EchoHandler {
    pub opened: Mutex<usize>,
    pub closed: Mutex<usize>,
}

impl Handler for EchoHandler {
    fn session_opened(&self, _session: &Arc<Session>) -> Result<(), TransportError> {
        *self.opened.lock() += 1;
        Ok(())
    }

    fn session_closed(&self, _session: &Arc<Session>) -> Result<(), TransportError> {
        *self.closed.lock() += 1;
        Ok(())
    }

    fn data_received(&self, session: &Arc<Session>, data: Bytes) -> Result<(), TransportError> {
        session.send(data)
    }
}

/// 打开后发送问候，并把收到的数据转交测试线程。
pub struct GreetingHandler {
    greeting: &'static [u8],
    inbox: Mutex<mpsc::Sender<Bytes>>,
}

impl GreetingHandler {
    pub fn new(greeting: &'static [u8]) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel();
        (
            Arc::new(Self {
                greeting,
                inbox: Mutex::new(tx),
            }),
            rx,
        )
    }
}

impl Handler for GreetingHandler {
    fn session_opened(&self, session: &Arc<Session>) -> Result<(), TransportError> {
        session.send(Bytes::from_static(self.greeting))
    }

    fn data_received(&self, _session: &Arc<Session>, data: Bytes) -> Result<(), TransportError> {
        let _ = self.inbox.lock().send(data);
        Ok(())
    }
}

/// 绑定回环临时端口的标准库客户端，读取带超时。
pub fn client() -> std::net::UdpSocket {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").expect("绑定客户端套接字");
    socket.set_read_timeout(Some(WAIT)).expect("设置读取超时");
    socket
}

/// 发送一个数据报并等待回显。
pub fn round_trip(
    socket: &std::net::UdpSocket,
    target: std::net::SocketAddr,
    payload: &[u8],
) -> Vec<u8> {
    socket.send_to(payload, target).expect("发送数据报");
    let mut buf = [0u8; 512];
    let (len, from) = socket.recv_from(&mut buf).expect("等待回显超时");
    assert_eq!(from, target);
    buf[..len].to_vec()
}
