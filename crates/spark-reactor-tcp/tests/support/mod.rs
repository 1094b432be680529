//! 回环测试共用的处理器与等待工具。
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

/// 打开即关闭会话。
pub struct SlamHandler;

impl Handler for SlamHandler {
    fn session_opened(&self, session: &Arc<Session>) -> Result<(), TransportError> {
        session.close();
        Ok(())
    }
}
