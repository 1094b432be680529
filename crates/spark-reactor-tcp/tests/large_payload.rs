mod support;

use std::{
    io::Read,
    net::TcpStream,
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};

use bytes::Bytes;
use spark_reactor_core::{Handler, Reactor, Session, TransportError};
use spark_reactor_tcp::SocketAcceptor;
use support::{WAIT, wait_until};

const CHUNK: usize = 1024 * 1024;
const CHUNKS: usize = 32;

fn pattern(offset: usize, len: usize) -> Vec<u8> {
    (offset..offset + len).map(|i| (i % 251) as u8).collect()
}

/// 会话打开后一次性排入远超内核缓冲的数据。
struct Flood;

impl Handler for Flood {
    fn session_opened(&self, session: &Arc<Session>) -> Result<(), TransportError> {
        for chunk in 0..CHUNKS {
            session.send(Bytes::from(pattern(chunk * CHUNK, CHUNK)))?;
        }
        Ok(())
    }
}

#[test]
fn backlog_drains_in_order_after_peer_resumes_reading() {
    let acceptor = SocketAcceptor::new("127.0.0.1", 0).expect("构造接收端");
    acceptor.set_handler(Arc::new(Flood));
    acceptor.set_send_buffer_size(64 * 1024).expect("合法发送缓冲");
    acceptor.init().expect("初始化接收端");

    let (tx, rx) = mpsc::channel();
    let runner = acceptor.clone();
    let handle = thread::spawn(move || {
        runner
            .start_with_notify(move |addr| {
                let _ = tx.send(addr);
            })
            .expect("接收端正常运行");
    });
    let addr = rx.recv_timeout(WAIT).expect("接收端启动");

    let mut client = TcpStream::connect(addr).expect("连接接收端");
    client.set_read_timeout(Some(WAIT)).expect("设置读取超时");
    assert!(wait_until(|| acceptor.session_count() == 1));
    let session = acceptor.sessions().pop().expect("已接入的会话");
    // 对端暂不读取，让内核缓冲写满、出站队列积压。
    thread::sleep(Duration::from_millis(300));
    assert!(session.has_pending(), "对端未读取时必须有积压");

    let mut received = vec![0u8; CHUNK * CHUNKS];
    client.read_exact(&mut received).expect("必须收到全部字节");
    assert!(
        received == pattern(0, CHUNK * CHUNKS),
        "字节流必须按排队顺序到达"
    );
    assert!(wait_until(|| !session.has_pending()), "积压必须全部冲刷");
    assert!(session.is_open());

    acceptor.stop();
    handle.join().expect("接收端线程结束");
}
