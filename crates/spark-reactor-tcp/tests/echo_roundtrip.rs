mod support;

use std::{net::SocketAddr, sync::Arc, sync::mpsc, thread};

use spark_reactor_core::{Reactor, SessionState};
use spark_reactor_tcp::{SocketAcceptor, SocketConnector, SocketMultiConnector};
use support::{EchoHandler, GreetingHandler, SlamHandler, WAIT, wait_until};

fn spawn_acceptor(
    handler: Arc<dyn spark_reactor_core::Handler>,
) -> (SocketAcceptor, SocketAddr, thread::JoinHandle<()>) {
    let acceptor = SocketAcceptor::new("127.0.0.1", 0).expect("构造接收端");
    acceptor.set_handler(handler);
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
    let addr = rx.recv_timeout(WAIT).expect("接收端必须上报监听地址");
    (acceptor, addr, handle)
}

fn collect(inbox: &mpsc::Receiver<bytes::Bytes>, expected: usize) -> Vec<u8> {
    let mut received = Vec::new();
    while received.len() < expected {
        let chunk = inbox.recv_timeout(WAIT).expect("等待回显超时");
        received.extend_from_slice(&chunk);
    }
    received
}

#[test]
fn connector_receives_its_echo() {
    let echo = Arc::new(EchoHandler::default());
    let (acceptor, addr, acceptor_thread) = spawn_acceptor(echo.clone());
    assert_eq!(acceptor.local_addr(), Some(addr));

    let (client, inbox) = GreetingHandler::new(b"ping");
    let connector = SocketConnector::new("127.0.0.1", addr.port()).expect("构造连接器");
    connector.set_handler(client);
    connector.init().expect("初始化连接器");
    let runner = connector.clone();
    let connector_thread = thread::spawn(move || runner.open().expect("连接器正常运行"));

    assert_eq!(collect(&inbox, 4), b"ping");
    assert!(wait_until(|| acceptor.session_count() == 1));
    let session = connector.session().expect("连接器持有会话");
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(session.remote_addr(), Some(addr));

    connector.close();
    connector_thread.join().expect("连接器线程结束");
    assert!(session.is_closed());
    assert!(
        wait_until(|| acceptor.session_count() == 0),
        "对端关闭后接收端必须移除会话"
    );
    assert_eq!(*echo.closed.lock(), 1);

    acceptor.stop();
    acceptor_thread.join().expect("接收端线程结束");
}

#[test]
fn single_connector_closes_itself_on_peer_eof() {
    let (acceptor, addr, acceptor_thread) = spawn_acceptor(Arc::new(SlamHandler));

    let (client, _inbox) = GreetingHandler::new(b"hello");
    let connector = SocketConnector::new("127.0.0.1", addr.port()).expect("构造连接器");
    connector.set_handler(client);
    connector.init().expect("初始化连接器");
    let runner = connector.clone();
    let connector_thread = thread::spawn(move || runner.open().expect("连接器正常退出"));

    connector_thread.join().expect("对端关闭后选择循环必须退出");
    assert!(!connector.is_active());
    assert!(connector.session().is_some_and(|session| session.is_closed()));

    acceptor.stop();
    acceptor_thread.join().expect("接收端线程结束");
}

#[test]
fn multi_connector_serves_several_targets() {
    let echo = Arc::new(EchoHandler::default());
    let (acceptor, addr, acceptor_thread) = spawn_acceptor(echo.clone());

    let (client, inbox) = GreetingHandler::new(b"hi");
    let connector = SocketMultiConnector::new().expect("构造多目标连接器");
    connector.set_handler(client);
    connector.init().expect("初始化");
    let first = connector.open("127.0.0.1", addr.port()).expect("登记第一个目标");
    assert_eq!(
        first.state(),
        SessionState::Created,
        "建连完成前会话尚未打开"
    );

    let runner = connector.clone();
    let connector_thread = thread::spawn(move || runner.connect().expect("连接器正常运行"));
    let second = connector.open("127.0.0.1", addr.port()).expect("运行期间登记目标");

    assert_eq!(collect(&inbox, 4), b"hihi");
    assert!(wait_until(|| first.is_open() && second.is_open()));
    assert_eq!(connector.session_count(), 2);
    assert!(wait_until(|| *echo.opened.lock() == 2));

    second.close();
    assert!(
        wait_until(|| *echo.closed.lock() == 1),
        "接收端必须观察到对端关闭"
    );
    assert!(first.is_open(), "关闭单个会话不影响其它会话");

    connector.close();
    connector_thread.join().expect("连接器线程结束");
    assert!(first.is_closed());
    acceptor.stop();
    acceptor_thread.join().expect("接收端线程结束");
}
