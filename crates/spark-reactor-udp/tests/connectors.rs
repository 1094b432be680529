mod support;

use std::{net::SocketAddr, sync::Arc, sync::mpsc, thread};

use spark_reactor_core::{Reactor, SessionState};
use spark_reactor_udp::{DatagramAcceptor, DatagramConnector, DatagramMultiConnector};
use support::{EchoHandler, GreetingHandler, WAIT, wait_until};

fn spawn_acceptor(
    handler: Arc<EchoHandler>,
) -> (DatagramAcceptor, SocketAddr, thread::JoinHandle<()>) {
    let acceptor = DatagramAcceptor::new("127.0.0.1", 0).expect("构造接收端");
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
    let addr = rx.recv_timeout(WAIT).expect("接收端必须上报绑定地址");
    (acceptor, addr, handle)
}

#[test]
fn connector_receives_its_echo() {
    let (acceptor, addr, acceptor_thread) = spawn_acceptor(Arc::new(EchoHandler::default()));

    let (client, inbox) = GreetingHandler::new(b"ping");
    let connector = DatagramConnector::new("127.0.0.1", addr.port()).expect("构造连接器");
    connector.set_handler(client);
    connector.init().expect("初始化连接器");
    let (tx, rx) = mpsc::channel();
    let runner = connector.clone();
    let connector_thread = thread::spawn(move || {
        runner
            .open_with_notify(move |session| {
                let _ = tx.send(session);
            })
            .expect("连接器正常运行");
    });

    let session = rx.recv_timeout(WAIT).expect("连接器上报会话");
    assert_eq!(
        session.state(),
        SessionState::Open,
        "数据报会话在 open 时即打开"
    );
    assert_eq!(session.remote_addr(), Some(addr));
    let echoed = inbox.recv_timeout(WAIT).expect("等待回显超时");
    assert_eq!(&echoed[..], b"ping", "一次读取对应一个完整数据报");
    assert!(wait_until(|| acceptor.session_count() == 1));

    connector.close();
    connector_thread.join().expect("连接器线程结束");
    assert!(session.is_closed());
    assert!(!connector.is_active());

    acceptor.stop();
    acceptor_thread.join().expect("接收端线程结束");
}

#[test]
fn connector_stops_when_target_is_unreachable() {
    let vacant = std::net::UdpSocket::bind("127.0.0.1:0").expect("占用临时端口");
    let port = vacant.local_addr().expect("读取端口").port();
    drop(vacant);

    let (client, _inbox) = GreetingHandler::new(b"anyone?");
    let connector = DatagramConnector::new("127.0.0.1", port).expect("构造连接器");
    connector.set_handler(client);
    connector.init().expect("初始化连接器");
    let runner = connector.clone();
    let connector_thread = thread::spawn(move || runner.open().expect("连接器正常退出"));

    // 回环上的端口不可达以读取错误的形式返回给已连接套接字。
    connector_thread.join().expect("读取失败后选择循环必须退出");
    assert!(!connector.is_active());
    assert!(connector.session().is_some_and(|session| session.is_closed()));
}

#[test]
fn multi_connector_serves_several_targets() {
    let echo = Arc::new(EchoHandler::default());
    let (acceptor, addr, acceptor_thread) = spawn_acceptor(echo.clone());

    let (client, inbox) = GreetingHandler::new(b"hi");
    let connector = DatagramMultiConnector::new().expect("构造多目标连接器");
    connector.set_handler(client);
    assert!(
        connector.open("127.0.0.1", addr.port()).is_err(),
        "未初始化不可登记目标"
    );
    connector.init().expect("初始化");
    let first = connector.open("127.0.0.1", addr.port()).expect("登记第一个目标");
    assert!(first.is_open());

    let runner = connector.clone();
    let connector_thread = thread::spawn(move || runner.connect().expect("连接器正常运行"));
    let second = connector.open("127.0.0.1", addr.port()).expect("运行期间登记目标");
    assert_ne!(
        first.local_addr(),
        second.local_addr(),
        "每个目标独占一个套接字"
    );

    let mut received = Vec::new();
    while received.len() < 4 {
        let chunk = inbox.recv_timeout(WAIT).expect("等待回显超时");
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, b"hihi");
    assert_eq!(connector.session_count(), 2);
    assert!(wait_until(|| acceptor.session_count() == 2));

    second.close();
    assert!(first.is_open(), "关闭单个会话不影响其它目标");
    first
        .send(bytes::Bytes::from_static(b"ok"))
        .expect("剩余会话继续可用");
    let echoed = inbox.recv_timeout(WAIT).expect("等待回显超时");
    assert_eq!(&echoed[..], b"ok");

    connector.close();
    connector_thread.join().expect("连接器线程结束");
    assert!(first.is_closed());
    acceptor.stop();
    acceptor_thread.join().expect("接收端线程结束");
}
