mod support;

use std::{net::SocketAddr, sync::Arc, sync::mpsc, thread};

use spark_reactor_core::{LifecycleState, Reactor, SessionState, TransportError};
use spark_reactor_udp::DatagramAcceptor;
use support::{EchoHandler, WAIT, client, round_trip, wait_until};

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
fn start_requires_init() {
    let acceptor = DatagramAcceptor::new("127.0.0.1", 0).expect("构造接收端");
    acceptor.set_handler(Arc::new(EchoHandler::default()));
    let err = acceptor.start().expect_err("未初始化不可启动");
    assert!(matches!(err, TransportError::IllegalState { .. }));
    assert_eq!(acceptor.state(), LifecycleState::Uninitialized);
    assert!(acceptor.local_addr().is_none());
}

#[test]
fn peers_are_demultiplexed_into_sessions() {
    let echo = Arc::new(EchoHandler::default());
    let (acceptor, addr, handle) = spawn_acceptor(echo.clone());
    assert_eq!(acceptor.local_addr(), Some(addr));

    let alice = client();
    let bob = client();
    assert_eq!(round_trip(&alice, addr, b"a1"), b"a1");
    assert_eq!(round_trip(&bob, addr, b"b1"), b"b1");
    assert_eq!(acceptor.session_count(), 2);

    assert_eq!(round_trip(&alice, addr, b"a2"), b"a2");
    assert_eq!(acceptor.session_count(), 2, "同一对端复用已有会话");
    assert_eq!(*echo.opened.lock(), 2);

    let alice_addr = alice.local_addr().expect("客户端地址");
    let bob_addr = bob.local_addr().expect("客户端地址");
    let alice_session = acceptor.session(&alice_addr).expect("alice 的会话");
    assert_eq!(alice_session.remote_addr(), Some(alice_addr));
    assert_eq!(alice_session.state(), SessionState::Open);

    alice_session.close();
    assert!(wait_until(|| *echo.closed.lock() == 1));
    let bob_session = acceptor.session(&bob_addr).expect("bob 的会话");
    assert!(
        bob_session.is_open(),
        "关闭单个会话不影响共享套接字上的其它会话"
    );
    assert_eq!(round_trip(&bob, addr, b"b2"), b"b2");

    assert_eq!(round_trip(&alice, addr, b"a3"), b"a3");
    let replacement = acceptor.session(&alice_addr).expect("替换会话");
    assert_ne!(
        replacement.id(),
        alice_session.id(),
        "已关闭会话必须被新会话替换"
    );
    assert!(replacement.is_open());
    assert_eq!(*echo.opened.lock(), 3);

    acceptor.stop();
    handle.join().expect("接收端线程结束");
    assert!(replacement.is_closed());
    assert!(bob_session.is_closed());
    assert_eq!(acceptor.state(), LifecycleState::Stopped);
    assert!(acceptor.local_addr().is_none(), "停止后释放套接字");
}

#[test]
fn acceptor_restarts_after_reinit() {
    let echo = Arc::new(EchoHandler::default());
    let (acceptor, first_addr, handle) = spawn_acceptor(echo.clone());
    assert_eq!(round_trip(&client(), first_addr, b"once"), b"once");
    acceptor.stop();
    handle.join().expect("接收端线程结束");

    acceptor.init().expect("停止后重新初始化");
    assert_eq!(acceptor.state(), LifecycleState::Initialized);
    assert_eq!(acceptor.session_count(), 0, "重新初始化必须清空旧会话");
    assert!(
        acceptor.local_addr().is_none(),
        "重新初始化必须释放旧套接字"
    );
    assert_eq!(*echo.closed.lock(), 1);
    let (tx, rx) = mpsc::channel();
    let runner = acceptor.clone();
    let handle = thread::spawn(move || {
        runner
            .start_with_notify(move |addr| {
                let _ = tx.send(addr);
            })
            .expect("第二次运行");
    });
    let addr = rx.recv_timeout(WAIT).expect("再次绑定");
    assert_eq!(round_trip(&client(), addr, b"again"), b"again");
    assert_eq!(acceptor.session_count(), 1);

    acceptor.stop();
    handle.join().expect("接收端线程结束");
}
