mod support;

use std::{sync::Arc, sync::mpsc, thread, time::Duration};

use spark_reactor_core::{LifecycleState, Reactor, TransportError};
use spark_reactor_tcp::{SocketAcceptor, SocketConnector, SocketMultiConnector};
use support::{EchoHandler, WAIT};

#[test]
fn start_requires_init_and_handler() {
    let acceptor = SocketAcceptor::new("127.0.0.1", 0).expect("构造接收端");
    let err = acceptor.start().expect_err("未初始化不可启动");
    assert!(matches!(err, TransportError::IllegalState { .. }));

    acceptor.init().expect("初始化");
    let err = acceptor.start().expect_err("未绑定处理器不可启动");
    assert_eq!(err.code(), "spark.reactor.illegal_state");
    assert_eq!(acceptor.state(), LifecycleState::Initialized);
}

#[test]
fn multi_connector_open_requires_init() {
    let connector = SocketMultiConnector::new().expect("构造多目标连接器");
    connector.set_handler(Arc::new(EchoHandler::default()));
    assert!(
        connector.open("127.0.0.1", 9).is_err(),
        "未初始化不可登记目标"
    );
}

#[test]
fn invalid_buffer_sizes_are_rejected() {
    let connector = SocketConnector::new("127.0.0.1", 9).expect("构造连接器");
    let err = connector.set_receive_buffer_size(0).expect_err("零容量必须被拒绝");
    assert!(matches!(err, TransportError::InvalidArgument { .. }));
    assert!(connector.set_send_buffer_size(0).is_err());
    connector.set_send_buffer_size(4096).expect("合法容量");
    assert_eq!(connector.config().send_buffer_size, 4096);
}

#[test]
fn refused_connect_reverts_to_stopped() {
    let vacant = std::net::TcpListener::bind("127.0.0.1:0").expect("占用临时端口");
    let port = vacant.local_addr().expect("读取端口").port();
    drop(vacant);

    let connector = SocketConnector::new("127.0.0.1", port).expect("构造连接器");
    connector.set_handler(Arc::new(EchoHandler::default()));
    connector.init().expect("初始化");
    // 回环上的拒绝可能在 connect 调用时同步返回，也可能随后以错误事件到达。
    let _ = connector.open();
    assert_eq!(connector.state(), LifecycleState::Stopped);
    assert!(connector.session().is_none_or(|session| session.is_closed()));
}

#[test]
fn running_acceptor_rejects_reconfiguration() {
    let acceptor = SocketAcceptor::new("127.0.0.1", 0).expect("构造接收端");
    acceptor.set_handler(Arc::new(EchoHandler::default()));
    acceptor.init().expect("初始化");

    let (tx, rx) = mpsc::channel();
    let runner = acceptor.clone();
    let handle = thread::spawn(move || {
        runner
            .start_with_notify(move |addr| {
                let _ = tx.send(addr);
            })
            .expect("接收端正常运行");
    });
    rx.recv_timeout(WAIT).expect("接收端启动");

    assert!(acceptor.is_active());
    assert!(
        acceptor.set_send_buffer_size(1024).is_err(),
        "运行期间不可修改发送缓冲"
    );
    assert!(acceptor.set_reuse_address(false).is_err());
    assert!(acceptor.init().is_err(), "运行期间不可重新初始化");
    acceptor.set_select_timeout(Duration::from_millis(20));
    assert!(acceptor.start().is_err(), "重复启动必须失败");

    acceptor.stop();
    handle.join().expect("接收端线程结束");
    assert_eq!(acceptor.state(), LifecycleState::Stopped);
    assert!(acceptor.start().is_err(), "停止后必须重新初始化");

    acceptor.init().expect("停止后可以重新初始化");
    assert_eq!(acceptor.state(), LifecycleState::Initialized);
}
