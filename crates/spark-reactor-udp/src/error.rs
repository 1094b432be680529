//! UDP 传输的操作常量，错误码以 `spark.reactor.udp.` 为前缀。

use spark_reactor_core::OperationKind;

/// 绑定本地地址。
pub const BIND: OperationKind = OperationKind {
    code: "spark.reactor.udp.bind",
    message: "bind datagram socket",
};

/// 连接远端地址（仅设置默认目标，不产生网络交互）。
pub const CONNECT: OperationKind = OperationKind {
    code: "spark.reactor.udp.connect",
    message: "connect datagram socket",
};

/// 接收数据报。
pub const RECEIVE: OperationKind = OperationKind {
    code: "spark.reactor.udp.receive",
    message: "receive datagram",
};

/// 设置套接字选项。
pub const CONFIGURE: OperationKind = OperationKind {
    code: "spark.reactor.udp.configure",
    message: "configure socket",
};
