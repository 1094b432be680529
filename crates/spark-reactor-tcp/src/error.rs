//! TCP 传输的操作常量。错误码统一以 `spark.reactor.tcp.` 为前缀，
//! 与核心 crate 的 [`map_io_error`](spark_reactor_core::map_io_error) 配合使用。

use spark_reactor_core::OperationKind;

/// 绑定并监听本地地址。
pub const BIND: OperationKind = OperationKind {
    code: "spark.reactor.tcp.bind",
    message: "bind listener",
};

/// 接受入站连接。
pub const ACCEPT: OperationKind = OperationKind {
    code: "spark.reactor.tcp.accept",
    message: "accept connection",
};

/// 发起或完成出站连接。
pub const CONNECT: OperationKind = OperationKind {
    code: "spark.reactor.tcp.connect",
    message: "connect stream",
};

/// 从流中读取。
pub const READ: OperationKind = OperationKind {
    code: "spark.reactor.tcp.read",
    message: "read stream",
};

/// 设置套接字选项。
pub const CONFIGURE: OperationKind = OperationKind {
    code: "spark.reactor.tcp.configure",
    message: "configure socket",
};
