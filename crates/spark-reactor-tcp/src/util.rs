use std::net::SocketAddr;

use mio::net::TcpListener;
use socket2::{Domain, Protocol, Socket, Type};
use spark_reactor_core::{TransportError, map_io_error};

use crate::error;

/// 监听队列长度。
const BACKLOG: i32 = 1024;

/// 通过 `socket2` 创建非阻塞监听套接字。
///
/// - **意图 (Why)**：`mio::net::TcpListener::bind` 不暴露 `SO_REUSEADDR`，因此先用 `socket2`
///   完成选项设置、绑定与监听，再交给 `mio`；
/// - **契约 (What)**：选项设置失败返回 `CONFIGURE`，绑定或监听失败返回 `BIND`。
pub(crate) fn bind_listener(
    addr: SocketAddr,
    reuse_address: bool,
) -> Result<TcpListener, TransportError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|err| map_io_error(error::BIND, err))?;
    socket
        .set_reuse_address(reuse_address)
        .map_err(|err| map_io_error(error::CONFIGURE, err))?;
    socket
        .set_nonblocking(true)
        .map_err(|err| map_io_error(error::CONFIGURE, err))?;
    socket
        .bind(&addr.into())
        .map_err(|err| map_io_error(error::BIND, err))?;
    socket
        .listen(BACKLOG)
        .map_err(|err| map_io_error(error::BIND, err))?;
    Ok(TcpListener::from_std(socket.into()))
}
