//! 地址解析工具。

use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::{self, TransportError, map_io_error};

/// 将 `host:port` 解析为首个可用的套接字地址。
///
/// - **契约 (What)**：解析失败返回 `Io { op: RESOLVE }`；解析成功但无任何地址时返回 `InvalidArgument`。
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|err| map_io_error(error::RESOLVE, err))?
        .next()
        .ok_or_else(|| {
            TransportError::invalid_argument(format!("no address resolved for {host}:{port}"))
        })
}
