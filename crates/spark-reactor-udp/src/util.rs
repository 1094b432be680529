use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use mio::net::UdpSocket;
use socket2::{Domain, Protocol, Socket, Type};
use spark_reactor_core::{TransportError, map_io_error};

use crate::error;

/// 通过 `socket2` 创建非阻塞数据报套接字并绑定。
pub(crate) fn bind_datagram(
    addr: SocketAddr,
    reuse_address: bool,
) -> Result<UdpSocket, TransportError> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
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
    Ok(UdpSocket::from_std(socket.into()))
}

/// 与 `target` 同族的通配地址，端口由系统分配。
pub(crate) fn ephemeral_for(target: SocketAddr) -> SocketAddr {
    match target {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_address_matches_family() {
        let v4: SocketAddr = "127.0.0.1:9".parse().expect("IPv4 地址");
        let v6: SocketAddr = "[::1]:9".parse().expect("IPv6 地址");
        assert!(ephemeral_for(v4).is_ipv4());
        assert!(ephemeral_for(v6).is_ipv6());
        assert_eq!(ephemeral_for(v4).port(), 0);
    }

    #[test]
    fn binds_ephemeral_loopback_port() {
        let socket = bind_datagram("127.0.0.1:0".parse().expect("回环地址"), false)
            .expect("绑定临时端口");
        assert_ne!(socket.local_addr().expect("本地地址").port(), 0);
    }
}
