//! 会话与底层传输之间的两条接缝：写出/关闭（[`SessionChannel`]）与写兴趣控制（[`Pushable`]）。

use std::{fmt, io, net::SocketAddr, sync::Arc};

use crate::{error::TransportError, session::Session};

/// 会话持有的底层通道。
///
/// # 教案式说明
/// - **意图 (Why)**：把 TCP 流、共享 UDP 套接字、独占 UDP 套接字统一为“写一块字节 + 释放资源”两个动作，
///   使会话的缓冲冲刷协议与传输无关；
/// - **契约 (What)**：
///   - `write` 必须是非阻塞的：无法写出时返回 `WouldBlock`，写出多少返回多少；
///   - `remote` 为会话记录的对端地址，未连接的数据报套接字据此 `send_to`，流式通道忽略该参数；
///   - `close` 可重复调用；共享套接字的实现不得真正关闭底层描述符。
pub trait SessionChannel: Send + Sync + fmt::Debug {
    fn write(&self, buf: &[u8], remote: Option<SocketAddr>) -> io::Result<usize>;

    fn close(&self) -> io::Result<()>;
}

/// 写兴趣控制器。
///
/// # 教案式说明
/// - **意图 (Why)**：会话出站队列由空变非空时通知 reactor 关注可写事件，排空后撤销，
///   避免在总是可写的描述符上空转；
/// - **契约 (What)**：
///   - 两个方法都可能在非 reactor 线程被调用，实现必须在修改兴趣集合后唤醒选择器；
///   - `add` 对同一会话重复调用是安全的，并会重新武装（re-arm）可写通知；
///   - 调用方在会话发送锁内调用，因此实现中不得回调会话或触发过滤器事件。
pub trait Pushable: Send + Sync {
    fn add(&self, session: &Arc<Session>) -> Result<(), TransportError>;

    fn remove(&self, session: &Arc<Session>) -> Result<(), TransportError>;
}

/// 没有底层通道的占位实现，用于 reactor 级故障通知时构造的临时会话。
#[derive(Debug, Default)]
pub(crate) struct DetachedChannel;

impl SessionChannel for DetachedChannel {
    fn write(&self, _buf: &[u8], _remote: Option<SocketAddr>) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::NotConnected,
            "detached session has no channel",
        ))
    }

    fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

impl Pushable for DetachedChannel {
    fn add(&self, _session: &Arc<Session>) -> Result<(), TransportError> {
        Err(TransportError::illegal_state("detached session cannot request write interest"))
    }

    fn remove(&self, _session: &Arc<Session>) -> Result<(), TransportError> {
        Ok(())
    }
}
