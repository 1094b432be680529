//! # filter 模块说明
//!
//! ## 角色定位（Why）
//! - 过滤器是事件管线上的拦截器，可观察、改写或截断任意事件；
//! - 所有方法都有直通默认实现，实现者只需覆盖关心的事件。
//!
//! ## 传播约定（What）
//! - 每个方法返回 [`Flow`]：`Continue` 交给下一个过滤器，`Stop` 截断后续过滤器与终端阶段；
//! - 返回 `Err` 等同于抛出异常，分发根会把它转入 `exception_caught`；
//! - `exception_caught` 自身不返回错误，只决定是否继续传播。

mod chain;
mod logging;

use std::{fmt, sync::Arc};

use bytes::Bytes;

use crate::{
    error::TransportError,
    session::{IdleStatus, Session},
};

pub use chain::{FilterChain, FilterEntity};
pub use logging::LoggingFilter;

/// 过滤器方法的传播决定。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub type FilterResult = Result<Flow, TransportError>;

/// 过滤器链分发的事件种类。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionCreated,
    SessionOpened,
    SessionIdle,
    SessionClosed,
    ExceptionCaught,
    DataReceived,
    SendData,
    PushData,
    DataNotSent,
    DataSent,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SessionCreated => "session_created",
            Self::SessionOpened => "session_opened",
            Self::SessionIdle => "session_idle",
            Self::SessionClosed => "session_closed",
            Self::ExceptionCaught => "exception_caught",
            Self::DataReceived => "data_received",
            Self::SendData => "send_data",
            Self::PushData => "push_data",
            Self::DataNotSent => "data_not_sent",
            Self::DataSent => "data_sent",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 事件拦截器。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 以能力 trait 表达“可选覆盖的宽接口”，默认方法即直通适配器，无需额外的 Adapter 类型；
/// - 入站（`data_received`）与出站（`send_data`）负载以 `&mut Bytes` 传入，过滤器可原地替换负载。
///
/// ## 契约 (What)
/// - `init` 在注册进链时调用，失败则注册被撤销；`destroy` 在移除或被替换时调用；
/// - 所有方法都在 reactor 线程或调用 `send` 的线程上同步执行，不应阻塞；
/// - 实现必须是 `Send + Sync`，同一实例可能被多个线程并发调用。
pub trait Filter: Send + Sync + 'static {
    fn init(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn destroy(&self) {}

    fn session_created(&self, _session: &Arc<Session>) -> FilterResult {
        Ok(Flow::Continue)
    }

    fn session_opened(&self, _session: &Arc<Session>) -> FilterResult {
        Ok(Flow::Continue)
    }

    fn session_idle(&self, _session: &Arc<Session>, _status: IdleStatus) -> FilterResult {
        Ok(Flow::Continue)
    }

    fn session_closed(&self, _session: &Arc<Session>) -> FilterResult {
        Ok(Flow::Continue)
    }

    fn exception_caught(&self, _session: &Arc<Session>, _cause: &TransportError) -> Flow {
        Flow::Continue
    }

    fn data_received(&self, _session: &Arc<Session>, _data: &mut Bytes) -> FilterResult {
        Ok(Flow::Continue)
    }

    fn send_data(&self, _session: &Arc<Session>, _data: &mut Bytes) -> FilterResult {
        Ok(Flow::Continue)
    }

    fn push_data(&self, _session: &Arc<Session>) -> FilterResult {
        Ok(Flow::Continue)
    }

    fn data_not_sent(&self, _session: &Arc<Session>, _data: &Bytes) -> FilterResult {
        Ok(Flow::Continue)
    }

    fn data_sent(&self, _session: &Arc<Session>, _data: &Bytes) -> FilterResult {
        Ok(Flow::Continue)
    }
}
