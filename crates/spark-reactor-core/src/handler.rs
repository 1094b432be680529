//! 应用侧事件终点。

use std::sync::Arc;

use bytes::Bytes;

use crate::{
    error::TransportError,
    session::{IdleStatus, Session},
};

/// 应用提供的事件处理器。
///
/// # 教案式说明
/// - **意图 (Why)**：过滤器链终端阶段把入站事件交付给应用；默认方法为空实现，
///   应用只需覆盖关心的回调；
/// - **契约 (What)**：
///   - 只会由过滤器链终端阶段调用，reactor 不会直接触达；
///   - 返回 `Err` 或发生 panic 时，错误会被转入同一会话的 `exception_caught`；
///   - `exception_caught` 没有返回值，其内部的 panic 不再被捕获；
/// - **风险 (Trade-offs)**：回调在 reactor 线程同步执行，阻塞会拖慢同一 reactor 上的所有会话。
pub trait Handler: Send + Sync + 'static {
    fn session_created(&self, _session: &Arc<Session>) -> Result<(), TransportError> {
        Ok(())
    }

    fn session_opened(&self, _session: &Arc<Session>) -> Result<(), TransportError> {
        Ok(())
    }

    fn session_idle(
        &self,
        _session: &Arc<Session>,
        _status: IdleStatus,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    fn session_closed(&self, _session: &Arc<Session>) -> Result<(), TransportError> {
        Ok(())
    }

    fn exception_caught(&self, _session: &Arc<Session>, _cause: &TransportError) {}

    fn data_received(&self, _session: &Arc<Session>, _data: Bytes) -> Result<(), TransportError> {
        Ok(())
    }

    fn data_not_sent(&self, _session: &Arc<Session>, _data: Bytes) -> Result<(), TransportError> {
        Ok(())
    }

    fn data_sent(&self, _session: &Arc<Session>, _data: Bytes) -> Result<(), TransportError> {
        Ok(())
    }
}
