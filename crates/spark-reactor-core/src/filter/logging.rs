use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::{
    error::TransportError,
    filter::{Filter, FilterResult, Flow},
    session::{IdleStatus, Session},
};

/// 以 `debug` 级别记录每个事件的直通过滤器。
///
/// 通常以 `add_first("logging", ...)` 注册，观察进入链的原始事件；负载只记录长度。
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingFilter;

impl Filter for LoggingFilter {
    fn session_created(&self, session: &Arc<Session>) -> FilterResult {
        debug!(session = %session, "session created");
        Ok(Flow::Continue)
    }

    fn session_opened(&self, session: &Arc<Session>) -> FilterResult {
        debug!(session = %session, "session opened");
        Ok(Flow::Continue)
    }

    fn session_idle(&self, session: &Arc<Session>, status: IdleStatus) -> FilterResult {
        debug!(session = %session, %status, "session idle");
        Ok(Flow::Continue)
    }

    fn session_closed(&self, session: &Arc<Session>) -> FilterResult {
        debug!(session = %session, "session closed");
        Ok(Flow::Continue)
    }

    fn exception_caught(&self, session: &Arc<Session>, cause: &TransportError) -> Flow {
        debug!(session = %session, code = cause.code(), error = %cause, "exception caught");
        Flow::Continue
    }

    fn data_received(&self, session: &Arc<Session>, data: &mut Bytes) -> FilterResult {
        debug!(session = %session, len = data.len(), "data received");
        Ok(Flow::Continue)
    }

    fn send_data(&self, session: &Arc<Session>, data: &mut Bytes) -> FilterResult {
        debug!(session = %session, len = data.len(), "send data");
        Ok(Flow::Continue)
    }

    fn push_data(&self, session: &Arc<Session>) -> FilterResult {
        debug!(session = %session, pending = session.pending_packets(), "push data");
        Ok(Flow::Continue)
    }

    fn data_not_sent(&self, session: &Arc<Session>, data: &Bytes) -> FilterResult {
        debug!(session = %session, len = data.len(), "data not sent");
        Ok(Flow::Continue)
    }

    fn data_sent(&self, session: &Arc<Session>, data: &Bytes) -> FilterResult {
        debug!(session = %session, len = data.len(), "data sent");
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tracing_test::traced_test;

    use super::LoggingFilter;
    use crate::{
        filter::FilterChain,
        session::{IdleStatus, Session, SessionKind},
    };

    #[traced_test]
    #[test]
    fn logs_each_event_and_keeps_propagating() {
        let chain = Arc::new(FilterChain::new());
        chain
            .add_first("logging", Arc::new(LoggingFilter))
            .expect("注册日志过滤器");
        let session = Session::detached(SessionKind::Stream, chain.clone());

        chain.fire_session_created(&session);
        chain.fire_session_idle(&session, IdleStatus::ReadIdle);

        assert!(logs_contain("session created"));
        assert!(logs_contain("READ_IDLE"));
    }
}
