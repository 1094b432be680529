use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use arc_swap::ArcSwap;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::{
    error::{TransportError, panic_message},
    filter::{EventKind, Filter, Flow},
    handler::Handler,
    session::{IdleStatus, Session},
};

/// 过滤器链中的具名节点。
#[derive(Clone)]
pub struct FilterEntity {
    name: Arc<str>,
    filter: Arc<dyn Filter>,
}

impl FilterEntity {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filter(&self) -> &Arc<dyn Filter> {
        &self.filter
    }
}

impl fmt::Debug for FilterEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterEntity").field("name", &self.name).finish_non_exhaustive()
    }
}

/// 命名、有序、可热更新的过滤器链。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - reactor 线程持续分发事件的同时，管理线程可能增删过滤器；链必须保证二者互不阻塞，
///   且分发过程中看到的是一个完整一致的过滤器序列；
/// - 终端阶段固定：入站事件交给 [`Handler`]，出站 `send_data`/`push_data` 回到会话执行入队与冲刷。
///
/// ## 逻辑 (How)
/// - 过滤器序列存放在 `ArcSwap<Vec<FilterEntity>>` 中，分发时加载一份快照并用索引游标顺序推进；
/// - 变更操作持有 `mutation` 互斥锁，基于当前快照构造新序列后整体发布，旧快照由正在进行的分发自然释放；
/// - 每个分发入口（`exception_caught` 除外）以 `catch_unwind` 包裹，过滤器或处理器返回的错误与 panic
///   都会被转入 [`FilterChain::fire_exception_caught`]。
///
/// ## 契约 (What)
/// - 名称在单条链内唯一；重复添加、替换或删除未知名称返回 `InvalidArgument`；
/// - `Flow::Stop` 截断后续过滤器以及终端阶段；
/// - `init`/`destroy` 钩子在持有变更锁期间调用，钩子内部不得再修改同一条链。
///
/// ## 注意事项 (Trade-offs)
/// - 变更后才开始的分发才能看到新序列；已经在途的分发继续使用旧快照直至结束。
pub struct FilterChain {
    entries: ArcSwap<Vec<FilterEntity>>,
    mutation: Mutex<()>,
    handler: RwLock<Option<Arc<dyn Handler>>>,
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.names())
            .field("handler_bound", &self.handler.read().is_some())
            .finish()
    }
}

impl FilterChain {
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
            mutation: Mutex::new(()),
            handler: RwLock::new(None),
        }
    }

    /// 绑定终端处理器，替换之前绑定的处理器。
    pub fn set_handler(&self, handler: Arc<dyn Handler>) {
        *self.handler.write() = Some(handler);
    }

    pub fn handler(&self) -> Option<Arc<dyn Handler>> {
        self.handler.read().clone()
    }

    /// 在链首插入过滤器。
    pub fn add_first(&self, name: &str, filter: Arc<dyn Filter>) -> Result<(), TransportError> {
        self.insert(name, filter, true)
    }

    /// 在链尾（终端阶段之前）插入过滤器。
    pub fn add_last(&self, name: &str, filter: Arc<dyn Filter>) -> Result<(), TransportError> {
        self.insert(name, filter, false)
    }

    /// 原位替换同名过滤器：新过滤器 `init` 成功后发布，随后销毁旧过滤器。
    pub fn replace(&self, name: &str, filter: Arc<dyn Filter>) -> Result<(), TransportError> {
        let _guard = self.mutation.lock();
        let current = self.entries.load_full();
        let position = position_of(&current, name)?;
        filter.init()?;
        let mut next = current.to_vec();
        let outgoing = std::mem::replace(&mut next[position].filter, filter);
        self.entries.store(Arc::new(next));
        outgoing.destroy();
        debug!(filter = name, "filter replaced");
        Ok(())
    }

    /// 移除过滤器并调用其 `destroy`。
    pub fn remove(&self, name: &str) -> Result<(), TransportError> {
        let _guard = self.mutation.lock();
        let current = self.entries.load_full();
        let position = position_of(&current, name)?;
        let mut next = current.to_vec();
        let removed = next.remove(position);
        self.entries.store(Arc::new(next));
        removed.filter.destroy();
        debug!(filter = name, "filter removed");
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.load().iter().any(|entity| entity.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.entries
            .load()
            .iter()
            .find(|entity| entity.name() == name)
            .map(|entity| entity.filter.clone())
    }

    /// 当前快照中的过滤器名称，按分发顺序排列。
    pub fn names(&self) -> Vec<String> {
        self.entries
            .load()
            .iter()
            .map(|entity| entity.name().to_owned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }

    pub fn fire_session_created(&self, session: &Arc<Session>) {
        self.dispatch(
            session,
            EventKind::SessionCreated,
            (),
            |filter, session, _| filter.session_created(session),
            |chain, session, ()| chain.to_handler(|handler| handler.session_created(session)),
        );
    }

    pub fn fire_session_opened(&self, session: &Arc<Session>) {
        self.dispatch(
            session,
            EventKind::SessionOpened,
            (),
            |filter, session, _| filter.session_opened(session),
            |chain, session, ()| chain.to_handler(|handler| handler.session_opened(session)),
        );
    }

    pub fn fire_session_idle(&self, session: &Arc<Session>, status: IdleStatus) {
        self.dispatch(
            session,
            EventKind::SessionIdle,
            (),
            move |filter, session, _| filter.session_idle(session, status),
            move |chain, session, ()| {
                chain.to_handler(|handler| handler.session_idle(session, status))
            },
        );
    }

    pub fn fire_session_closed(&self, session: &Arc<Session>) {
        self.dispatch(
            session,
            EventKind::SessionClosed,
            (),
            |filter, session, _| filter.session_closed(session),
            |chain, session, ()| chain.to_handler(|handler| handler.session_closed(session)),
        );
    }

    pub fn fire_data_received(&self, session: &Arc<Session>, data: Bytes) {
        self.dispatch(
            session,
            EventKind::DataReceived,
            data,
            |filter, session, data| filter.data_received(session, data),
            |chain, session, data| chain.to_handler(|handler| handler.data_received(session, data)),
        );
    }

    /// 出站：过滤器可改写或拦截负载，终端阶段执行 [`Session::send_data`] 入队。
    pub fn fire_send_data(&self, session: &Arc<Session>, data: Bytes) {
        self.dispatch(
            session,
            EventKind::SendData,
            data,
            |filter, session, data| filter.send_data(session, data),
            |_, session, data| {
                session.send_data(data);
                Ok(())
            },
        );
    }

    /// 出站：终端阶段执行 [`Session::push_data`] 冲刷。
    pub fn fire_push_data(&self, session: &Arc<Session>) {
        self.dispatch(
            session,
            EventKind::PushData,
            (),
            |filter, session, _| filter.push_data(session),
            |_, session, ()| session.push_data(),
        );
    }

    pub fn fire_data_not_sent(&self, session: &Arc<Session>, data: Bytes) {
        self.dispatch(
            session,
            EventKind::DataNotSent,
            data,
            |filter, session, data| filter.data_not_sent(session, data),
            |chain, session, data| chain.to_handler(|handler| handler.data_not_sent(session, data)),
        );
    }

    pub fn fire_data_sent(&self, session: &Arc<Session>, data: Bytes) {
        self.dispatch(
            session,
            EventKind::DataSent,
            data,
            |filter, session, data| filter.data_sent(session, data),
            |chain, session, data| chain.to_handler(|handler| handler.data_sent(session, data)),
        );
    }

    /// 分发异常事件。
    ///
    /// 与其它入口不同，这里不捕获过滤器或处理器中的 panic，失败会沿调用路径继续展开。
    pub fn fire_exception_caught(&self, session: &Arc<Session>, cause: &TransportError) {
        let entries = self.entries.load_full();
        for entity in entries.iter() {
            if entity.filter.exception_caught(session, cause) == Flow::Stop {
                return;
            }
        }
        match self.handler() {
            Some(handler) => handler.exception_caught(session, cause),
            None => warn!(
                session = %session,
                code = cause.code(),
                error = %cause,
                "exception reached chain end without handler"
            ),
        }
    }

    fn insert(
        &self,
        name: &str,
        filter: Arc<dyn Filter>,
        front: bool,
    ) -> Result<(), TransportError> {
        let _guard = self.mutation.lock();
        let current = self.entries.load_full();
        if current.iter().any(|entity| entity.name() == name) {
            return Err(TransportError::invalid_argument(format!(
                "filter `{name}` is already registered"
            )));
        }
        filter.init()?;
        let entity = FilterEntity {
            name: Arc::from(name),
            filter,
        };
        let mut next = Vec::with_capacity(current.len() + 1);
        if front {
            next.push(entity);
            next.extend(current.iter().cloned());
        } else {
            next.extend(current.iter().cloned());
            next.push(entity);
        }
        self.entries.store(Arc::new(next));
        debug!(filter = name, front, "filter registered");
        Ok(())
    }

    fn to_handler<F>(&self, deliver: F) -> Result<(), TransportError>
    where
        F: FnOnce(&dyn Handler) -> Result<(), TransportError>,
    {
        match self.handler() {
            Some(handler) => deliver(handler.as_ref()),
            None => {
                trace!("event reached chain end without handler");
                Ok(())
            }
        }
    }

    fn dispatch<D, S, T>(
        &self,
        session: &Arc<Session>,
        event: EventKind,
        data: D,
        step: S,
        terminal: T,
    ) where
        S: Fn(&dyn Filter, &Arc<Session>, &mut D) -> Result<Flow, TransportError>,
        T: FnOnce(&Self, &Arc<Session>, D) -> Result<(), TransportError>,
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(
            move || -> Result<(), TransportError> {
                let entries = self.entries.load_full();
                let mut data = data;
                let mut cursor = 0;
                while let Some(entity) = entries.get(cursor) {
                    if step(entity.filter.as_ref(), session, &mut data)? == Flow::Stop {
                        return Ok(());
                    }
                    cursor += 1;
                }
                terminal(self, session, data)
            },
        ));
        let fault = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err,
            Err(payload) => TransportError::Panicked {
                context: event.as_str(),
                message: panic_message(payload.as_ref()),
            },
        };
        trace!(event = %event, code = fault.code(), "redirecting fault to exception_caught");
        self.fire_exception_caught(session, &fault);
    }
}

fn position_of(entries: &[FilterEntity], name: &str) -> Result<usize, TransportError> {
    entries
        .iter()
        .position(|entity| entity.name() == name)
        .ok_or_else(|| {
            TransportError::invalid_argument(format!("filter `{name}` is not registered"))
        })
}
