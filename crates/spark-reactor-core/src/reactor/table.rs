use std::{fmt, hash::Hash, sync::Arc};

use dashmap::DashMap;

use crate::session::Session;

/// 会话表中的一项：会话本身与传输层附件（例如 TCP 会话对应的流通道）。
#[derive(Clone, Debug)]
pub struct TableEntry<A> {
    pub session: Arc<Session>,
    pub attachment: A,
}

/// reactor 会话表。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - reactor 线程（接入/读写）、空闲检测线程与建连代码会并发读写同一张表；
///   使用 `DashMap` 让查找无需全局锁，插入/删除只锁单个分片。
///
/// ## 契约 (What)
/// - **快照语义**：所有遍历型操作（`snapshot`、`prune_closed`、`close_all`）先在分片锁内复制条目，
///   释放锁之后才关闭会话或删除条目；因此遍历期间发生的插入可能不被本轮看到，但绝不会在持锁时回调用户代码；
/// - **按身份删除**：`remove_if_same` 只删除仍指向同一会话的条目，避免误删同键下新建的会话；
/// - 键的含义由传输决定：TCP 为通道令牌，UDP 接收端为对端地址。
///
/// ## 注意事项 (Trade-offs)
/// - 快照需要克隆 `Arc`，会话数量很大时遍历成本与条目数线性相关。
pub struct SessionTable<K, A = ()>
where
    K: Eq + Hash,
{
    map: DashMap<K, TableEntry<A>>,
}

impl<K, A> Default for SessionTable<K, A>
where
    K: Eq + Hash + Clone,
    A: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, A> fmt::Debug for SessionTable<K, A>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTable").field("len", &self.map.len()).finish()
    }
}

impl<K, A> SessionTable<K, A>
where
    K: Eq + Hash + Clone,
    A: Clone,
{
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    /// 登记会话，返回同键下被替换的旧条目。
    pub fn insert(&self, key: K, session: Arc<Session>, attachment: A) -> Option<TableEntry<A>> {
        self.map.insert(
            key,
            TableEntry {
                session,
                attachment,
            },
        )
    }

    pub fn get(&self, key: &K) -> Option<TableEntry<A>> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    pub fn session(&self, key: &K) -> Option<Arc<Session>> {
        self.map.get(key).map(|entry| entry.session.clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn remove(&self, key: &K) -> Option<TableEntry<A>> {
        self.map.remove(key).map(|(_, entry)| entry)
    }

    /// 仅当键仍映射到 `session` 时删除。
    pub fn remove_if_same(&self, key: &K, session: &Arc<Session>) -> bool {
        self.map
            .remove_if(key, |_, entry| Arc::ptr_eq(&entry.session, session))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// 复制当前全部条目。
    pub fn snapshot(&self) -> Vec<(K, TableEntry<A>)> {
        self.map
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.map.iter().map(|entry| entry.session.clone()).collect()
    }

    /// 删除已关闭会话的条目，返回删除数量。
    pub fn prune_closed(&self) -> usize {
        self.snapshot()
            .into_iter()
            .filter(|(key, entry)| {
                entry.session.is_closed() && self.remove_if_same(key, &entry.session)
            })
            .count()
    }

    /// 关闭所有仍打开的会话并清空表，返回本次关闭的会话数量。
    pub fn close_all(&self) -> usize {
        let mut closed = 0;
        for (key, entry) in self.snapshot() {
            if !entry.session.is_closed() {
                entry.session.close();
                closed += 1;
            }
            self.remove_if_same(&key, &entry.session);
        }
        closed
    }

    pub fn clear(&self) {
        self.map.clear();
    }
}
