#![doc = r#"
# spark-reactor-core

## 设计动机（Why）
- **定位**：为基于选择器（selector）的阻塞式 reactor 提供与具体传输无关的核心构件，
  包括会话状态机、出站缓冲与冲刷协议、可热更新的过滤器链以及空闲检测调度器。
- **架构角色**：`spark-reactor-tcp` 与 `spark-reactor-udp` 只负责套接字与就绪事件的解复用，
  其余语义全部落在本 crate，确保两种传输对上层呈现一致的事件模型。
- **设计理念**：reactor 线程独占事件分发，空闲检测运行在独立线程；所有跨线程共享状态
  （会话表、出站队列、接收缓冲）都有明确的锁或无锁快照语义。

## 核心契约（What）
- [`Session`] 的生命周期严格遵循 `Created → Open → Closed`，`close` 幂等且只触发一次
  `session_closed`；
- [`FilterChain`] 以名称管理过滤器，变更操作互斥但不阻塞并发分发；
- [`Handler`] 仅由过滤器链的终端阶段调用，reactor 从不直接触达应用回调；
- 配置错误同步返回 [`TransportError`]，I/O 与应用错误一律转入 `exception_caught`。

## 实现策略（How）
- 过滤器链使用 `arc-swap` 发布不可变快照，分发期间无需持锁；
- 会话表基于 `dashmap`，遍历时先取快照再修改，避免在分片锁内回调用户代码；
- 选择器与唤醒器来自 `mio`，写兴趣的注册/撤销总是伴随一次唤醒。

## 风险与考量（Trade-offs）
- 事件回调在 reactor 线程同步执行，慢回调会拖慢同一 reactor 上的所有会话；
- 空闲检测在触发后重置时间戳，因此空闲事件按检测周期节流而非持续触发。
"#]

pub mod clock;
pub mod config;
pub mod error;
pub mod filter;
pub mod handler;
pub mod net;
pub mod reactor;
pub mod session;

pub use config::ReactorConfig;
pub use error::{OperationKind, TransportError, map_io_error};
pub use filter::{EventKind, Filter, FilterChain, FilterEntity, FilterResult, Flow, LoggingFilter};
pub use handler::Handler;
pub use reactor::{
    IdleScheduler, Lifecycle, LifecycleState, Reactor, ReactorCore, ReceiveBuffer, Selector,
    SessionTable, TableEntry, TokenAllocator, sweep_idle,
};
pub use session::{
    IdleStatus, Packet, Pushable, Session, SessionBuilder, SessionChannel, SessionKind,
    SessionState,
};
