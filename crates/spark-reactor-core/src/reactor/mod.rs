//! # reactor 模块说明
//!
//! ## 角色定位（Why）
//! - 收拢 acceptor/connector 共享的骨架：生命周期状态机、选择器封装、共享接收缓冲、会话表、
//!   空闲检测调度器以及阻塞式选择循环；
//! - 传输 crate 只需实现“就绪事件 → 会话事件”的解复用。
//!
//! ## 线程模型（What）
//! - 调用 `start`/`open`/`connect` 的线程即 reactor 线程，全部 I/O 与过滤器回调都在其上同步执行；
//! - 空闲检测在独立命名线程上运行，与 reactor 线程只通过会话表与会话原子字段交互。

mod base;
mod idle;
mod lifecycle;
mod receive_buffer;
mod selector;
mod table;

pub use base::{Reactor, ReactorCore};
pub use idle::{IdleScheduler, sweep_idle};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use receive_buffer::ReceiveBuffer;
pub use selector::{FIRST_CHANNEL_TOKEN, Selector, TokenAllocator, WAKE_TOKEN};
pub use table::{SessionTable, TableEntry};
