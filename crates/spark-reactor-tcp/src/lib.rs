#![doc = r#"
# spark-reactor-tcp

## 设计动机（Why）
- **定位**：在 `spark-reactor-core` 的会话与过滤器链之上，提供基于 `mio` 的 TCP 接收端与连接器；
- **架构角色**：只负责套接字、兴趣集合与就绪事件的解复用，会话语义（缓冲冲刷、空闲检测、
  事件分发）全部复用核心 crate；
- **设计理念**：每个 reactor 在调用线程上运行阻塞式选择循环，套接字全部非阻塞，
  跨线程的写兴趣修改通过 `mio::Waker` 立即生效。

## 核心契约（What）
- [`SocketAcceptor`]：监听 `host:port`，每条入站连接对应一个会话；
- [`SocketConnector`]：连接单一目标，连接结束时连接器随之关闭；
- [`SocketMultiConnector`]：同一选择器上管理多条出站连接，`open` 只登记目标、不阻塞；
- 生命周期一律为 `init → start/open/connect → stop/close`，停止后需重新 `init`。

## 实现策略（How）
- 监听套接字经 `socket2` 设置 `SO_REUSEADDR` 后交给 `mio`；
- `mio` 为边沿触发：读就绪循环读到 `WouldBlock`，接入循环 `accept` 到 `WouldBlock`，
  有界写出后仍有积压时重新注册写兴趣以获得下一次可写通知；
- 建连阶段只关注可写事件，完成后切换为可读，写兴趣只随第一个排队数据包出现。

## 风险与考量（Trade-offs）
- 所有回调在 reactor 线程同步执行，慢回调会拖慢同一 reactor 上的全部连接；
- 令牌单调递增且不回收，长期运行的 reactor 令牌空间按 `usize` 计足够使用。
"#]

mod acceptor;
mod channel;
mod connector;
pub mod error;
mod multi_connector;
mod stream;
mod util;

pub use acceptor::SocketAcceptor;
pub use connector::SocketConnector;
pub use multi_connector::SocketMultiConnector;
