#![doc = r#"
# spark-reactor-udp

## 设计动机（Why）
- **定位**：在 `spark-reactor-core` 之上提供基于 `mio` 的 UDP 接收端与连接器，
  以“对端地址 ↔ 会话”的映射让数据报沿用与 TCP 一致的会话事件模型；
- **架构角色**：只负责套接字、兴趣集合与数据报解复用，会话语义全部复用核心 crate。

## 核心契约（What）
- [`DatagramAcceptor`]：单个本地套接字，按来源地址创建会话，全部会话共享该套接字；
- [`DatagramConnector`]：连接单一目标，会话在 `open` 时立即打开；
- [`DatagramMultiConnector`]：每个目标独占一个已连接套接字，`open` 只登记目标、不阻塞；
- 每次读取得到的负载就是一个完整数据报，不做任何分帧。

## 实现策略（How）
- 共享套接字上的写兴趣由待冲刷会话集合驱动：集合由空变非空时打开，排空时撤销；
- 读就绪时循环接收直到 `WouldBlock`，与 `mio` 的边沿触发语义匹配。

## 风险与考量（Trade-offs）
- 单次写出受 `send_buffer_size` 约束，超出的负载会被拆成多个数据报发送；
- 接收缓冲容量小于数据报长度时，超出部分由操作系统截断丢弃。
"#]

mod acceptor;
mod connector;
pub mod error;
mod multi_connector;
mod reactor;
mod socket;
mod util;

pub use acceptor::DatagramAcceptor;
pub use connector::DatagramConnector;
pub use multi_connector::DatagramMultiConnector;
