//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为 reactor、会话与过滤器链提供统一错误域，使配置错误、I/O 错误与应用错误
//!   能够沿不同路径交付（同步返回 vs. 转入 `exception_caught`）；
//! - 每个变体携带稳定错误码，便于日志检索与告警聚合。
//!
//! ## 设计要求（What）
//! - 所有错误实现 `thiserror::Error`，满足 `Send + Sync + 'static`；
//! - I/O 错误附带 [`OperationKind`]，由各传输 crate 定义自己的操作常量。
//!
//! ## 扩展建议（How）
//! - 新增传输实现时，在其 `error` 模块声明 `OperationKind` 常量并复用 [`map_io_error`]。

use std::{borrow::Cow, error::Error as StdError, fmt, io};

use thiserror::Error;

/// 描述一次失败的底层操作。
///
/// - **意图 (Why)**：把“哪一步失败”与“为什么失败”分离，错误码只依赖前者，保证稳定；
/// - **契约 (What)**：`code` 形如 `spark.reactor.tcp.accept`，`message` 为人类可读描述。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

/// 等待选择器就绪事件。
pub const POLL: OperationKind = OperationKind {
    code: "spark.reactor.poll",
    message: "selector poll",
};

/// 打开选择器或唤醒器。
pub const SELECTOR_OPEN: OperationKind = OperationKind {
    code: "spark.reactor.selector_open",
    message: "open selector",
};

/// 修改通道在选择器上的兴趣集合。
pub const REGISTER: OperationKind = OperationKind {
    code: "spark.reactor.register",
    message: "register interest",
};

/// 唤醒阻塞中的选择器。
pub const WAKE: OperationKind = OperationKind {
    code: "spark.reactor.wake",
    message: "wake selector",
};

/// 解析 `host:port`。
pub const RESOLVE: OperationKind = OperationKind {
    code: "spark.reactor.resolve",
    message: "resolve address",
};

/// 向网络写出会话数据。
pub const WRITE: OperationKind = OperationKind {
    code: "spark.reactor.write",
    message: "write session data",
};

/// 关闭会话持有的底层通道。
pub const CLOSE: OperationKind = OperationKind {
    code: "spark.reactor.close",
    message: "close channel",
};

/// 启动空闲检测线程。
pub const SPAWN: OperationKind = OperationKind {
    code: "spark.reactor.spawn",
    message: "spawn idle scheduler",
};

/// reactor 引擎错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：聚合配置、I/O、应用回调三类失败，配合过滤器链的错误重定向语义，
///   让“同步返回”和“异步通知”两条路径共享同一类型；
/// - **契约 (What)**：
///   - `InvalidArgument`/`IllegalState` 只会同步返回给调用方，不进入过滤器链；
///   - `Io`/`Network` 表示会话级 I/O 失败，由 reactor 转入 `exception_caught` 后关闭会话；
///   - `Application`/`Panicked` 来自过滤器或处理器，由分发根捕获；
/// - **设计权衡 (Trade-offs)**：上下文使用 `String`，以少量分配换取可读性。
#[derive(Debug, Error)]
pub enum TransportError {
    /// 参数非法，例如缓冲大小为 0、过滤器名称重复或不存在。
    #[error("invalid argument: {detail}")]
    InvalidArgument { detail: Cow<'static, str> },

    /// 当前状态不允许该操作，例如会话未打开、reactor 已激活或未初始化。
    #[error("illegal state: {detail}")]
    IllegalState { detail: Cow<'static, str> },

    /// 底层 I/O 失败。
    #[error("{op} failed: {source}")]
    Io {
        op: OperationKind,
        #[source]
        source: io::Error,
    },

    /// 写出结果无效（零字节写出等），视作网络故障。
    #[error("network error, send data failed: {detail}")]
    Network { detail: Cow<'static, str> },

    /// 过滤器或处理器返回的应用错误。
    #[error("application failure: {source}")]
    Application {
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// 过滤器、处理器或 reactor 事件处理过程中发生 panic。
    #[error("panicked during {context}: {message}")]
    Panicked {
        context: &'static str,
        message: String,
    },

    /// 配置文本无法解析。
    #[error("invalid configuration: {source}")]
    Config {
        #[from]
        source: toml::de::Error,
    },
}

impl TransportError {
    /// 构造 `InvalidArgument`。
    pub fn invalid_argument(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidArgument {
            detail: detail.into(),
        }
    }

    /// 构造 `IllegalState`。
    pub fn illegal_state(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::IllegalState {
            detail: detail.into(),
        }
    }

    /// 构造 `Network`。
    pub fn network(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::Network {
            detail: detail.into(),
        }
    }

    /// 包装应用层错误，供 `Handler`/`Filter` 实现直接 `?` 之外的场景使用。
    pub fn application<E>(source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Application {
            source: Box::new(source),
        }
    }

    /// 返回稳定错误码。
    ///
    /// - **契约 (What)**：同一类失败的错误码跨版本保持不变；`Io` 变体沿用操作常量的错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "spark.reactor.invalid_argument",
            Self::IllegalState { .. } => "spark.reactor.illegal_state",
            Self::Io { op, .. } => op.code,
            Self::Network { .. } => "spark.reactor.network",
            Self::Application { .. } => "spark.reactor.application",
            Self::Panicked { .. } => "spark.reactor.panicked",
            Self::Config { .. } => "spark.reactor.config",
        }
    }

    /// 若为 I/O 错误，返回其 `io::ErrorKind`。
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

/// 将 `std::io::Error` 映射为带操作上下文的 [`TransportError`]。
pub fn map_io_error(op: OperationKind, source: io::Error) -> TransportError {
    TransportError::Io { op, source }
}

/// 从 panic 负载中提取可读信息。
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
