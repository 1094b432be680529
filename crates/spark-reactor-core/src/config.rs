//! # config 模块说明
//!
//! ## 角色定位（Why）
//! - 汇总 reactor 启动前必须确定的参数：监听/目标地址、选择器超时、收发缓冲、地址复用与空闲检测；
//! - 支持从 TOML 文本加载，便于部署侧以配置文件驱动而非硬编码。
//!
//! ## 契约（What）
//! - 缓冲大小与空闲检测周期必须为正数，否则返回 `InvalidArgument`；
//! - `select_timeout_ms = 0` 表示无限期阻塞直到有事件或被唤醒；
//! - 负数超时在类型层面不可表示。

use std::time::Duration;

use serde::Deserialize;

use crate::error::TransportError;

/// 默认收发缓冲大小（字节）。
pub const DEFAULT_BUFFER_SIZE: usize = 512;
/// 默认选择器等待超时（毫秒）。
pub const DEFAULT_SELECT_TIMEOUT_MS: u64 = 100;
/// 默认空闲检测周期（毫秒）。
pub const DEFAULT_IDLE_CHECK_PERIOD_MS: u64 = 500;

/// reactor 配置。
///
/// # 教案式说明
/// - **意图 (Why)**：为 acceptor/connector 提供统一参数载体，字段缺省时回落到与历史行为一致的默认值；
/// - **契约 (What)**：
///   - `send_buffer_size` 会在会话创建时复制到每个会话，决定单次冲刷的最大写出字节；
///   - `receive_buffer_size` 决定 reactor 共享接收缓冲的容量，即单次读取上限；
///   - `read_idle_ms`/`write_idle_ms` 为新会话的默认空闲阈值，0 表示禁用；
/// - **风险 (Trade-offs)**：UDP 下 `receive_buffer_size` 小于数据报长度时，超出部分会被内核截断丢弃。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ReactorConfig {
    pub host: String,
    pub port: u16,
    pub select_timeout_ms: u64,
    pub receive_buffer_size: usize,
    pub send_buffer_size: usize,
    pub reuse_address: bool,
    pub idle_check_period_ms: u64,
    pub read_idle_ms: u64,
    pub write_idle_ms: u64,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 0,
            select_timeout_ms: DEFAULT_SELECT_TIMEOUT_MS,
            receive_buffer_size: DEFAULT_BUFFER_SIZE,
            send_buffer_size: DEFAULT_BUFFER_SIZE,
            reuse_address: false,
            idle_check_period_ms: DEFAULT_IDLE_CHECK_PERIOD_MS,
            read_idle_ms: 0,
            write_idle_ms: 0,
        }
    }
}

impl ReactorConfig {
    /// 以默认参数构造指向 `host:port` 的配置。
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// 解析 TOML 文本并校验。
    pub fn from_toml_str(text: &str) -> Result<Self, TransportError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验数值约束。
    pub fn validate(&self) -> Result<(), TransportError> {
        validate_buffer_size("receive_buffer_size", self.receive_buffer_size)?;
        validate_buffer_size("send_buffer_size", self.send_buffer_size)?;
        if self.idle_check_period_ms == 0 {
            return Err(TransportError::invalid_argument("idle_check_period_ms must be positive"));
        }
        Ok(())
    }

    /// 选择器等待超时；`None` 表示无限期阻塞。
    pub fn select_timeout(&self) -> Option<Duration> {
        match self.select_timeout_ms {
            0 => None,
            millis => Some(Duration::from_millis(millis)),
        }
    }

    pub fn idle_check_period(&self) -> Duration {
        Duration::from_millis(self.idle_check_period_ms)
    }
}

pub(crate) fn validate_buffer_size(field: &'static str, size: usize) -> Result<(), TransportError> {
    if size == 0 {
        return Err(TransportError::invalid_argument(format!("{field} must be positive, got 0")));
    }
    Ok(())
}
