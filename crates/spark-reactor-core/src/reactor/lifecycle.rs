use std::fmt;

use parking_lot::Mutex;

use crate::error::TransportError;

/// reactor 实例的生命周期状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// 尚未调用 `init`。
    Uninitialized,
    /// 资源已分配，可以启动。
    Initialized,
    /// 选择循环正在运行（或正在启动）。
    Active,
    /// 已停止，资源已释放；再次使用前必须重新 `init`。
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Active => "active",
            Self::Stopped => "stopped",
        })
    }
}

/// 带守卫转换的生命周期状态机。
///
/// # 教案式说明
/// - **意图 (Why)**：以显式状态替代“active 布尔值 + 零散锁”，所有转换在同一把锁内完成检查与写入；
/// - **契约 (What)**：
///   - `begin_init`：`Active` 时返回 `IllegalState`，其余状态均可重新初始化；
///   - `activate`：只允许 `Initialized → Active`，并在转换前执行额外前置检查（例如处理器已绑定）；
///   - `deactivate`：`Active → Stopped`，返回此前是否处于激活态，保证停止逻辑只执行一次；
///   - `abort`：启动失败时回退到 `Stopped`。
#[derive(Debug)]
pub struct Lifecycle {
    owner: &'static str,
    state: Mutex<LifecycleState>,
}

impl Lifecycle {
    pub fn new(owner: &'static str) -> Self {
        Self {
            owner,
            state: Mutex::new(LifecycleState::Uninitialized),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Active
    }

    /// 执行初始化动作，成功后进入 `Initialized`。
    ///
    /// 初始化动作可能关闭旧会话并触发回调，因此在锁外执行，结束后再复核状态。
    pub fn begin_init<F>(&self, init: F) -> Result<(), TransportError>
    where
        F: FnOnce() -> Result<(), TransportError>,
    {
        self.ensure_inactive()?;
        init()?;
        let mut state = self.state.lock();
        if *state == LifecycleState::Active {
            return Err(self.active_error());
        }
        *state = LifecycleState::Initialized;
        Ok(())
    }

    fn ensure_inactive(&self) -> Result<(), TransportError> {
        if self.is_active() {
            return Err(self.active_error());
        }
        Ok(())
    }

    fn active_error(&self) -> TransportError {
        TransportError::illegal_state(format!(
            "{} is active, stop it before calling init()",
            self.owner
        ))
    }

    /// `Initialized → Active`，`precondition` 在状态检查通过后、转换之前执行。
    pub fn activate<F>(&self, precondition: F) -> Result<(), TransportError>
    where
        F: FnOnce() -> Result<(), TransportError>,
    {
        let mut state = self.state.lock();
        match *state {
            LifecycleState::Active => Err(TransportError::illegal_state(format!(
                "{} is already active",
                self.owner
            ))),
            LifecycleState::Uninitialized | LifecycleState::Stopped => {
                Err(TransportError::illegal_state(format!(
                    "{} has not been initialized, call init() first",
                    self.owner
                )))
            }
            LifecycleState::Initialized => {
                precondition()?;
                *state = LifecycleState::Active;
                Ok(())
            }
        }
    }

    /// 要求处于 `Initialized` 或 `Active`，用于多目标连接器在循环启动前后登记目标。
    pub fn ensure_ready(&self) -> Result<(), TransportError> {
        match self.state() {
            LifecycleState::Initialized | LifecycleState::Active => Ok(()),
            other => Err(TransportError::illegal_state(format!(
                "{} is {other}, call init() first",
                self.owner
            ))),
        }
    }

    /// `Active → Stopped`；返回此前是否处于激活态。
    pub fn deactivate(&self) -> bool {
        let mut state = self.state.lock();
        if *state == LifecycleState::Active {
            *state = LifecycleState::Stopped;
            true
        } else {
            false
        }
    }

    /// 启动失败回退。
    pub fn abort(&self) {
        *self.state.lock() = LifecycleState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_requires_init() {
        let lifecycle = Lifecycle::new("test-reactor");
        let err = lifecycle.activate(|| Ok(())).expect_err("未初始化不可启动");
        assert_eq!(err.code(), "spark.reactor.illegal_state");

        lifecycle.begin_init(|| Ok(())).expect("初始化");
        lifecycle.activate(|| Ok(())).expect("启动");
        assert!(lifecycle.activate(|| Ok(())).is_err(), "重复启动必须失败");
        assert!(
            lifecycle.begin_init(|| Ok(())).is_err(),
            "激活态不可重新初始化"
        );
    }

    #[test]
    fn failed_precondition_keeps_state() {
        let lifecycle = Lifecycle::new("test-reactor");
        lifecycle.begin_init(|| Ok(())).expect("初始化");
        let err = lifecycle
            .activate(|| Err(TransportError::illegal_state("no handler")))
            .expect_err("前置检查失败");
        assert_eq!(err.code(), "spark.reactor.illegal_state");
        assert_eq!(lifecycle.state(), LifecycleState::Initialized);
    }

    #[test]
    fn stopped_requires_reinit() {
        let lifecycle = Lifecycle::new("test-reactor");
        lifecycle.begin_init(|| Ok(())).expect("初始化");
        lifecycle.activate(|| Ok(())).expect("启动");
        assert!(lifecycle.deactivate());
        assert!(!lifecycle.deactivate(), "停止只生效一次");
        assert!(lifecycle.activate(|| Ok(())).is_err());
        lifecycle.begin_init(|| Ok(())).expect("重新初始化");
        assert_eq!(lifecycle.state(), LifecycleState::Initialized);
    }
}
