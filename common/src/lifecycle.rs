// 生命周期状态机
//
// 所有长生命周期组件（播放器、接收器）都组合一个Lifecycle，
// 并通过实现Executable获得统一的 init/start/stop/suspend/destroy 流程。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{LectureError, Result, StateError};

/// 状态变化通知通道容量
const STATE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutableState {
    Created,
    Initializing,
    Initialized,
    Starting,
    Started,
    Stopping,
    Stopped,
    Suspending,
    Suspended,
    Destroying,
    Destroyed,
    Error,
}

impl ExecutableState {
    /// 状态转换表
    pub fn can_transition_to(self, next: ExecutableState) -> bool {
        use ExecutableState::*;

        let allowed: &[ExecutableState] = match self {
            Created => &[Initializing, Destroying],
            Initializing => &[Initialized, Error],
            Initialized => &[Starting, Destroying],
            Starting => &[Started, Error],
            Started => &[Suspending, Stopping, Destroying, Error],
            Stopping => &[Stopped, Error],
            Stopped => &[Starting, Destroying],
            Suspending => &[Suspended, Error],
            Suspended => &[Starting, Stopping, Destroying],
            Destroying => &[Destroyed, Error],
            Destroyed => &[Initializing],
            // 允许从上一次失败中恢复
            Error => &[Starting, Stopping, Destroying],
        };
        allowed.contains(&next)
    }
}

impl fmt::Display for ExecutableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 生命周期阶段，用于错误信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Init,
    Start,
    Stop,
    Suspend,
    Destroy,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            LifecyclePhase::Init => "initialize",
            LifecyclePhase::Start => "start",
            LifecyclePhase::Stop => "stop",
            LifecyclePhase::Suspend => "suspend",
            LifecyclePhase::Destroy => "destroy",
        };
        write!(f, "{}", verb)
    }
}

/// 状态变化事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub previous: ExecutableState,
    pub current: ExecutableState,
}

#[derive(Debug)]
struct States {
    current: ExecutableState,
    previous: ExecutableState,
}

#[derive(Debug)]
struct Shared {
    name: String,
    states: Mutex<States>,
    events: broadcast::Sender<StateChange>,
}

/// 线程安全的状态持有者，克隆后共享同一状态
#[derive(Debug, Clone)]
pub struct Lifecycle {
    shared: Arc<Shared>,
}

impl Lifecycle {
    pub fn new(name: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                states: Mutex::new(States {
                    current: ExecutableState::Created,
                    previous: ExecutableState::Created,
                }),
                events,
            }),
        }
    }

    /// 组件名称
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> ExecutableState {
        self.lock().current
    }

    pub fn previous_state(&self) -> ExecutableState {
        self.lock().previous
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.shared.events.subscribe()
    }

    /// 按转换表切换状态并广播
    pub fn set_state(&self, next: ExecutableState) -> std::result::Result<(), StateError> {
        let change = {
            let mut states = self.lock();
            if !states.current.can_transition_to(next) {
                return Err(StateError::InvalidTransition {
                    component: self.shared.name.clone(),
                    from: states.current,
                    to: next,
                });
            }
            states.previous = states.current;
            states.current = next;
            StateChange {
                previous: states.previous,
                current: states.current,
            }
        };

        debug!(
            "Setting state for [{}]: [{}]→[{}]",
            self.shared.name, change.previous, change.current
        );
        // 没有订阅者时发送失败是正常的
        let _ = self.shared.events.send(change);
        Ok(())
    }

    /// 进入Error状态，已处于Error时不做任何事
    pub fn fail(&self) {
        if self.state() == ExecutableState::Error {
            return;
        }
        if let Err(e) = self.set_state(ExecutableState::Error) {
            warn!("{}", e);
        }
    }

    pub fn is_started(&self) -> bool {
        self.state() == ExecutableState::Started
    }

    fn lock(&self) -> MutexGuard<'_, States> {
        self.shared
            .states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 可执行组件
///
/// 实现者提供各阶段的钩子，`init/start/stop/suspend/destroy`负责状态切换：
/// 先进入中间状态，执行钩子，成功后进入终态；钩子失败时进入Error并包装错误。
pub trait Executable {
    fn lifecycle(&self) -> &Lifecycle;

    fn init_internal(&mut self) -> Result<()>;

    fn start_internal(&mut self) -> Result<()>;

    fn stop_internal(&mut self) -> Result<()>;

    fn suspend_internal(&mut self) -> Result<()> {
        Ok(())
    }

    fn destroy_internal(&mut self) -> Result<()>;

    fn init(&mut self) -> Result<()> {
        run_phase(
            self,
            LifecyclePhase::Init,
            ExecutableState::Initializing,
            ExecutableState::Initialized,
            Self::init_internal,
        )
    }

    /// 处于Created或Destroyed时先初始化
    fn start(&mut self) -> Result<()> {
        if matches!(
            self.state(),
            ExecutableState::Created | ExecutableState::Destroyed
        ) {
            self.init()?;
        }
        run_phase(
            self,
            LifecyclePhase::Start,
            ExecutableState::Starting,
            ExecutableState::Started,
            Self::start_internal,
        )
    }

    fn stop(&mut self) -> Result<()> {
        run_phase(
            self,
            LifecyclePhase::Stop,
            ExecutableState::Stopping,
            ExecutableState::Stopped,
            Self::stop_internal,
        )
    }

    fn suspend(&mut self) -> Result<()> {
        run_phase(
            self,
            LifecyclePhase::Suspend,
            ExecutableState::Suspending,
            ExecutableState::Suspended,
            Self::suspend_internal,
        )
    }

    /// 处于Started或Suspended时先停止
    fn destroy(&mut self) -> Result<()> {
        if matches!(
            self.state(),
            ExecutableState::Started | ExecutableState::Suspended
        ) {
            self.stop()?;
        }
        run_phase(
            self,
            LifecyclePhase::Destroy,
            ExecutableState::Destroying,
            ExecutableState::Destroyed,
            Self::destroy_internal,
        )
    }

    fn state(&self) -> ExecutableState {
        self.lifecycle().state()
    }

    fn previous_state(&self) -> ExecutableState {
        self.lifecycle().previous_state()
    }

    fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.lifecycle().subscribe()
    }
}

fn run_phase<E>(
    executable: &mut E,
    phase: LifecyclePhase,
    intermediate: ExecutableState,
    terminal: ExecutableState,
    hook: fn(&mut E) -> Result<()>,
) -> Result<()>
where
    E: Executable + ?Sized,
{
    executable.lifecycle().set_state(intermediate)?;

    if let Err(source) = hook(executable) {
        let lifecycle = executable.lifecycle();
        lifecycle.fail();
        return Err(LectureError::Lifecycle {
            phase,
            component: lifecycle.name().to_string(),
            source: Box::new(source),
        });
    }

    // 钩子内部可能已把状态推进到终态或Error
    let current = executable.lifecycle().state();
    if current != terminal {
        executable.lifecycle().set_state(terminal)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutionError;

    struct Component {
        lifecycle: Lifecycle,
        calls: Vec<&'static str>,
        fail_start: bool,
    }

    impl Component {
        fn new() -> Self {
            Self {
                lifecycle: Lifecycle::new("component"),
                calls: Vec::new(),
                fail_start: false,
            }
        }
    }

    impl Executable for Component {
        fn lifecycle(&self) -> &Lifecycle {
            &self.lifecycle
        }

        fn init_internal(&mut self) -> Result<()> {
            self.calls.push("init");
            Ok(())
        }

        fn start_internal(&mut self) -> Result<()> {
            self.calls.push("start");
            if self.fail_start {
                return Err(ExecutionError::ExecuteActionFailed.into());
            }
            Ok(())
        }

        fn stop_internal(&mut self) -> Result<()> {
            self.calls.push("stop");
            Ok(())
        }

        fn destroy_internal(&mut self) -> Result<()> {
            self.calls.push("destroy");
            Ok(())
        }
    }

    #[test]
    fn test_start_initializes_first() {
        let mut component = Component::new();
        component.start().unwrap();
        assert_eq!(component.calls, vec!["init", "start"]);
        assert_eq!(component.state(), ExecutableState::Started);
        assert_eq!(component.previous_state(), ExecutableState::Starting);
    }

    #[test]
    fn test_double_start_fails() {
        let mut component = Component::new();
        component.start().unwrap();
        let err = component.start().unwrap_err();
        assert!(err.is_state_error());
        assert!(err.to_string().contains("[Started]→[Starting]"));
        assert_eq!(component.state(), ExecutableState::Started);
    }

    #[test]
    fn test_start_after_destroy_reinitializes() {
        let mut component = Component::new();
        component.start().unwrap();
        component.destroy().unwrap();
        assert_eq!(component.state(), ExecutableState::Destroyed);
        component.start().unwrap();
        assert_eq!(
            component.calls,
            vec!["init", "start", "stop", "destroy", "init", "start"]
        );
    }

    #[test]
    fn test_hook_failure_enters_error() {
        let mut component = Component::new();
        component.fail_start = true;
        let err = component.start().unwrap_err();
        assert_eq!(component.state(), ExecutableState::Error);
        assert!(matches!(
            err,
            LectureError::Lifecycle {
                phase: LifecyclePhase::Start,
                ..
            }
        ));
        assert!(matches!(err.root_cause(), LectureError::Execution(_)));

        // 从Error可以恢复
        component.fail_start = false;
        component.start().unwrap();
        assert_eq!(component.state(), ExecutableState::Started);
    }

    #[test]
    fn test_suspend_then_resume() {
        let mut component = Component::new();
        component.start().unwrap();
        component.suspend().unwrap();
        assert_eq!(component.state(), ExecutableState::Suspended);
        component.start().unwrap();
        assert_eq!(component.state(), ExecutableState::Started);
    }

    #[test]
    fn test_invalid_transition_names_states() {
        let lifecycle = Lifecycle::new("player");
        let err = lifecycle.set_state(ExecutableState::Started).unwrap_err();
        assert_eq!(
            err,
            StateError::InvalidTransition {
                component: "player".to_string(),
                from: ExecutableState::Created,
                to: ExecutableState::Started,
            }
        );
    }

    #[tokio::test]
    async fn test_state_changes_are_broadcast() {
        let mut component = Component::new();
        let mut events = component.subscribe();
        component.init().unwrap();

        let first = events.recv().await.unwrap();
        assert_eq!(
            first,
            StateChange {
                previous: ExecutableState::Created,
                current: ExecutableState::Initializing
            }
        );
        let second = events.recv().await.unwrap();
        assert_eq!(second.current, ExecutableState::Initialized);
    }
}
