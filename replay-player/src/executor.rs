// 动作执行器
//
// 播放器不关心渲染，只把解码后的动作交给 ActionExecutor。
// Action 的分派集中在 ExecuteAction::execute 的一次 match 中。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use common::{Action, ActionKind, ActionType, ExecutionError, KeyEvent, PenPoint};
use tracing::debug;

pub type ExecResult = std::result::Result<(), ExecutionError>;

/// 把动作效果应用到演示模型上的协作者
pub trait ActionExecutor: Send {
    fn set_key_event(&mut self, key_event: Option<&KeyEvent>) -> ExecResult;

    fn set_page_number(&mut self, page_number: i32) -> ExecResult;

    /// 选择工具（笔、形状、文本等）
    fn select_tool(&mut self, kind: &ActionKind) -> ExecResult;

    /// 选择并立即执行的工具（撤销、清空、文本编辑等）
    fn select_and_execute_tool(&mut self, kind: &ActionKind) -> ExecResult;

    fn begin_tool(&mut self, point: &PenPoint) -> ExecResult;

    fn execute_tool(&mut self, point: &PenPoint) -> ExecResult;

    fn end_tool(&mut self, point: &PenPoint) -> ExecResult;

    /// 定位模式下执行器应抑制增量渲染
    fn set_seek(&mut self, _seek: bool) {}

    /// 清空页面内容并恢复默认视图
    fn reset_page(&mut self, _page_number: i32) -> ExecResult {
        Ok(())
    }
}

/// 对执行器应用动作
pub trait ExecuteAction {
    fn execute(&self, executor: &mut dyn ActionExecutor) -> ExecResult;
}

impl ExecuteAction for Action {
    fn execute(&self, executor: &mut dyn ActionExecutor) -> ExecResult {
        executor.set_key_event(self.key_event.as_ref())?;

        match &self.kind {
            ActionKind::ToolBegin(point) => executor.begin_tool(point),
            ActionKind::ToolExecute(point) => executor.execute_tool(point),
            ActionKind::ToolEnd(point) => executor.end_tool(point),

            ActionKind::Pen(_)
            | ActionKind::Highlighter(_)
            | ActionKind::Pointer(_)
            | ActionKind::Arrow(_)
            | ActionKind::Line(_)
            | ActionKind::Rectangle(_)
            | ActionKind::Ellipse(_)
            | ActionKind::Latex { .. }
            | ActionKind::Text { .. }
            | ActionKind::Clone
            | ActionKind::Select
            | ActionKind::SelectGroup
            | ActionKind::Rubber
            | ActionKind::Zoom
            | ActionKind::Panning => executor.select_tool(&self.kind),

            ActionKind::Undo
            | ActionKind::Redo
            | ActionKind::ClearShapes
            | ActionKind::ZoomOut
            | ActionKind::ExtendView(_)
            | ActionKind::LatexFontChange { .. }
            | ActionKind::TextChange { .. }
            | ActionKind::TextFontChange { .. }
            | ActionKind::TextMove { .. }
            | ActionKind::TextRemove { .. }
            | ActionKind::TextHighlight { .. } => executor.select_and_execute_tool(&self.kind),

            ActionKind::Page { page_number } => executor.set_page_number(*page_number),

            ActionKind::Key | ActionKind::Screen => Ok(()),
        }
    }
}

/// 执行统计
#[derive(Debug, Default)]
pub struct ExecutorStats {
    pub tool_selections: AtomicU64,
    pub tool_executions: AtomicU64,
    pub pen_points: AtomicU64,
    pub page_changes: AtomicU64,
}

impl ExecutorStats {
    pub fn total(&self) -> u64 {
        self.tool_selections.load(Ordering::Relaxed)
            + self.tool_executions.load(Ordering::Relaxed)
            + self.pen_points.load(Ordering::Relaxed)
            + self.page_changes.load(Ordering::Relaxed)
    }
}

/// 只记日志的执行器，命令行播放使用
#[derive(Debug, Clone)]
pub struct TracingExecutor {
    label: &'static str,
    seek: bool,
    stats: Arc<ExecutorStats>,
}

impl TracingExecutor {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            seek: false,
            stats: Arc::new(ExecutorStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ExecutorStats> {
        self.stats.clone()
    }
}

impl ActionExecutor for TracingExecutor {
    fn set_key_event(&mut self, key_event: Option<&KeyEvent>) -> ExecResult {
        if let Some(event) = key_event {
            debug!("[{}] key event {:?}", self.label, event);
        }
        Ok(())
    }

    fn set_page_number(&mut self, page_number: i32) -> ExecResult {
        self.stats.page_changes.fetch_add(1, Ordering::Relaxed);
        debug!("[{}] page {}", self.label, page_number);
        Ok(())
    }

    fn select_tool(&mut self, kind: &ActionKind) -> ExecResult {
        self.stats.tool_selections.fetch_add(1, Ordering::Relaxed);
        debug!("[{}] select tool {:?}", self.label, kind.action_type());
        Ok(())
    }

    fn select_and_execute_tool(&mut self, kind: &ActionKind) -> ExecResult {
        self.stats.tool_executions.fetch_add(1, Ordering::Relaxed);
        debug!(
            "[{}] select and execute {:?} (seek={})",
            self.label,
            kind.action_type(),
            self.seek
        );
        Ok(())
    }

    fn begin_tool(&mut self, point: &PenPoint) -> ExecResult {
        self.stats.pen_points.fetch_add(1, Ordering::Relaxed);
        debug!("[{}] begin ({:.1}, {:.1})", self.label, point.x, point.y);
        Ok(())
    }

    fn execute_tool(&mut self, _point: &PenPoint) -> ExecResult {
        self.stats.pen_points.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn end_tool(&mut self, point: &PenPoint) -> ExecResult {
        self.stats.pen_points.fetch_add(1, Ordering::Relaxed);
        debug!("[{}] end ({:.1}, {:.1})", self.label, point.x, point.y);
        Ok(())
    }

    fn set_seek(&mut self, seek: bool) {
        self.seek = seek;
    }

    fn reset_page(&mut self, page_number: i32) -> ExecResult {
        debug!("[{}] reset page {}", self.label, page_number);
        Ok(())
    }
}

/// 执行器调用记录
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorCall {
    KeyEvent(KeyEvent),
    PageNumber(i32),
    SelectTool(ActionType),
    SelectAndExecuteTool(ActionType),
    BeginTool(PenPoint),
    ExecuteTool(PenPoint),
    EndTool(PenPoint),
    Seek(bool),
    ResetPage(i32),
}

impl ExecutorCall {
    /// 是否是定位/重置类的簿记调用
    pub fn is_bookkeeping(&self) -> bool {
        matches!(self, ExecutorCall::Seek(_) | ExecutorCall::ResetPage(_))
    }
}

#[derive(Debug, Default)]
struct RecorderState {
    calls: Vec<ExecutorCall>,
    /// 按类型注入的失败次数
    failures: HashMap<ActionType, usize>,
}

/// 记录所有调用的执行器，克隆后共享同一份记录
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    state: Arc<Mutex<RecorderState>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让指定类型的动作失败`times`次
    pub fn fail_on(&self, action_type: ActionType, times: usize) {
        self.lock().failures.insert(action_type, times);
    }

    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.lock().calls.clone()
    }

    /// 去掉定位与重置调用后的记录
    pub fn effective_calls(&self) -> Vec<ExecutorCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| !call.is_bookkeeping())
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecorderState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: ExecutorCall) {
        self.lock().calls.push(call);
    }

    fn check(&self, action_type: ActionType) -> ExecResult {
        let mut state = self.lock();
        if let Some(remaining) = state.failures.get_mut(&action_type) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ExecutionError::Rejected {
                    action: format!("{:?}", action_type),
                    reason: "injected failure".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl ActionExecutor for RecordingExecutor {
    fn set_key_event(&mut self, key_event: Option<&KeyEvent>) -> ExecResult {
        if let Some(event) = key_event {
            self.record(ExecutorCall::KeyEvent(*event));
        }
        Ok(())
    }

    fn set_page_number(&mut self, page_number: i32) -> ExecResult {
        self.check(ActionType::Page)?;
        self.record(ExecutorCall::PageNumber(page_number));
        Ok(())
    }

    fn select_tool(&mut self, kind: &ActionKind) -> ExecResult {
        self.check(kind.action_type())?;
        self.record(ExecutorCall::SelectTool(kind.action_type()));
        Ok(())
    }

    fn select_and_execute_tool(&mut self, kind: &ActionKind) -> ExecResult {
        self.check(kind.action_type())?;
        self.record(ExecutorCall::SelectAndExecuteTool(kind.action_type()));
        Ok(())
    }

    fn begin_tool(&mut self, point: &PenPoint) -> ExecResult {
        self.check(ActionType::ToolBegin)?;
        self.record(ExecutorCall::BeginTool(*point));
        Ok(())
    }

    fn execute_tool(&mut self, point: &PenPoint) -> ExecResult {
        self.check(ActionType::ToolExecute)?;
        self.record(ExecutorCall::ExecuteTool(*point));
        Ok(())
    }

    fn end_tool(&mut self, point: &PenPoint) -> ExecResult {
        self.check(ActionType::ToolEnd)?;
        self.record(ExecutorCall::EndTool(*point));
        Ok(())
    }

    fn set_seek(&mut self, seek: bool) {
        self.record(ExecutorCall::Seek(seek));
    }

    fn reset_page(&mut self, page_number: i32) -> ExecResult {
        self.record(ExecutorCall::ResetPage(page_number));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Brush, Color, KeyEventKind, Rect};

    fn brush() -> Brush {
        Brush {
            color: Color::from_rgba(0x0000FFFF),
            width: 3.0,
            line_cap: 0,
        }
    }

    #[test]
    fn test_dispatch_per_kind() {
        let point = PenPoint {
            x: 1.0,
            y: 1.0,
            pressure: 1.0,
        };
        let actions = vec![
            Action::new(0, ActionKind::Pen(brush())),
            Action::new(1, ActionKind::ToolBegin(point)),
            Action::new(2, ActionKind::ToolExecute(point)),
            Action::new(3, ActionKind::ToolEnd(point)),
            Action::new(4, ActionKind::Undo),
            Action::new(
                5,
                ActionKind::ExtendView(Rect {
                    x: 0.0,
                    y: 0.0,
                    width: 0.5,
                    height: 0.5,
                }),
            ),
            Action::page_change(6, 2),
            Action::new(7, ActionKind::Screen),
        ];

        let recorder = RecordingExecutor::new();
        let mut executor = recorder.clone();
        for action in &actions {
            action.execute(&mut executor).unwrap();
        }

        assert_eq!(
            recorder.calls(),
            vec![
                ExecutorCall::SelectTool(ActionType::Pen),
                ExecutorCall::BeginTool(point),
                ExecutorCall::ExecuteTool(point),
                ExecutorCall::EndTool(point),
                ExecutorCall::SelectAndExecuteTool(ActionType::Undo),
                ExecutorCall::SelectAndExecuteTool(ActionType::ExtendView),
                ExecutorCall::PageNumber(2),
            ]
        );
    }

    #[test]
    fn test_key_event_forwarded_before_effect() {
        let event = KeyEvent {
            kind: KeyEventKind::KeyDown,
            key_code: 90,
            shift: false,
            ctrl: true,
            alt: false,
        };
        let recorder = RecordingExecutor::new();
        let mut executor = recorder.clone();
        Action::new(0, ActionKind::Undo)
            .with_key_event(event)
            .execute(&mut executor)
            .unwrap();

        assert_eq!(
            recorder.calls(),
            vec![
                ExecutorCall::KeyEvent(event),
                ExecutorCall::SelectAndExecuteTool(ActionType::Undo),
            ]
        );
    }

    #[test]
    fn test_injected_failure_is_consumed() {
        let recorder = RecordingExecutor::new();
        recorder.fail_on(ActionType::Redo, 1);
        let mut executor = recorder.clone();
        let action = Action::new(0, ActionKind::Redo);

        assert!(action.execute(&mut executor).is_err());
        assert!(action.execute(&mut executor).is_ok());
        assert_eq!(recorder.calls().len(), 1);
    }

    #[test]
    fn test_tracing_executor_counts() {
        let mut executor = TracingExecutor::new("test");
        let stats = executor.stats();
        Action::new(0, ActionKind::Pen(brush()))
            .execute(&mut executor)
            .unwrap();
        Action::page_change(1, 1).execute(&mut executor).unwrap();
        assert_eq!(stats.tool_selections.load(Ordering::Relaxed), 1);
        assert_eq!(stats.page_changes.load(Ordering::Relaxed), 1);
        assert_eq!(stats.total(), 2);
    }
}
