// 直播动作流调度器
//
// 动作由网络接收器通过 ActionSink 送入，按到达顺序排队；
// 每帧先取出所有新到达的动作，再执行所有到期的动作。不支持定位。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use common::{Action, Executable, ExecutableState, ExecutionError, Lifecycle};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::ActionPlayer;
use crate::clock::SyncClock;
use crate::error::{PlaybackError, Result};
use crate::executor::{ActionExecutor, ExecuteAction};

/// 向直播播放器投递动作的句柄
#[derive(Debug, Clone)]
pub struct ActionSink {
    tx: mpsc::UnboundedSender<Action>,
}

impl ActionSink {
    /// 投递动作，播放器已释放时返回false
    pub fn push(&self, action: Action) -> bool {
        self.tx.send(action).is_ok()
    }
}

pub struct StreamActionPlayer {
    lifecycle: Lifecycle,
    clock: Arc<dyn SyncClock>,
    executor: Box<dyn ActionExecutor>,
    queue: VecDeque<Action>,
    sink_tx: mpsc::UnboundedSender<Action>,
    sink_rx: mpsc::UnboundedReceiver<Action>,
}

impl StreamActionPlayer {
    pub fn new(clock: Arc<dyn SyncClock>, executor: Box<dyn ActionExecutor>) -> Self {
        let (sink_tx, sink_rx) = mpsc::unbounded_channel();
        Self {
            lifecycle: Lifecycle::new("StreamActionPlayer"),
            clock,
            executor,
            queue: VecDeque::new(),
            sink_tx,
            sink_rx,
        }
    }

    pub fn sink(&self) -> ActionSink {
        ActionSink {
            tx: self.sink_tx.clone(),
        }
    }

    /// 直接追加动作
    pub fn add_action(&mut self, action: Action) {
        self.queue.push_back(action);
    }

    pub fn pending_actions(&self) -> usize {
        self.queue.len()
    }

    /// 把接收器投递的动作移入工作队列
    fn drain_sink(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(action) = self.sink_rx.try_recv() {
            self.queue.push_back(action);
            drained += 1;
        }
        drained
    }

    fn discard_all(&mut self) {
        while self.sink_rx.try_recv().is_ok() {}
        self.queue.clear();
    }

    fn is_playing(&self) -> bool {
        matches!(
            self.lifecycle.state(),
            ExecutableState::Starting | ExecutableState::Started
        )
    }
}

/// 输入流结束后等待已排队的动作执行完
///
/// 执行由帧定时任务完成，这里只观察队列。时钟在`idle`内没有前进时放弃，
/// 返回仍未执行的动作数。
pub async fn wait_drained(
    player: &Arc<Mutex<StreamActionPlayer>>,
    frame_interval: Duration,
    idle: Duration,
) -> usize {
    let mut last_time = None;
    let mut idle_since = Instant::now();
    loop {
        let (pending, time) = {
            let mut player = player.lock().await;
            player.drain_sink();
            (player.pending_actions(), player.clock.audio_time_ms())
        };
        if pending == 0 {
            return 0;
        }

        if last_time != Some(time) {
            last_time = Some(time);
            idle_since = Instant::now();
        } else if idle_since.elapsed() >= idle {
            return pending;
        }
        tokio::time::sleep(frame_interval).await;
    }
}

impl ActionPlayer for StreamActionPlayer {
    fn tick(&mut self) -> common::Result<usize> {
        self.drain_sink();

        let mut executed = 0;
        while self.is_playing() {
            let time = self.clock.audio_time_ms();
            let Some(action) = self.queue.front() else {
                break;
            };
            if time < action.timestamp {
                break;
            }
            action.execute(self.executor.as_mut())?;
            debug!(
                "Executed live {:?} at {}ms (clock {}ms)",
                action.action_type(),
                action.timestamp,
                time
            );
            self.queue.pop_front();
            executed += 1;
        }
        Ok(executed)
    }

    fn seek_by_time(&mut self, _time_ms: i64) -> Result<i32> {
        Err(PlaybackError::SeekUnsupported)
    }

    fn seek_by_page(&mut self, _page_number: i32) -> Result<i64> {
        Err(PlaybackError::SeekUnsupported)
    }

    /// 直播流没有终点
    fn is_finished(&self) -> bool {
        false
    }
}

impl Executable for StreamActionPlayer {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn init_internal(&mut self) -> common::Result<()> {
        self.discard_all();
        info!("✓ Stream action player initialized");
        Ok(())
    }

    fn start_internal(&mut self) -> common::Result<()> {
        if let Err(e) = self.tick() {
            error!("Execute action failed: {}", e);
            return Err(ExecutionError::ExecuteActionFailed.into());
        }
        Ok(())
    }

    fn stop_internal(&mut self) -> common::Result<()> {
        self.discard_all();
        Ok(())
    }

    fn destroy_internal(&mut self) -> common::Result<()> {
        self.discard_all();
        Ok(())
    }
}
