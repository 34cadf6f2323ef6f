// 帧定时任务
//
// 以固定帧间隔调用播放器的 tick()，通过取消令牌显式停止。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ActionPlayer;

/// 默认帧间隔（60Hz）
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

pub struct FrameTicker {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl FrameTicker {
    /// 在当前tokio运行时上启动定时任务
    pub fn spawn<P>(player: Arc<Mutex<P>>, frame_interval: Duration) -> Self
    where
        P: ActionPlayer + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(frame_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Frame ticker cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        let mut player = player.lock().await;
                        // 失败的动作留在队首，下一帧重试
                        if let Err(e) = player.tick() {
                            warn!("Frame tick failed: {}", e);
                        }
                    }
                }
            }
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 取消并等待任务退出
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Frame ticker task failed: {}", e);
            }
        }
    }
}

impl Drop for FrameTicker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::executor::RecordingExecutor;
    use crate::playback::StreamActionPlayer;
    use common::{Action, ActionKind, Executable};

    #[tokio::test]
    async fn test_ticker_drives_player_until_cancelled() {
        let clock = ManualClock::new(0);
        let calls = RecordingExecutor::new();
        let mut player = StreamActionPlayer::new(Arc::new(clock.clone()), Box::new(calls.clone()));
        player.start().unwrap();
        let sink = player.sink();
        let player = Arc::new(Mutex::new(player));

        let ticker = FrameTicker::spawn(player.clone(), Duration::from_millis(5));
        sink.push(Action::new(10, ActionKind::Undo));
        clock.set(20);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.calls().len(), 1);

        ticker.shutdown().await;
        sink.push(Action::new(30, ActionKind::Redo));
        clock.set(40);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(calls.calls().len(), 1);
        assert_eq!(player.lock().await.pending_actions(), 0);
    }
}
