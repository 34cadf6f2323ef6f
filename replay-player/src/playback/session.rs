// 录像回放会话
//
// 组合文件播放器、时钟与帧定时任务，对外提供播放控制。

use std::sync::Arc;
use std::time::Duration;

use common::{Executable, ExecutableState, RecordedPage};
use tokio::sync::Mutex;
use tracing::info;

use super::{ActionPlayer, FileActionPlayer, FrameTicker};
use crate::clock::{SeekableClock, SyncClock};
use crate::error::Result;
use crate::executor::ActionExecutor;

pub struct PlaybackSession<C: SeekableClock + 'static> {
    player: Arc<Mutex<FileActionPlayer>>,
    clock: Arc<C>,
    ticker: Option<FrameTicker>,
    frame_interval: Duration,
}

impl<C: SeekableClock + 'static> PlaybackSession<C> {
    pub fn new(
        pages: Vec<RecordedPage>,
        clock: Arc<C>,
        executor: Box<dyn ActionExecutor>,
        static_executor: Box<dyn ActionExecutor>,
        frame_interval: Duration,
    ) -> Self {
        let sync_clock: Arc<dyn SyncClock> = clock.clone();
        let player = FileActionPlayer::new(pages, sync_clock, executor, static_executor);
        Self {
            player: Arc::new(Mutex::new(player)),
            clock,
            ticker: None,
            frame_interval,
        }
    }

    pub fn player(&self) -> Arc<Mutex<FileActionPlayer>> {
        self.player.clone()
    }

    pub fn clock(&self) -> &Arc<C> {
        &self.clock
    }

    pub async fn state(&self) -> ExecutableState {
        self.player.lock().await.state()
    }

    /// 开始或继续播放
    pub async fn start(&mut self) -> Result<()> {
        self.clock.resume();
        if let Err(e) = self.player.lock().await.start() {
            self.clock.pause();
            return Err(e.into());
        }

        if self.ticker.is_none() {
            self.ticker = Some(FrameTicker::spawn(self.player.clone(), self.frame_interval));
        }
        info!("▶ Playback started at {}ms", self.clock.audio_time_ms());
        Ok(())
    }

    /// 暂停：停止定时任务，内容保持不变
    pub async fn pause(&mut self) -> Result<()> {
        self.cancel_ticker().await;
        self.player.lock().await.suspend()?;
        self.clock.pause();
        info!("⏸ Playback paused at {}ms", self.clock.audio_time_ms());
        Ok(())
    }

    /// 停止并回到第一页
    pub async fn stop(&mut self) -> Result<()> {
        self.cancel_ticker().await;

        let mut player = self.player.lock().await;
        player.stop()?;
        let first_timestamp = player
            .page_index()
            .first()
            .map(|(_, timestamp)| *timestamp)
            .unwrap_or(0);
        drop(player);

        self.clock.pause();
        self.clock.resync(first_timestamp);
        info!("⏹ Playback stopped");
        Ok(())
    }

    /// 定位到时间点并同步时钟，返回所在页码
    pub async fn seek_by_time(&mut self, time_ms: i64) -> Result<i32> {
        let page_number = self.player.lock().await.seek_by_time(time_ms)?;
        self.clock.resync(time_ms);
        info!("⏩ Seeked to {}ms (page {})", time_ms, page_number);
        Ok(page_number)
    }

    /// 定位到页面并把时钟同步到翻页时间；未知页面返回-1且不做改变
    pub async fn seek_by_page(&mut self, page_number: i32) -> Result<i64> {
        let timestamp = self.player.lock().await.seek_by_page(page_number)?;
        if timestamp >= 0 {
            self.clock.resync(timestamp);
            info!("⏩ Seeked to page {} ({}ms)", page_number, timestamp);
        }
        Ok(timestamp)
    }

    /// 等待所有动作执行完毕
    pub async fn wait_finished(&self) {
        loop {
            if self.player.lock().await.is_finished() {
                return;
            }
            tokio::time::sleep(self.frame_interval).await;
        }
    }

    async fn cancel_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.shutdown().await;
        }
    }
}
