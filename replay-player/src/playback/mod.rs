// 回放调度
//
// # 核心组件
//
// - `FileActionPlayer`: 按页面组织的录像回放，支持按时间/按页定位
// - `StreamActionPlayer`: 直播动作流，只按到达顺序执行
// - `FrameTicker`: 按帧驱动播放器的定时任务
// - `PlaybackSession`: 录像回放会话（播放器 + 时钟 + 定时任务）

pub mod file_player;
pub mod session;
pub mod stream_player;
pub mod ticker;

pub use file_player::FileActionPlayer;
pub use session::PlaybackSession;
pub use stream_player::{wait_drained, ActionSink, StreamActionPlayer};
pub use ticker::FrameTicker;

use common::Executable;

use crate::error::Result;

/// 翻页通知
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageChange {
    pub page_number: i32,
    pub timestamp: i64,
}

/// 由帧定时任务驱动的动作播放器
pub trait ActionPlayer: Executable + Send {
    /// 执行所有到期的动作，返回本帧执行的数量
    fn tick(&mut self) -> common::Result<usize>;

    /// 定位到时间点，返回所在页码
    fn seek_by_time(&mut self, time_ms: i64) -> Result<i32>;

    /// 定位到页面，返回该页的翻页时间；未知页面返回-1
    fn seek_by_page(&mut self, page_number: i32) -> Result<i64>;

    /// 没有剩余动作
    fn is_finished(&self) -> bool;
}
