// 录像文件回放调度器
//
// 每一页的动作在加载时放入工作队列：先是翻页动作（页面时间戳），
// 然后是该页的回放动作。每帧执行所有时间戳不晚于时钟的动作，
// 队列空了就加载下一页。静态动作在页面加载时由静态执行器一次性应用。

use std::collections::VecDeque;
use std::sync::Arc;

use common::{
    Action, Executable, ExecutableState, ExecutionError, Lifecycle, RecordedPage,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::{ActionPlayer, PageChange};
use crate::clock::SyncClock;
use crate::error::Result;
use crate::executor::{ActionExecutor, ExecuteAction};

const PAGE_CHANNEL_CAPACITY: usize = 32;

pub struct FileActionPlayer {
    lifecycle: Lifecycle,
    pages: Vec<RecordedPage>,
    clock: Arc<dyn SyncClock>,
    /// 支持定位模式的执行器
    executor: Box<dyn ActionExecutor>,
    /// 应用静态动作的执行器
    static_executor: Box<dyn ActionExecutor>,
    /// 页码 → 翻页时间，保持录像顺序
    page_index: Vec<(i32, i64)>,
    queue: VecDeque<Action>,
    /// 当前页在`pages`中的位置
    current: usize,
    page_events: broadcast::Sender<PageChange>,
}

impl FileActionPlayer {
    pub fn new(
        pages: Vec<RecordedPage>,
        clock: Arc<dyn SyncClock>,
        executor: Box<dyn ActionExecutor>,
        static_executor: Box<dyn ActionExecutor>,
    ) -> Self {
        let (page_events, _) = broadcast::channel(PAGE_CHANNEL_CAPACITY);
        Self {
            lifecycle: Lifecycle::new("FileActionPlayer"),
            pages,
            clock,
            executor,
            static_executor,
            page_index: Vec::new(),
            queue: VecDeque::new(),
            current: 0,
            page_events,
        }
    }

    pub fn pages(&self) -> &[RecordedPage] {
        &self.pages
    }

    /// 当前页码
    pub fn current_page(&self) -> Option<i32> {
        self.pages.get(self.current).map(|page| page.page_number)
    }

    /// 工作队列中剩余的动作数
    pub fn pending_actions(&self) -> usize {
        self.queue.len()
    }

    pub fn page_index(&self) -> &[(i32, i64)] {
        &self.page_index
    }

    /// 订阅翻页通知
    pub fn subscribe_pages(&self) -> broadcast::Receiver<PageChange> {
        self.page_events.subscribe()
    }

    fn position_of(&self, page_number: i32) -> Option<usize> {
        self.pages
            .iter()
            .position(|page| page.page_number == page_number)
    }

    /// 找到翻页时间不晚于`time_ms`的最后一页，时间完全相同时取第一个匹配
    fn time_table_page(&self, time_ms: i64) -> i32 {
        let mut page = self
            .page_index
            .first()
            .map(|(page_number, _)| *page_number)
            .unwrap_or(0);

        for (page_number, timestamp) in &self.page_index {
            if time_ms == *timestamp {
                page = *page_number;
                break;
            } else if time_ms < *timestamp {
                break;
            }
            page = *page_number;
        }
        page
    }

    fn notify_page(&self) {
        if let Some(page) = self.pages.get(self.current) {
            // 没有订阅者时忽略
            let _ = self.page_events.send(PageChange {
                page_number: page.page_number,
                timestamp: page.timestamp,
            });
        }
    }

    /// 加载页面：应用静态动作并重建工作队列
    fn load_page(&mut self, position: usize) {
        let page = &self.pages[position];

        if !page.static_actions.is_empty() {
            if let Err(e) = self.static_executor.set_page_number(page.page_number) {
                warn!("Select page {} for static actions failed: {}", page.page_number, e);
            }
            for action in &page.static_actions {
                if let Err(e) = action.execute(self.static_executor.as_mut()) {
                    warn!("Static action {:?} failed: {}", action.action_type(), e);
                }
            }
        }

        self.queue.clear();
        self.queue
            .push_back(Action::page_change(page.timestamp, page.page_number));
        self.queue.extend(page.playback_actions.iter().cloned());
        // 稳定排序，同一时间戳保持录像顺序
        self.queue
            .make_contiguous()
            .sort_by_key(|action| action.timestamp);

        self.current = position;
        debug!(
            "Loaded page {} with {} actions",
            page.page_number,
            self.queue.len()
        );
    }

    fn reset_page(&mut self, position: usize) {
        let page_number = self.pages[position].page_number;
        if let Err(e) = self.executor.reset_page(page_number) {
            warn!("Reset page {} failed: {}", page_number, e);
        }
    }

    /// 定位模式下执行所有不晚于`time_ms`的动作，单个失败只记录
    fn execute_until(&mut self, time_ms: i64) {
        while let Some(action) = self.queue.front() {
            if action.timestamp > time_ms {
                break;
            }
            if let Err(e) = action.execute(self.executor.as_mut()) {
                warn!(
                    "Seek: action {:?} at {}ms failed: {}",
                    action.action_type(),
                    action.timestamp,
                    e
                );
            }
            self.queue.pop_front();
        }
    }

    /// 定位到页面位置和时间
    ///
    /// 向后（或同页）定位时重置目标页到当前页之间的所有页面；
    /// 向前定位时依次重放中间页面，保证结果与顺序播放一致。
    fn seek(&mut self, target: usize, time_ms: i64) {
        self.executor.set_seek(true);

        let current = self.current.min(self.pages.len().saturating_sub(1));
        if target > current {
            for position in current..target {
                self.reset_page(position);
                self.load_page(position);
                self.execute_until(time_ms);
            }
            self.reset_page(target);
        } else {
            for position in target..=current {
                self.reset_page(position);
            }
        }

        self.load_page(target);
        self.execute_until(time_ms);

        self.executor.set_seek(false);
        self.notify_page();

        debug!(
            "Seeked to page {} at {}ms, {} actions pending",
            self.pages[target].page_number,
            time_ms,
            self.queue.len()
        );
    }

    fn seek_to_time(&mut self, time_ms: i64) -> i32 {
        if self.page_index.is_empty() {
            warn!("Seek by time ignored, no pages loaded");
            return 0;
        }

        let page_number = self.time_table_page(time_ms);
        if let Some(position) = self.position_of(page_number) {
            self.seek(position, time_ms);
        }
        page_number
    }

    fn seek_to_page(&mut self, page_number: i32) -> i64 {
        let Some(timestamp) = self
            .page_index
            .iter()
            .find(|(number, _)| *number == page_number)
            .map(|(_, timestamp)| *timestamp)
        else {
            return -1;
        };

        if let Some(position) = self.position_of(page_number) {
            self.seek(position, timestamp);
        }
        timestamp
    }

    fn reset(&mut self) {
        if self.pages.is_empty() {
            return;
        }
        self.executor.set_seek(true);
        for position in 0..=self.current.min(self.pages.len() - 1) {
            self.reset_page(position);
        }
        self.executor.set_seek(false);
    }

    fn is_playing(&self) -> bool {
        matches!(
            self.lifecycle.state(),
            ExecutableState::Starting | ExecutableState::Started
        )
    }
}

impl ActionPlayer for FileActionPlayer {
    fn tick(&mut self) -> common::Result<usize> {
        let mut executed = 0;

        while self.is_playing() {
            let time = self.clock.audio_time_ms();

            match self.queue.front() {
                Some(action) => {
                    if time < action.timestamp {
                        break;
                    }
                    action.execute(self.executor.as_mut())?;
                    debug!(
                        "Executed {:?} at {}ms (clock {}ms)",
                        action.action_type(),
                        action.timestamp,
                        time
                    );
                    self.queue.pop_front();
                    executed += 1;
                }
                None if self.current + 1 < self.pages.len() => {
                    self.load_page(self.current + 1);
                    self.notify_page();
                }
                None => break,
            }
        }

        Ok(executed)
    }

    fn seek_by_time(&mut self, time_ms: i64) -> Result<i32> {
        Ok(self.seek_to_time(time_ms))
    }

    fn seek_by_page(&mut self, page_number: i32) -> Result<i64> {
        Ok(self.seek_to_page(page_number))
    }

    fn is_finished(&self) -> bool {
        self.queue.is_empty() && self.current + 1 >= self.pages.len()
    }
}

impl Executable for FileActionPlayer {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn init_internal(&mut self) -> common::Result<()> {
        self.current = 0;
        self.queue.clear();
        self.page_index = self
            .pages
            .iter()
            .map(|page| (page.page_number, page.timestamp))
            .collect();

        if let Some(first) = self.pages.first().map(|page| page.page_number) {
            self.reset_page(0);
            self.load_page(0);
            self.executor.set_page_number(first)?;
            self.notify_page();
        }

        info!(
            "✓ File action player initialized: {} pages",
            self.pages.len()
        );
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
        self.reset();
        if let Some(first) = self.pages.first().map(|page| page.page_number) {
            self.seek_to_page(first);
        }
        Ok(())
    }

    fn suspend_internal(&mut self) -> common::Result<()> {
        debug!("File action player suspended at page {:?}", self.current_page());
        Ok(())
    }

    fn destroy_internal(&mut self) -> common::Result<()> {
        self.queue.clear();
        self.page_index.clear();
        Ok(())
    }
}
