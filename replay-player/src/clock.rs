// 同步时钟
//
// 播放器只通过 SyncClock 读取时间；音频位置是唯一的时间基准。

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// 播放器读取的时间源（毫秒）
pub trait SyncClock: Send + Sync {
    fn audio_time_ms(&self) -> i64;
}

/// 可被播放会话重新同步的时钟
pub trait SeekableClock: SyncClock {
    fn resync(&self, time_ms: i64);

    fn pause(&self);

    fn resume(&self);
}

/// 由音频输出写入播放位置的时钟
#[derive(Debug, Clone, Default)]
pub struct AudioClock {
    position_ms: Arc<AtomicI64>,
}

impl AudioClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 音频输出回调中更新位置
    pub fn set_time_ms(&self, time_ms: i64) {
        self.position_ms.store(time_ms, Ordering::Release);
    }
}

impl SyncClock for AudioClock {
    fn audio_time_ms(&self) -> i64 {
        self.position_ms.load(Ordering::Acquire)
    }
}

impl SeekableClock for AudioClock {
    fn resync(&self, time_ms: i64) {
        self.set_time_ms(time_ms);
    }

    // 暂停与恢复由音频输出自身负责
    fn pause(&self) {}

    fn resume(&self) {}
}

#[derive(Debug)]
struct WallState {
    /// 运行中时的起点，暂停时为None
    anchor: Option<Instant>,
    offset_ms: i64,
}

/// 单调时钟，没有音频输出时代替音频位置
#[derive(Debug)]
pub struct WallClock {
    state: Mutex<WallState>,
    speed: f64,
}

impl WallClock {
    /// 创建处于暂停状态、位置为0的时钟
    pub fn new(speed: f64) -> Self {
        Self {
            state: Mutex::new(WallState {
                anchor: None,
                offset_ms: 0,
            }),
            speed: if speed > 0.0 { speed } else { 1.0 },
        }
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn is_running(&self) -> bool {
        self.lock().anchor.is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WallState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn elapsed_ms(&self, state: &WallState) -> i64 {
        match state.anchor {
            Some(anchor) => (anchor.elapsed().as_secs_f64() * 1000.0 * self.speed) as i64,
            None => 0,
        }
    }
}

impl SyncClock for WallClock {
    fn audio_time_ms(&self) -> i64 {
        let state = self.lock();
        state.offset_ms + self.elapsed_ms(&state)
    }
}

impl SeekableClock for WallClock {
    fn resync(&self, time_ms: i64) {
        let mut state = self.lock();
        state.offset_ms = time_ms;
        if state.anchor.is_some() {
            state.anchor = Some(Instant::now());
        }
    }

    fn pause(&self) {
        let mut state = self.lock();
        let elapsed = self.elapsed_ms(&state);
        state.offset_ms += elapsed;
        state.anchor = None;
    }

    fn resume(&self) {
        let mut state = self.lock();
        if state.anchor.is_none() {
            state.anchor = Some(Instant::now());
        }
    }
}

/// 手动推进的时钟，测试使用
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    time_ms: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(time_ms: i64) -> Self {
        Self {
            time_ms: Arc::new(AtomicI64::new(time_ms)),
        }
    }

    pub fn set(&self, time_ms: i64) {
        self.time_ms.store(time_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.time_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl SyncClock for ManualClock {
    fn audio_time_ms(&self) -> i64 {
        self.time_ms.load(Ordering::SeqCst)
    }
}

impl SeekableClock for ManualClock {
    fn resync(&self, time_ms: i64) {
        self.set(time_ms);
    }

    fn pause(&self) {}

    fn resume(&self) {}
}
