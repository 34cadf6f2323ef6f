pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod net;
pub mod playback;

pub use clock::{AudioClock, ManualClock, SeekableClock, SyncClock, WallClock};
pub use error::{PlaybackError, Result};
pub use executor::{ActionExecutor, ExecuteAction, RecordingExecutor, TracingExecutor};
pub use playback::{ActionPlayer, FileActionPlayer, PageChange, PlaybackSession, StreamActionPlayer};
