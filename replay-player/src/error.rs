// 播放器错误类型

use common::LectureError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybackError {
    /// 直播流不支持定位
    #[error("Seek is not supported by stream playback")]
    SeekUnsupported,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Lecture(#[from] LectureError),
}

impl From<std::io::Error> for PlaybackError {
    fn from(error: std::io::Error) -> Self {
        PlaybackError::Lecture(LectureError::Io(error))
    }
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
