use crate::lifecycle::{ExecutableState, LifecyclePhase};
use thiserror::Error;

/// 录像文件格式错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Recording too short: {0} bytes, header needs 48")]
    TooShort(usize),

    #[error("Bad recording magic: {0}")]
    BadMagic(i32),

    #[error("Truncated {block}: declared {declared} bytes, {available} available")]
    Truncated {
        block: &'static str,
        declared: usize,
        available: usize,
    },

    #[error("Negative length in {block}: {length}")]
    NegativeLength { block: &'static str, length: i32 },
}

/// 动作解码错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unknown key event type: {0}")]
    UnknownKeyEvent(i8),

    #[error("Read of {requested} bytes at offset {offset} exceeds buffer length {length}")]
    OutOfBounds {
        offset: usize,
        requested: usize,
        length: usize,
    },
}

/// 传输层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Unsupported stream transport: {0}")]
    UnsupportedTransport(String),

    #[error("RTP packet too short: {0} bytes")]
    PacketTooShort(usize),

    #[error("Stream media type mismatch: expected {expected}, got {actual}")]
    MediaTypeMismatch { expected: String, actual: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Socket closed abnormally with code {0}")]
    AbnormalClose(u16),

    #[error("No async runtime available to drive the socket")]
    NoRuntime,
}

/// 生命周期状态转换错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Invalid state transition for component [{component}]: [{from:?}]→[{to:?}]")]
    InvalidTransition {
        component: String,
        from: ExecutableState,
        to: ExecutableState,
    },
}

/// 动作执行错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Execute action failed")]
    ExecuteActionFailed,

    #[error("Executor rejected {action}: {reason}")]
    Rejected { action: String, reason: String },
}

/// 统一错误类型
#[derive(Error, Debug)]
pub enum LectureError {
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Failed to {phase} component [{component}]: {source}")]
    Lifecycle {
        phase: LifecyclePhase,
        component: String,
        #[source]
        source: Box<LectureError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LectureError {
    /// 剥离生命周期包装，返回最内层的错误
    pub fn root_cause(&self) -> &LectureError {
        match self {
            LectureError::Lifecycle { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_state_error(&self) -> bool {
        matches!(self.root_cause(), LectureError::State(_))
    }
}

pub type Result<T> = std::result::Result<T, LectureError>;
