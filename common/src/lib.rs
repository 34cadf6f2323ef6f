pub mod codec;
pub mod cursor;
pub mod error;
pub mod lifecycle;
pub mod protocol;
pub mod rtp;
pub mod types;

pub use cursor::BinaryCursor;
pub use error::*;
pub use lifecycle::{Executable, ExecutableState, Lifecycle, LifecyclePhase, StateChange};
pub use protocol::*;
pub use rtp::{RtpPacket, RtpSequencer, PAYLOAD_TYPE_ACTION, PAYLOAD_TYPE_AUDIO};
pub use types::*;
