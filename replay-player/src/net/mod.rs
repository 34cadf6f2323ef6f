// 直播媒体接收

pub mod action_receiver;
pub mod audio_receiver;
pub mod receiver;

pub use action_receiver::{ActionPacketHandler, ActionReceiver};
pub use audio_receiver::{AudioPacketHandler, AudioReceiver, AudioSink, ChannelAudioSink};
pub use receiver::{MediaReceiver, PacketHandler, ReceiverStats, SequenceTracker};
