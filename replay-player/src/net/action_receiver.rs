// 动作流接收

use async_trait::async_trait;
use common::codec::decode_action_payload;
use common::{MediaType, RtpPacket, TransportError};
use tracing::{debug, warn};

use super::receiver::{MediaReceiver, PacketHandler};
use crate::playback::ActionSink;

/// 动作流接收器
pub type ActionReceiver = MediaReceiver<ActionPacketHandler>;

/// 把RTP负载解码为动作并送入直播播放器
pub struct ActionPacketHandler {
    sink: ActionSink,
    dropped: u64,
}

impl ActionPacketHandler {
    pub fn new(sink: ActionSink) -> Self {
        Self { sink, dropped: 0 }
    }

    /// 因类型未知而丢弃的分组数
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[async_trait]
impl PacketHandler for ActionPacketHandler {
    fn media_type(&self) -> MediaType {
        MediaType::Action
    }

    async fn process(&mut self, packet: RtpPacket) -> common::Result<()> {
        match decode_action_payload(&packet.payload)? {
            Some(action) => {
                debug!(
                    "Received {:?} at {}ms (seq {})",
                    action.action_type(),
                    action.timestamp,
                    packet.sequence_number
                );
                if !self.sink.push(action) {
                    return Err(TransportError::Socket("action player released".into()).into());
                }
            }
            None => {
                self.dropped += 1;
                warn!("Dropping unknown action in packet {}", packet.sequence_number);
            }
        }
        Ok(())
    }
}
