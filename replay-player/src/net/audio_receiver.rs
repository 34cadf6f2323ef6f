// 音频流接收
//
// 负载原样转交给音频输出，不做解码。

use async_trait::async_trait;
use bytes::Bytes;
use common::{MediaType, RtpPacket, TransportError};
use tokio::sync::mpsc;

use super::receiver::{MediaReceiver, PacketHandler};

/// 音频流接收器
pub type AudioReceiver = MediaReceiver<AudioPacketHandler>;

/// 音频输出
#[async_trait]
pub trait AudioSink: Send + 'static {
    async fn write(&mut self, timestamp: u32, data: Bytes) -> common::Result<()>;
}

/// 把音频负载送入通道
#[derive(Debug, Clone)]
pub struct ChannelAudioSink {
    tx: mpsc::Sender<(u32, Bytes)>,
}

impl ChannelAudioSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<(u32, Bytes)>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl AudioSink for ChannelAudioSink {
    async fn write(&mut self, timestamp: u32, data: Bytes) -> common::Result<()> {
        self.tx
            .send((timestamp, data))
            .await
            .map_err(|_| TransportError::Socket("audio sink closed".into()))?;
        Ok(())
    }
}

pub struct AudioPacketHandler {
    sink: Box<dyn AudioSink>,
}

impl AudioPacketHandler {
    pub fn new(sink: impl AudioSink) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }
}

#[async_trait]
impl PacketHandler for AudioPacketHandler {
    fn media_type(&self) -> MediaType {
        MediaType::Audio
    }

    async fn process(&mut self, packet: RtpPacket) -> common::Result<()> {
        self.sink.write(packet.timestamp, packet.payload).await
    }
}
