// RTP分组
//
// 固定12字节头部（大端），之后是csrc_count个4字节CSRC，剩余为负载。

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::TransportError;

/// RTP固定头长度
pub const RTP_HEADER_LEN: usize = 12;

/// 动作流负载类型
pub const PAYLOAD_TYPE_ACTION: u8 = 96;

/// 音频流负载类型
pub const PAYLOAD_TYPE_AUDIO: u8 = 97;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub payload: Bytes,
}

impl RtpPacket {
    pub fn new(payload_type: u8, payload: Bytes) -> Self {
        Self {
            version: 2,
            padding: false,
            extension: false,
            marker: false,
            payload_type: payload_type & 0x7F,
            sequence_number: 0,
            timestamp: 0,
            ssrc: 0,
            csrc: Vec::new(),
            payload,
        }
    }

    /// 从线上字节解析
    pub fn deserialize(data: &[u8]) -> Result<Self, TransportError> {
        if data.len() < RTP_HEADER_LEN {
            return Err(TransportError::PacketTooShort(data.len()));
        }

        let version = (data[0] & 0xC0) >> 6;
        let padding = data[0] & 0x20 != 0;
        let extension = data[0] & 0x10 != 0;
        let csrc_count = (data[0] & 0x0F) as usize;
        let marker = data[1] & 0x80 != 0;
        let payload_type = data[1] & 0x7F;
        let sequence_number = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let header_len = RTP_HEADER_LEN + csrc_count * 4;
        if data.len() < header_len {
            return Err(TransportError::PacketTooShort(data.len()));
        }

        let csrc = data[RTP_HEADER_LEN..header_len]
            .chunks_exact(4)
            .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(Self {
            version,
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            payload: Bytes::copy_from_slice(&data[header_len..]),
        })
    }

    /// 序列化为线上字节，CSRC最多15个
    pub fn serialize(&self) -> Bytes {
        let csrc_count = self.csrc.len().min(15);
        let mut buf = BytesMut::with_capacity(self.header_len() + self.payload.len());

        buf.put_u8(
            ((self.version & 0x03) << 6)
                | ((self.padding as u8) << 5)
                | ((self.extension as u8) << 4)
                | csrc_count as u8,
        );
        buf.put_u8(((self.marker as u8) << 7) | (self.payload_type & 0x7F));
        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        for csrc in &self.csrc[..csrc_count] {
            buf.put_u32(*csrc);
        }
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    pub fn header_len(&self) -> usize {
        RTP_HEADER_LEN + self.csrc.len().min(15) * 4
    }
}

/// 为发送端分组打上SSRC、递增序号与毫秒时间戳
#[derive(Debug, Clone)]
pub struct RtpSequencer {
    payload_type: u8,
    ssrc: u32,
    next_sequence: u16,
}

impl RtpSequencer {
    pub fn new(payload_type: u8, ssrc: u32, initial_sequence: u16) -> Self {
        Self {
            payload_type,
            ssrc,
            next_sequence: initial_sequence,
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// 生成下一个分组，序号回绕
    pub fn next_packet(&mut self, timestamp_ms: i64, payload: Bytes) -> RtpPacket {
        let mut packet = RtpPacket::new(self.payload_type, payload);
        packet.sequence_number = self.next_sequence;
        packet.timestamp = timestamp_ms as u32;
        packet.ssrc = self.ssrc;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_short() {
        assert_eq!(
            RtpPacket::deserialize(&[0x80, 96, 0, 1]),
            Err(TransportError::PacketTooShort(4))
        );
    }

    #[test]
    fn test_header_only_packet() {
        let data = [
            0x80, 0xE1, 0x12, 0x34, 0x00, 0x00, 0x03, 0xE8, 0xDE, 0xAD, 0xBE, 0xEF,
        ];
        let packet = RtpPacket::deserialize(&data).unwrap();
        assert_eq!(packet.version, 2);
        assert!(!packet.padding);
        assert!(!packet.extension);
        assert!(packet.marker);
        assert_eq!(packet.payload_type, 97);
        assert_eq!(packet.sequence_number, 0x1234);
        assert_eq!(packet.timestamp, 1000);
        assert_eq!(packet.ssrc, 0xDEADBEEF);
        assert!(packet.csrc.is_empty());
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn test_csrc_list() {
        let mut packet = RtpPacket::new(PAYLOAD_TYPE_ACTION, Bytes::from_static(b"abc"));
        packet.csrc = vec![1, 2];
        let bytes = packet.serialize();
        assert_eq!(bytes.len(), 12 + 8 + 3);

        let parsed = RtpPacket::deserialize(&bytes).unwrap();
        assert_eq!(parsed.csrc, vec![1, 2]);
        assert_eq!(&parsed.payload[..], b"abc");
    }

    #[test]
    fn test_csrc_exceeds_buffer() {
        let mut data = vec![0x83, 96];
        data.extend_from_slice(&[0u8; 10]);
        data.extend_from_slice(&[0u8; 4]);
        assert_eq!(
            RtpPacket::deserialize(&data),
            Err(TransportError::PacketTooShort(16))
        );
    }

    #[test]
    fn test_sequencer_wraps() {
        let mut sequencer = RtpSequencer::new(PAYLOAD_TYPE_AUDIO, 42, u16::MAX);
        let first = sequencer.next_packet(10, Bytes::new());
        let second = sequencer.next_packet(20, Bytes::new());
        assert_eq!(first.sequence_number, u16::MAX);
        assert_eq!(second.sequence_number, 0);
        assert_eq!(second.timestamp, 20);
        assert_eq!(second.ssrc, 42);
        assert_eq!(second.payload_type, PAYLOAD_TYPE_AUDIO);
    }
}
