// 媒体源：把录像拆成按时间排列的RTP分组

use std::sync::Arc;

use bytes::Bytes;
use common::codec::encode_action_payload;
use common::{
    Action, MediaType, Recording, RtpPacket, RtpSequencer, PAYLOAD_TYPE_ACTION,
    PAYLOAD_TYPE_AUDIO,
};
use uuid::Uuid;

/// 循环播放时两轮之间的间隔
const LOOP_GAP_MS: i64 = 1000;

/// 到期时间（相对流开始）与待发送分组
#[derive(Debug, Clone)]
pub struct ScheduledFrame {
    pub due_ms: i64,
    pub packet: RtpPacket,
}

pub trait MediaFeed: Send + 'static {
    fn media_type(&self) -> MediaType;

    /// 下一个分组，流结束时返回None
    fn next_frame(&mut self) -> Option<ScheduledFrame>;
}

/// 每条流使用随机的SSRC和起始序号
fn random_sequencer(payload_type: u8) -> RtpSequencer {
    let seed = Uuid::new_v4().as_u128();
    RtpSequencer::new(payload_type, seed as u32, (seed >> 32) as u16)
}

/// 录像中的动作按播放顺序展开：每页先翻页，再是回放动作
pub fn timeline(recording: &Recording) -> Vec<Action> {
    let mut actions = Vec::with_capacity(recording.action_count() + recording.pages.len());
    for page in &recording.pages {
        actions.push(Action::page_change(page.timestamp, page.page_number));
        actions.extend(page.playback_actions.iter().cloned());
    }
    actions
}

pub struct ActionFeed {
    actions: Arc<Vec<Action>>,
    position: usize,
    cycle_ms: i64,
    offset_ms: i64,
    loop_playback: bool,
    sequencer: RtpSequencer,
}

impl ActionFeed {
    pub fn new(actions: Arc<Vec<Action>>, loop_playback: bool) -> Self {
        let last = actions.iter().map(|action| action.timestamp).max().unwrap_or(0);
        Self {
            actions,
            position: 0,
            cycle_ms: last + LOOP_GAP_MS,
            offset_ms: 0,
            loop_playback,
            sequencer: random_sequencer(PAYLOAD_TYPE_ACTION),
        }
    }
}

impl MediaFeed for ActionFeed {
    fn media_type(&self) -> MediaType {
        MediaType::Action
    }

    fn next_frame(&mut self) -> Option<ScheduledFrame> {
        if self.position >= self.actions.len() {
            if !self.loop_playback || self.actions.is_empty() {
                return None;
            }
            self.position = 0;
            self.offset_ms += self.cycle_ms;
        }

        let mut action = self.actions[self.position].clone();
        self.position += 1;
        action.timestamp += self.offset_ms;

        let payload = encode_action_payload(&action).freeze();
        Some(ScheduledFrame {
            due_ms: action.timestamp,
            packet: self.sequencer.next_packet(action.timestamp, payload),
        })
    }
}

/// 按固定时长切分音频；没有音频时发送空负载，只用于推进客户端时钟
pub struct AudioFeed {
    audio: Bytes,
    chunk_len: usize,
    packet_ms: i64,
    packets: i64,
    index: i64,
    loop_playback: bool,
    sequencer: RtpSequencer,
}

impl AudioFeed {
    pub fn new(
        audio: Bytes,
        bytes_per_ms: usize,
        packet_ms: u32,
        duration_ms: i64,
        loop_playback: bool,
    ) -> Self {
        let packet_ms = i64::from(packet_ms.max(1));
        let audio_ms = if bytes_per_ms == 0 {
            0
        } else {
            (audio.len() / bytes_per_ms) as i64
        };
        let total_ms = duration_ms.max(audio_ms).max(0);

        Self {
            audio,
            chunk_len: bytes_per_ms * packet_ms as usize,
            packet_ms,
            packets: total_ms / packet_ms + 1,
            index: 0,
            loop_playback,
            sequencer: random_sequencer(PAYLOAD_TYPE_AUDIO),
        }
    }

    fn chunk(&self, position: i64) -> Bytes {
        let start = (position as usize).saturating_mul(self.chunk_len);
        if start >= self.audio.len() {
            return Bytes::new();
        }
        let end = (start + self.chunk_len).min(self.audio.len());
        self.audio.slice(start..end)
    }
}

impl MediaFeed for AudioFeed {
    fn media_type(&self) -> MediaType {
        MediaType::Audio
    }

    fn next_frame(&mut self) -> Option<ScheduledFrame> {
        if self.index >= self.packets && !self.loop_playback {
            return None;
        }

        // 循环时与动作流使用相同的周期
        let position = self.index % self.packets;
        let cycle = self.index / self.packets;
        let cycle_ms = (self.packets - 1) * self.packet_ms + LOOP_GAP_MS;
        let due_ms = cycle * cycle_ms + position * self.packet_ms;
        self.index += 1;

        let payload = self.chunk(position);
        Some(ScheduledFrame {
            due_ms,
            packet: self.sequencer.next_packet(due_ms, payload),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::codec::decode_action_payload;
    use common::{ActionKind, RecordedPage};

    fn recording() -> Recording {
        let mut first = RecordedPage::new(0, 0);
        first.static_actions.push(Action::new(0, ActionKind::ClearShapes));
        first.playback_actions.push(Action::new(40, ActionKind::Undo));
        let mut second = RecordedPage::new(1, 100);
        second.playback_actions.push(Action::new(150, ActionKind::Redo));

        let bytes = common::codec::encode_recording(1, &[first, second], b"doc", &[7u8; 64]);
        common::codec::decode_recording(&bytes).unwrap()
    }

    #[test]
    fn test_timeline_inserts_page_changes() {
        let actions = timeline(&recording());
        let kinds: Vec<_> = actions.iter().map(|action| action.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::Page { page_number: 0 },
                ActionKind::Undo,
                ActionKind::Page { page_number: 1 },
                ActionKind::Redo,
            ]
        );
    }

    #[test]
    fn test_action_feed_sequences_packets() {
        let mut feed = ActionFeed::new(Arc::new(timeline(&recording())), false);
        let frames: Vec<_> = std::iter::from_fn(|| feed.next_frame()).collect();
        assert_eq!(frames.len(), 4);

        let first_sequence = frames[0].packet.sequence_number;
        for (index, frame) in frames.iter().enumerate() {
            assert_eq!(frame.packet.payload_type, PAYLOAD_TYPE_ACTION);
            assert_eq!(
                frame.packet.sequence_number,
                first_sequence.wrapping_add(index as u16)
            );
            let action = decode_action_payload(&frame.packet.payload).unwrap().unwrap();
            assert_eq!(action.timestamp, frame.due_ms);
        }
        assert_eq!(frames[3].due_ms, 150);
    }

    #[test]
    fn test_action_feed_loops_with_offset() {
        let mut feed = ActionFeed::new(Arc::new(timeline(&recording())), true);
        let frames: Vec<_> = (0..6).filter_map(|_| feed.next_frame()).collect();
        assert_eq!(frames[4].due_ms, 150 + LOOP_GAP_MS);
        assert_eq!(frames[5].due_ms, 150 + LOOP_GAP_MS + 40);
    }

    #[test]
    fn test_audio_feed_chunks_payload() {
        // 64字节，每毫秒1字节，20ms一个分组
        let mut feed = AudioFeed::new(Bytes::from(vec![7u8; 64]), 1, 20, 0, false);
        let frames: Vec<_> = std::iter::from_fn(|| feed.next_frame()).collect();

        let sizes: Vec<_> = frames.iter().map(|frame| frame.packet.payload.len()).collect();
        assert_eq!(sizes, vec![20, 20, 20, 4]);
        let due: Vec<_> = frames.iter().map(|frame| frame.due_ms).collect();
        assert_eq!(due, vec![0, 20, 40, 60]);
        assert!(frames
            .iter()
            .all(|frame| frame.packet.payload_type == PAYLOAD_TYPE_AUDIO));
    }

    #[test]
    fn test_audio_feed_without_audio_still_ticks() {
        let mut feed = AudioFeed::new(Bytes::new(), 16, 50, 120, false);
        let frames: Vec<_> = std::iter::from_fn(|| feed.next_frame()).collect();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|frame| frame.packet.payload.is_empty()));
        assert_eq!(frames[2].due_ms, 100);
    }
}
