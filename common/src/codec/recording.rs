// 录像文件编解码
//
// 文件头48字节：magic · version · duration · checksum(20) · action_len · document_len · audio_len
// 之后依次是动作块、文档、音频。动作块由连续的页面记录组成，每条记录带i32长度前缀。

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use super::action::{decode_action_record, encode_action_record};
use crate::cursor::BinaryCursor;
use crate::error::{FormatError, Result};
use crate::types::{
    Action, RecordedPage, Recording, RecordingHeader, RECORDING_HEADER_LEN, RECORDING_MAGIC,
};

const CHECKSUM_LEN: usize = 20;

/// 解析文件头并校验各块长度
pub fn decode_header(bytes: &[u8]) -> Result<RecordingHeader> {
    if bytes.len() < RECORDING_HEADER_LEN {
        return Err(FormatError::TooShort(bytes.len()).into());
    }

    let mut cursor = BinaryCursor::new(bytes);
    let magic = cursor.read_i32()?;
    if magic != RECORDING_MAGIC {
        return Err(FormatError::BadMagic(magic).into());
    }

    let version = cursor.read_i32()?;
    let duration = cursor.read_i64()?;
    cursor.skip(CHECKSUM_LEN)?;

    let action_len = read_block_len(&mut cursor, "action block")?;
    let document_len = read_block_len(&mut cursor, "document block")?;
    let audio_len = read_block_len(&mut cursor, "audio block")?;

    let header = RecordingHeader {
        version,
        duration,
        action_len,
        document_len,
        audio_len,
    };

    for (block, range) in [
        ("action block", header.action_range()),
        ("document block", header.document_range()),
        ("audio block", header.audio_range()),
    ] {
        if range.end > bytes.len() {
            return Err(FormatError::Truncated {
                block,
                declared: range.end - range.start,
                available: bytes.len().saturating_sub(range.start),
            }
            .into());
        }
    }

    Ok(header)
}

fn read_block_len(cursor: &mut BinaryCursor<'_>, block: &'static str) -> Result<usize> {
    let length = cursor.read_i32()?;
    if length < 0 {
        return Err(FormatError::NegativeLength { block, length }.into());
    }
    Ok(length as usize)
}

/// 解码一个页面记录：长度前缀之后是页码、翻页时间与两个动作块
pub fn decode_recorded_page(cursor: &mut BinaryCursor<'_>) -> Result<RecordedPage> {
    let length = read_block_len(cursor, "page record")?;
    if length > cursor.remaining() {
        return Err(FormatError::Truncated {
            block: "page record",
            declared: length,
            available: cursor.remaining(),
        }
        .into());
    }

    let mut page_cursor = BinaryCursor::new(cursor.read_bytes(length)?);
    let page_number = page_cursor.read_i32()?;
    let timestamp = page_cursor.read_i32()? as i64;

    let mut page = RecordedPage::new(page_number, timestamp);
    page.static_actions = decode_action_block(&mut page_cursor, "static actions")?;
    page.playback_actions = decode_action_block(&mut page_cursor, "playback actions")?;

    Ok(page)
}

fn decode_action_block(cursor: &mut BinaryCursor<'_>, block: &'static str) -> Result<Vec<Action>> {
    let length = read_block_len(cursor, block)?;
    if length > cursor.remaining() {
        return Err(FormatError::Truncated {
            block,
            declared: length,
            available: cursor.remaining(),
        }
        .into());
    }

    let mut block_cursor = BinaryCursor::new(cursor.read_bytes(length)?);
    let mut actions = Vec::new();
    while block_cursor.has_remaining() {
        if let Some(action) = decode_action_record(&mut block_cursor)? {
            actions.push(action);
        }
    }
    Ok(actions)
}

/// 解码完整录像
pub fn decode_recording(bytes: &[u8]) -> Result<Recording> {
    let header = decode_header(bytes)?;

    let mut cursor = BinaryCursor::new(&bytes[header.action_range()]);
    let mut pages = Vec::new();
    while cursor.has_remaining() {
        pages.push(decode_recorded_page(&mut cursor)?);
    }

    debug!(
        "Decoded recording: version={}, pages={}, document={} bytes, audio={} bytes",
        header.version,
        pages.len(),
        header.document_len,
        header.audio_len
    );

    Ok(Recording {
        header,
        pages,
        document: Bytes::copy_from_slice(&bytes[header.document_range()]),
        audio: Bytes::copy_from_slice(&bytes[header.audio_range()]),
    })
}

/// 编码一个页面记录
pub fn encode_recorded_page(page: &RecordedPage, buf: &mut BytesMut) {
    let mut body = BytesMut::new();
    body.put_i32(page.page_number);
    body.put_i32(page.timestamp as i32);
    encode_action_block(&page.static_actions, &mut body);
    encode_action_block(&page.playback_actions, &mut body);

    buf.put_i32(body.len() as i32);
    buf.put_slice(&body);
}

fn encode_action_block(actions: &[Action], buf: &mut BytesMut) {
    let mut block = BytesMut::new();
    for action in actions {
        encode_action_record(action, &mut block);
    }
    buf.put_i32(block.len() as i32);
    buf.put_slice(&block);
}

/// 编码完整录像，校验和写为0
pub fn encode_recording(
    version: i32,
    pages: &[RecordedPage],
    document: &[u8],
    audio: &[u8],
) -> Bytes {
    let mut action_block = BytesMut::new();
    for page in pages {
        encode_recorded_page(page, &mut action_block);
    }

    let mut buf = BytesMut::with_capacity(
        RECORDING_HEADER_LEN + action_block.len() + document.len() + audio.len(),
    );
    buf.put_i32(RECORDING_MAGIC);
    buf.put_i32(version);
    buf.put_i64(0);
    buf.put_bytes(0, CHECKSUM_LEN);
    buf.put_i32(action_block.len() as i32);
    buf.put_i32(document.len() as i32);
    buf.put_i32(audio.len() as i32);
    buf.put_slice(&action_block);
    buf.put_slice(document);
    buf.put_slice(audio);
    buf.freeze()
}
