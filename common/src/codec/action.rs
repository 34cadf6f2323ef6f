// 动作记录编解码
//
// 记录格式：length:i32 · type:i8 · timestamp:i32 · header:i32 · [key event] · payload
// length 统计其后的所有字节。RTP负载使用同样的格式但没有length前缀。

use bytes::{BufMut, BytesMut};
use tracing::{trace, warn};

use crate::cursor::BinaryCursor;
use crate::error::{DecodeError, FormatError, Result};
use crate::types::{
    Action, ActionKind, ActionType, Brush, Color, Font, FontPosture, KeyEvent, KeyEventKind,
    LatexFont, PenPoint, Point, Rect,
};

/// 动作头中标记按键元数据的位
const KEY_EVENT_MASK: i32 = 1;

/// 解码一条带长度前缀的动作记录
///
/// 未知类型返回`Ok(None)`；无论结果如何，游标都停在记录末尾。
pub fn decode_action_record(cursor: &mut BinaryCursor<'_>) -> Result<Option<Action>> {
    let length = cursor.read_i32()?;
    if length < 0 {
        return Err(FormatError::NegativeLength {
            block: "action record",
            length,
        }
        .into());
    }

    let length = length as usize;
    if length > cursor.remaining() {
        return Err(FormatError::Truncated {
            block: "action record",
            declared: length,
            available: cursor.remaining(),
        }
        .into());
    }

    let body = cursor.read_bytes(length)?;
    decode_action_payload(body)
}

/// 解码不带长度前缀的动作（RTP负载形式）
pub fn decode_action_payload(bytes: &[u8]) -> Result<Option<Action>> {
    let mut cursor = BinaryCursor::new(bytes);
    let discriminant = cursor.read_u8()?;
    let timestamp = cursor.read_i32()? as i64;

    let Some(action_type) = ActionType::from_discriminant(discriminant) else {
        trace!("Skipping unknown action type {}", discriminant);
        return Ok(None);
    };

    let key_event = decode_action_header(&mut cursor)?;
    let kind = decode_kind(&mut cursor, action_type)?;

    Ok(Some(Action {
        timestamp,
        key_event,
        kind,
    }))
}

fn decode_action_header(cursor: &mut BinaryCursor<'_>) -> Result<Option<KeyEvent>> {
    let header = cursor.read_i32()?;
    if header & KEY_EVENT_MASK != KEY_EVENT_MASK {
        return Ok(None);
    }

    let key_code = cursor.read_i32()?;
    let modifiers = cursor.read_i32()?;
    let key_type = cursor.read_i8()?;
    let kind = KeyEventKind::from_wire(key_type).ok_or(DecodeError::UnknownKeyEvent(key_type))?;

    Ok(Some(KeyEvent::from_modifiers(kind, key_code, modifiers)))
}

fn decode_kind(cursor: &mut BinaryCursor<'_>, action_type: ActionType) -> Result<ActionKind> {
    let kind = match action_type {
        ActionType::ToolBegin => ActionKind::ToolBegin(read_pen_point(cursor)?),
        ActionType::ToolExecute => ActionKind::ToolExecute(read_pen_point(cursor)?),
        ActionType::ToolEnd => ActionKind::ToolEnd(read_pen_point(cursor)?),
        ActionType::Pen => ActionKind::Pen(read_brush(cursor)?),
        ActionType::Highlighter => ActionKind::Highlighter(read_brush(cursor)?),
        ActionType::Pointer => ActionKind::Pointer(read_brush(cursor)?),
        ActionType::Arrow => ActionKind::Arrow(read_brush(cursor)?),
        ActionType::Line => ActionKind::Line(read_brush(cursor)?),
        ActionType::Rectangle => ActionKind::Rectangle(read_brush(cursor)?),
        ActionType::Ellipse => ActionKind::Ellipse(read_brush(cursor)?),
        ActionType::Latex => ActionKind::Latex {
            handle: cursor.read_i32()?,
        },
        ActionType::LatexFontChange => {
            let handle = cursor.read_i32()?;
            let font_type = cursor.read_i32()?;
            let size = cursor.read_f32()?;
            let color = Color::from_rgba(cursor.read_i32()?);
            ActionKind::LatexFontChange {
                handle,
                font: LatexFont { font_type, size },
                color,
            }
        }
        ActionType::Text => ActionKind::Text {
            handle: cursor.read_i32()?,
        },
        ActionType::TextChange => {
            let handle = cursor.read_i32()?;
            let len = read_len(cursor, "text change")?;
            let text = cursor.read_string(len)?;
            ActionKind::TextChange { handle, text }
        }
        ActionType::TextFontChange => {
            let handle = cursor.read_i32()?;
            let color = Color::from_rgba(cursor.read_i32()?);
            let family_len = read_len(cursor, "font family")?;
            let family = cursor.read_string(family_len)?;
            let size = cursor.read_f64()?;
            let posture = match cursor.read_i8()? {
                0 => FontPosture::Normal,
                1 => FontPosture::Italic,
                other => {
                    warn!("Unsupported font posture {}, using normal", other);
                    FontPosture::Normal
                }
            };
            let weight = ((cursor.read_i8()? as i16 + 1) * 100).max(0) as u16;
            let strikethrough = cursor.read_i8()? > 0;
            let underline = cursor.read_i8()? > 0;

            ActionKind::TextFontChange {
                handle,
                font: Font {
                    family,
                    size,
                    posture,
                    weight,
                    strikethrough,
                    underline,
                },
                color,
            }
        }
        ActionType::TextLocationChange => {
            let handle = cursor.read_i32()?;
            let x = cursor.read_f64()?;
            let y = cursor.read_f64()?;
            ActionKind::TextMove {
                handle,
                position: Point { x, y },
            }
        }
        ActionType::TextRemove => ActionKind::TextRemove {
            handle: cursor.read_i32()?,
        },
        ActionType::TextSelection => {
            let color = Color::from_rgba(cursor.read_i32()?);
            let count = read_len(cursor, "text selection")?;
            // 每个矩形32字节，先校验再分配
            if count.saturating_mul(32) > cursor.remaining() {
                return Err(DecodeError::OutOfBounds {
                    offset: cursor.offset(),
                    requested: count.saturating_mul(32),
                    length: cursor.len(),
                }
                .into());
            }
            let mut bounds = Vec::with_capacity(count);
            for _ in 0..count {
                bounds.push(read_rect(cursor)?);
            }
            ActionKind::TextHighlight { color, bounds }
        }
        ActionType::ClearShapes => ActionKind::ClearShapes,
        ActionType::Clone => ActionKind::Clone,
        ActionType::Select => ActionKind::Select,
        ActionType::SelectGroup => ActionKind::SelectGroup,
        ActionType::Key => ActionKind::Key,
        ActionType::Undo => ActionKind::Undo,
        ActionType::Redo => ActionKind::Redo,
        ActionType::Rubber => ActionKind::Rubber,
        ActionType::Zoom => ActionKind::Zoom,
        ActionType::ZoomOut => ActionKind::ZoomOut,
        ActionType::Panning => ActionKind::Panning,
        ActionType::ExtendView => ActionKind::ExtendView(read_rect(cursor)?),
        ActionType::Page => ActionKind::Page {
            page_number: cursor.read_i32()?,
        },
        ActionType::Screen => ActionKind::Screen,
    };
    Ok(kind)
}

fn read_len(cursor: &mut BinaryCursor<'_>, block: &'static str) -> Result<usize> {
    let length = cursor.read_i32()?;
    if length < 0 {
        return Err(FormatError::NegativeLength { block, length }.into());
    }
    Ok(length as usize)
}

fn read_pen_point(cursor: &mut BinaryCursor<'_>) -> Result<PenPoint> {
    Ok(PenPoint {
        x: cursor.read_f32()?,
        y: cursor.read_f32()?,
        pressure: cursor.read_f32()?,
    })
}

fn read_brush(cursor: &mut BinaryCursor<'_>) -> Result<Brush> {
    let color = Color::from_rgba(cursor.read_i32()?);
    let line_cap = cursor.read_i8()?;
    let width = cursor.read_f64()?;
    Ok(Brush {
        color,
        width,
        line_cap,
    })
}

fn read_rect(cursor: &mut BinaryCursor<'_>) -> Result<Rect> {
    Ok(Rect {
        x: cursor.read_f64()?,
        y: cursor.read_f64()?,
        width: cursor.read_f64()?,
        height: cursor.read_f64()?,
    })
}

/// 编码为带长度前缀的动作记录
pub fn encode_action_record(action: &Action, buf: &mut BytesMut) {
    let payload = encode_action_payload(action);
    buf.put_i32(payload.len() as i32);
    buf.put_slice(&payload);
}

/// 编码为RTP负载形式（无长度前缀）
pub fn encode_action_payload(action: &Action) -> BytesMut {
    let mut buf = BytesMut::with_capacity(32);
    buf.put_u8(action.action_type().discriminant());
    buf.put_i32(action.timestamp as i32);

    match &action.key_event {
        Some(event) => {
            buf.put_i32(KEY_EVENT_MASK);
            buf.put_i32(event.key_code);
            buf.put_i32(event.modifiers());
            buf.put_i8(event.kind.to_wire());
        }
        None => buf.put_i32(0),
    }

    encode_kind(&action.kind, &mut buf);
    buf
}

fn encode_kind(kind: &ActionKind, buf: &mut BytesMut) {
    match kind {
        ActionKind::ToolBegin(point) | ActionKind::ToolExecute(point) | ActionKind::ToolEnd(point) => {
            buf.put_f32(point.x);
            buf.put_f32(point.y);
            buf.put_f32(point.pressure);
        }
        ActionKind::Pen(brush)
        | ActionKind::Highlighter(brush)
        | ActionKind::Pointer(brush)
        | ActionKind::Arrow(brush)
        | ActionKind::Line(brush)
        | ActionKind::Rectangle(brush)
        | ActionKind::Ellipse(brush) => {
            buf.put_i32(brush.color.to_rgba());
            buf.put_i8(brush.line_cap);
            buf.put_f64(brush.width);
        }
        ActionKind::Latex { handle }
        | ActionKind::Text { handle }
        | ActionKind::TextRemove { handle } => buf.put_i32(*handle),
        ActionKind::LatexFontChange {
            handle,
            font,
            color,
        } => {
            buf.put_i32(*handle);
            buf.put_i32(font.font_type);
            buf.put_f32(font.size);
            buf.put_i32(color.to_rgba());
        }
        ActionKind::TextChange { handle, text } => {
            buf.put_i32(*handle);
            buf.put_i32(text.len() as i32);
            buf.put_slice(text.as_bytes());
        }
        ActionKind::TextFontChange {
            handle,
            font,
            color,
        } => {
            buf.put_i32(*handle);
            buf.put_i32(color.to_rgba());
            buf.put_i32(font.family.len() as i32);
            buf.put_slice(font.family.as_bytes());
            buf.put_f64(font.size);
            buf.put_i8(match font.posture {
                FontPosture::Normal => 0,
                FontPosture::Italic => 1,
            });
            buf.put_i8((font.weight / 100).saturating_sub(1) as i8);
            buf.put_i8(font.strikethrough as i8);
            buf.put_i8(font.underline as i8);
        }
        ActionKind::TextMove { handle, position } => {
            buf.put_i32(*handle);
            buf.put_f64(position.x);
            buf.put_f64(position.y);
        }
        ActionKind::TextHighlight { color, bounds } => {
            buf.put_i32(color.to_rgba());
            buf.put_i32(bounds.len() as i32);
            for rect in bounds {
                put_rect(buf, rect);
            }
        }
        ActionKind::ExtendView(rect) => put_rect(buf, rect),
        ActionKind::Page { page_number } => buf.put_i32(*page_number),
        ActionKind::ClearShapes
        | ActionKind::Clone
        | ActionKind::Select
        | ActionKind::SelectGroup
        | ActionKind::Key
        | ActionKind::Undo
        | ActionKind::Redo
        | ActionKind::Rubber
        | ActionKind::Zoom
        | ActionKind::ZoomOut
        | ActionKind::Panning
        | ActionKind::Screen => {}
    }
}

fn put_rect(buf: &mut BytesMut, rect: &Rect) {
    buf.put_f64(rect.x);
    buf.put_f64(rect.y);
    buf.put_f64(rect.width);
    buf.put_f64(rect.height);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LectureError;

    fn pen_record() -> Vec<u8> {
        let mut body = BytesMut::new();
        body.put_u8(ActionType::Pen as u8);
        body.put_i32(1200);
        body.put_i32(0);
        body.put_i32(0xFF0000FFu32 as i32);
        body.put_i8(0);
        body.put_f64(2.5);

        let mut record = BytesMut::new();
        record.put_i32(body.len() as i32);
        record.put_slice(&body);
        record.to_vec()
    }

    #[test]
    fn test_decode_pen_brush() {
        let data = pen_record();
        let mut cursor = BinaryCursor::new(&data);
        let action = decode_action_record(&mut cursor).unwrap().unwrap();

        assert_eq!(action.timestamp, 1200);
        assert_eq!(action.key_event, None);
        match action.kind {
            ActionKind::Pen(brush) => {
                assert_eq!(
                    brush.color,
                    Color {
                        r: 255,
                        g: 0,
                        b: 0,
                        a: 255
                    }
                );
                assert_eq!(brush.width, 2.5);
                assert_eq!(brush.line_cap, 0);
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert_eq!(cursor.offset(), data.len());
    }

    #[test]
    fn test_unknown_discriminant_skips_record() {
        let mut data = BytesMut::new();
        data.put_i32(9);
        data.put_u8(99);
        data.put_i32(500);
        data.put_i32(0x0BAD_F00D);
        // 后面再跟一条合法记录
        data.put_slice(&pen_record());

        let mut cursor = BinaryCursor::new(&data);
        assert_eq!(decode_action_record(&mut cursor).unwrap(), None);
        assert_eq!(cursor.offset(), 13);
        assert!(decode_action_record(&mut cursor).unwrap().is_some());
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn test_key_event_header() {
        let action = Action::new(10, ActionKind::Key).with_key_event(KeyEvent {
            kind: KeyEventKind::KeyPress,
            key_code: 37,
            shift: false,
            ctrl: true,
            alt: false,
        });
        let payload = encode_action_payload(&action);
        let decoded = decode_action_payload(&payload).unwrap().unwrap();
        assert_eq!(decoded, action);
    }

    #[test]
    fn test_unknown_key_event_type_fails() {
        let mut payload = BytesMut::new();
        payload.put_u8(ActionType::Undo as u8);
        payload.put_i32(0);
        payload.put_i32(KEY_EVENT_MASK);
        payload.put_i32(13);
        payload.put_i32(0);
        payload.put_i8(7);

        let err = decode_action_payload(&payload).unwrap_err();
        assert!(matches!(
            err,
            LectureError::Decode(DecodeError::UnknownKeyEvent(7))
        ));
    }

    #[test]
    fn test_text_font_change() {
        let action = Action::new(
            3000,
            ActionKind::TextFontChange {
                handle: 4,
                font: Font {
                    family: "Arial".to_string(),
                    size: 14.0,
                    posture: FontPosture::Italic,
                    weight: 700,
                    strikethrough: false,
                    underline: true,
                },
                color: Color::from_rgba(0x00FF00FF),
            },
        );
        let decoded = decode_action_payload(&encode_action_payload(&action))
            .unwrap()
            .unwrap();
        assert_eq!(decoded, action);
    }

    #[test]
    fn test_unsupported_posture_falls_back_to_normal() {
        let mut payload = BytesMut::new();
        payload.put_u8(ActionType::TextFontChange as u8);
        payload.put_i32(0);
        payload.put_i32(0);
        payload.put_i32(1);
        payload.put_i32(0);
        payload.put_i32(4);
        payload.put_slice(b"Mono");
        payload.put_f64(12.0);
        payload.put_i8(5);
        payload.put_i8(3);
        payload.put_i8(1);
        payload.put_i8(0);

        let action = decode_action_payload(&payload).unwrap().unwrap();
        match action.kind {
            ActionKind::TextFontChange { font, .. } => {
                assert_eq!(font.posture, FontPosture::Normal);
                assert_eq!(font.weight, 400);
                assert!(font.strikethrough);
                assert!(!font.underline);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_text_selection_count_exceeds_buffer() {
        let mut payload = BytesMut::new();
        payload.put_u8(ActionType::TextSelection as u8);
        payload.put_i32(0);
        payload.put_i32(0);
        payload.put_i32(0);
        payload.put_i32(1_000_000);

        let err = decode_action_payload(&payload).unwrap_err();
        assert!(matches!(err, LectureError::Decode(DecodeError::OutOfBounds { .. })));
    }

    #[test]
    fn test_record_longer_than_buffer() {
        let mut data = BytesMut::new();
        data.put_i32(100);
        data.put_u8(ActionType::Undo as u8);

        let mut cursor = BinaryCursor::new(&data);
        let err = decode_action_record(&mut cursor).unwrap_err();
        assert!(matches!(err, LectureError::Format(FormatError::Truncated { .. })));
    }

    #[test]
    fn test_page_and_screen() {
        let page = Action::page_change(800, 3);
        let decoded = decode_action_payload(&encode_action_payload(&page))
            .unwrap()
            .unwrap();
        assert_eq!(decoded.kind, ActionKind::Page { page_number: 3 });

        // 屏幕动作的负载是不透明的
        let mut payload = encode_action_payload(&Action::new(900, ActionKind::Screen));
        payload.put_slice(&[1, 2, 3, 4, 5]);
        let decoded = decode_action_payload(&payload).unwrap().unwrap();
        assert_eq!(decoded.kind, ActionKind::Screen);
    }
}
