use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// 录像文件魔数
pub const RECORDING_MAGIC: i32 = 777_014_354;

/// 录像文件头长度
pub const RECORDING_HEADER_LEN: usize = 48;

/// 动作类型（线上判别值）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActionType {
    ToolBegin = 0,
    ToolExecute = 1,
    ToolEnd = 2,
    Pen = 3,
    Highlighter = 4,
    Pointer = 5,
    Arrow = 6,
    Line = 7,
    Rectangle = 8,
    Ellipse = 9,
    Latex = 10,
    LatexFontChange = 11,
    Text = 12,
    TextChange = 13,
    TextFontChange = 14,
    TextLocationChange = 15,
    TextRemove = 16,
    TextSelection = 17,
    ClearShapes = 18,
    Clone = 19,
    Select = 20,
    SelectGroup = 21,
    Key = 22,
    Undo = 23,
    Redo = 24,
    Rubber = 25,
    Zoom = 26,
    ZoomOut = 27,
    Panning = 28,
    ExtendView = 29,
    Page = 30,
    Screen = 31,
}

impl ActionType {
    /// 从判别值解析，未知值返回None
    pub fn from_discriminant(value: u8) -> Option<Self> {
        use ActionType::*;

        let ty = match value {
            0 => ToolBegin,
            1 => ToolExecute,
            2 => ToolEnd,
            3 => Pen,
            4 => Highlighter,
            5 => Pointer,
            6 => Arrow,
            7 => Line,
            8 => Rectangle,
            9 => Ellipse,
            10 => Latex,
            11 => LatexFontChange,
            12 => Text,
            13 => TextChange,
            14 => TextFontChange,
            15 => TextLocationChange,
            16 => TextRemove,
            17 => TextSelection,
            18 => ClearShapes,
            19 => Clone,
            20 => Select,
            21 => SelectGroup,
            22 => Key,
            23 => Undo,
            24 => Redo,
            25 => Rubber,
            26 => Zoom,
            27 => ZoomOut,
            28 => Panning,
            29 => ExtendView,
            30 => Page,
            31 => Screen,
            _ => return None,
        };
        Some(ty)
    }

    pub fn discriminant(self) -> u8 {
        self as u8
    }
}

/// 按键事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEventKind {
    KeyDown,
    KeyUp,
    KeyPress,
}

impl KeyEventKind {
    pub fn to_wire(self) -> i8 {
        match self {
            KeyEventKind::KeyDown => 0,
            KeyEventKind::KeyUp => 1,
            KeyEventKind::KeyPress => 2,
        }
    }

    pub fn from_wire(value: i8) -> Option<Self> {
        match value {
            0 => Some(KeyEventKind::KeyDown),
            1 => Some(KeyEventKind::KeyUp),
            2 => Some(KeyEventKind::KeyPress),
            _ => None,
        }
    }
}

/// 修饰键掩码
pub mod modifier_mask {
    pub const SHIFT: i32 = 1 << 1;
    pub const CTRL: i32 = 1 << 2;
    pub const ALT: i32 = 1 << 3;
}

/// 动作附带的按键元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    pub key_code: i32,
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl KeyEvent {
    pub fn from_modifiers(kind: KeyEventKind, key_code: i32, modifiers: i32) -> Self {
        Self {
            kind,
            key_code,
            shift: modifiers & modifier_mask::SHIFT != 0,
            ctrl: modifiers & modifier_mask::CTRL != 0,
            alt: modifiers & modifier_mask::ALT != 0,
        }
    }

    pub fn modifiers(&self) -> i32 {
        let mut mask = 0;
        if self.shift {
            mask |= modifier_mask::SHIFT;
        }
        if self.ctrl {
            mask |= modifier_mask::CTRL;
        }
        if self.alt {
            mask |= modifier_mask::ALT;
        }
        mask
    }
}

/// RGBA颜色，线上格式为红色位于最高字节的i32
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn from_rgba(value: i32) -> Self {
        let [r, g, b, a] = value.to_be_bytes();
        Self { r, g, b, a }
    }

    pub fn to_rgba(self) -> i32 {
        i32::from_be_bytes([self.r, self.g, self.b, self.a])
    }
}

/// 画笔：颜色 + 线宽 + 线帽
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Brush {
    pub color: Color,
    pub width: f64,
    pub line_cap: i8,
}

/// 笔迹采样点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenPoint {
    pub x: f32,
    pub y: f32,
    pub pressure: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FontPosture {
    Normal,
    Italic,
}

/// 文本字体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Font {
    pub family: String,
    pub size: f64,
    pub posture: FontPosture,
    /// CSS权重，100..=900
    pub weight: u16,
    pub strikethrough: bool,
    pub underline: bool,
}

/// 公式字体
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatexFont {
    pub font_type: i32,
    pub size: f32,
}

/// 动作负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionKind {
    ToolBegin(PenPoint),
    ToolExecute(PenPoint),
    ToolEnd(PenPoint),
    Pen(Brush),
    Highlighter(Brush),
    Pointer(Brush),
    Arrow(Brush),
    Line(Brush),
    Rectangle(Brush),
    Ellipse(Brush),
    Latex { handle: i32 },
    LatexFontChange { handle: i32, font: LatexFont, color: Color },
    Text { handle: i32 },
    TextChange { handle: i32, text: String },
    TextFontChange { handle: i32, font: Font, color: Color },
    TextMove { handle: i32, position: Point },
    TextRemove { handle: i32 },
    TextHighlight { color: Color, bounds: Vec<Rect> },
    ClearShapes,
    Clone,
    Select,
    SelectGroup,
    Key,
    Undo,
    Redo,
    Rubber,
    Zoom,
    ZoomOut,
    Panning,
    ExtendView(Rect),
    Page { page_number: i32 },
    Screen,
}

impl ActionKind {
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionKind::ToolBegin(_) => ActionType::ToolBegin,
            ActionKind::ToolExecute(_) => ActionType::ToolExecute,
            ActionKind::ToolEnd(_) => ActionType::ToolEnd,
            ActionKind::Pen(_) => ActionType::Pen,
            ActionKind::Highlighter(_) => ActionType::Highlighter,
            ActionKind::Pointer(_) => ActionType::Pointer,
            ActionKind::Arrow(_) => ActionType::Arrow,
            ActionKind::Line(_) => ActionType::Line,
            ActionKind::Rectangle(_) => ActionType::Rectangle,
            ActionKind::Ellipse(_) => ActionType::Ellipse,
            ActionKind::Latex { .. } => ActionType::Latex,
            ActionKind::LatexFontChange { .. } => ActionType::LatexFontChange,
            ActionKind::Text { .. } => ActionType::Text,
            ActionKind::TextChange { .. } => ActionType::TextChange,
            ActionKind::TextFontChange { .. } => ActionType::TextFontChange,
            ActionKind::TextMove { .. } => ActionType::TextLocationChange,
            ActionKind::TextRemove { .. } => ActionType::TextRemove,
            ActionKind::TextHighlight { .. } => ActionType::TextSelection,
            ActionKind::ClearShapes => ActionType::ClearShapes,
            ActionKind::Clone => ActionType::Clone,
            ActionKind::Select => ActionType::Select,
            ActionKind::SelectGroup => ActionType::SelectGroup,
            ActionKind::Key => ActionType::Key,
            ActionKind::Undo => ActionType::Undo,
            ActionKind::Redo => ActionType::Redo,
            ActionKind::Rubber => ActionType::Rubber,
            ActionKind::Zoom => ActionType::Zoom,
            ActionKind::ZoomOut => ActionType::ZoomOut,
            ActionKind::Panning => ActionType::Panning,
            ActionKind::ExtendView(_) => ActionType::ExtendView,
            ActionKind::Page { .. } => ActionType::Page,
            ActionKind::Screen => ActionType::Screen,
        }
    }
}

/// 已解码的动作，解码后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// 相对录像开始的毫秒时间戳
    pub timestamp: i64,
    pub key_event: Option<KeyEvent>,
    pub kind: ActionKind,
}

impl Action {
    pub fn new(timestamp: i64, kind: ActionKind) -> Self {
        Self {
            timestamp,
            key_event: None,
            kind,
        }
    }

    pub fn with_key_event(mut self, key_event: KeyEvent) -> Self {
        self.key_event = Some(key_event);
        self
    }

    /// 翻页动作
    pub fn page_change(timestamp: i64, page_number: i32) -> Self {
        Self::new(timestamp, ActionKind::Page { page_number })
    }

    pub fn action_type(&self) -> ActionType {
        self.kind.action_type()
    }
}

/// 录像中的一页
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedPage {
    pub page_number: i32,
    /// 翻到本页的时间戳（毫秒）
    pub timestamp: i64,
    pub static_actions: Vec<Action>,
    pub playback_actions: Vec<Action>,
}

impl RecordedPage {
    pub fn new(page_number: i32, timestamp: i64) -> Self {
        Self {
            page_number,
            timestamp,
            static_actions: Vec::new(),
            playback_actions: Vec::new(),
        }
    }

    /// 最后一个动作的时间戳，无动作时为翻页时间
    pub fn end_timestamp(&self) -> i64 {
        self.playback_actions
            .last()
            .map(|action| action.timestamp)
            .unwrap_or(self.timestamp)
    }
}

/// 录像文件头
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingHeader {
    pub version: i32,
    pub duration: i64,
    pub action_len: usize,
    pub document_len: usize,
    pub audio_len: usize,
}

impl RecordingHeader {
    pub fn action_range(&self) -> std::ops::Range<usize> {
        RECORDING_HEADER_LEN..RECORDING_HEADER_LEN + self.action_len
    }

    pub fn document_range(&self) -> std::ops::Range<usize> {
        let start = self.action_range().end;
        start..start + self.document_len
    }

    pub fn audio_range(&self) -> std::ops::Range<usize> {
        let start = self.document_range().end;
        start..start + self.audio_len
    }
}

/// 完整录像
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub header: RecordingHeader,
    pub pages: Vec<RecordedPage>,
    pub document: Bytes,
    pub audio: Bytes,
}

impl Recording {
    /// 最后一个动作的时间戳
    pub fn last_timestamp(&self) -> i64 {
        self.pages
            .iter()
            .map(RecordedPage::end_timestamp)
            .max()
            .unwrap_or(0)
    }

    pub fn action_count(&self) -> usize {
        self.pages
            .iter()
            .map(|page| page.static_actions.len() + page.playback_actions.len())
            .sum()
    }
}
