use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rtp::{PAYLOAD_TYPE_ACTION, PAYLOAD_TYPE_AUDIO};

/// 媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Action,
    Audio,
}

impl MediaType {
    /// 对应的RTP负载类型
    pub fn payload_type(self) -> u8 {
        match self {
            MediaType::Action => PAYLOAD_TYPE_ACTION,
            MediaType::Audio => PAYLOAD_TYPE_AUDIO,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Action => write!(f, "action"),
            MediaType::Audio => write!(f, "audio"),
        }
    }
}

/// 流传输方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Ws,
    Wss,
    Tcp,
    Udp,
}

impl Transport {
    pub fn is_websocket(self) -> bool {
        matches!(self, Transport::Ws | Transport::Wss)
    }

    /// 根据URL协议头推断传输方式
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split_once("://")?.0;
        match scheme.to_ascii_lowercase().as_str() {
            "ws" => Some(Transport::Ws),
            "wss" => Some(Transport::Wss),
            "tcp" => Some(Transport::Tcp),
            "udp" => Some(Transport::Udp),
            _ => None,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transport::Ws => "ws",
            Transport::Wss => "wss",
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
        };
        write!(f, "{}", name)
    }
}

/// 直播流描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescription {
    pub media_type: MediaType,
    pub transport: Transport,
    pub url: String,
}

impl StreamDescription {
    pub fn new(media_type: MediaType, transport: Transport, url: impl Into<String>) -> Self {
        Self {
            media_type,
            transport,
            url: url.into(),
        }
    }

    /// 从URL推断传输方式，无法识别时返回None
    pub fn from_url(media_type: MediaType, url: impl Into<String>) -> Option<Self> {
        let url = url.into();
        let transport = Transport::from_url(&url)?;
        Some(Self {
            media_type,
            transport,
            url,
        })
    }
}
