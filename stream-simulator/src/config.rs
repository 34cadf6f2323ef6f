use std::path::PathBuf;

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub recording_path: PathBuf,
    /// 音频负载的字节速率
    pub audio_bytes_per_ms: usize,
    /// 每个音频分组覆盖的时长
    pub audio_packet_ms: u32,
    /// 播放结束后从头循环
    pub loop_playback: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Self {
            bind_address: "127.0.0.1:8090".to_string(),
            recording_path: PathBuf::from("./recordings/lecture.presenter"),
            audio_bytes_per_ms: 16, // 8kHz 16bit mono
            audio_packet_ms: 20,
            loop_playback: false,
        })
    }
}
