use std::path::PathBuf;
use std::time::Duration;

use common::Transport;
use serde::{Deserialize, Serialize};

use crate::error::{PlaybackError, Result};

/// 播放器配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// 回放设置
    pub playback: PlaybackConfig,

    /// 直播流地址
    pub stream: StreamConfig,

    /// 日志设置
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// 每秒调用 tick() 的次数
    pub frame_rate_hz: u32,
}

impl PlaybackConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate_hz.max(1)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub action_url: String,
    pub audio_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    pub level: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { frame_rate_hz: 60 }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            action_url: "ws://127.0.0.1:8090/stream/action".to_string(),
            audio_url: "ws://127.0.0.1:8090/stream/audio".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// 配置文件的加载、保存与校验
pub struct ConfigManager {
    config_path: PathBuf,
    config: AppConfig,
}

impl ConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            config: AppConfig::default(),
        }
    }

    /// 加载配置；文件不存在时写入默认配置
    pub async fn load(&mut self) -> Result<()> {
        if !self.config_path.exists() {
            self.save().await?;
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| PlaybackError::Config(format!("Failed to read config file: {}", e)))?;

        self.config = toml::from_str(&content)
            .map_err(|e| PlaybackError::Config(format!("Failed to parse config file: {}", e)))?;

        self.validate()
    }

    pub async fn save(&self) -> Result<()> {
        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| PlaybackError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    PlaybackError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        tokio::fs::write(&self.config_path, content)
            .await
            .map_err(|e| PlaybackError::Config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    pub fn get_config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    pub fn validate(&self) -> Result<()> {
        if self.config.playback.frame_rate_hz == 0 {
            return Err(PlaybackError::Config(
                "Frame rate must be greater than 0".to_string(),
            ));
        }

        for url in [&self.config.stream.action_url, &self.config.stream.audio_url] {
            let websocket = Transport::from_url(url)
                .map(Transport::is_websocket)
                .unwrap_or(false);
            if !websocket {
                return Err(PlaybackError::Config(format!(
                    "Stream URL must use ws:// or wss://: {}",
                    url
                )));
            }
        }

        Ok(())
    }
}

/// 环境变量覆盖
pub struct EnvConfigOverride;

impl EnvConfigOverride {
    pub fn apply_overrides(config: &mut AppConfig) {
        use std::env;

        if let Ok(rate) = env::var("REPLAY_PLAYER_FRAME_RATE") {
            if let Ok(rate) = rate.parse::<u32>() {
                config.playback.frame_rate_hz = rate;
            }
        }

        if let Ok(url) = env::var("REPLAY_PLAYER_ACTION_URL") {
            config.stream.action_url = url;
        }
        if let Ok(url) = env::var("REPLAY_PLAYER_AUDIO_URL") {
            config.stream.audio_url = url;
        }

        if let Ok(level) = env::var("REPLAY_PLAYER_LOG_LEVEL") {
            config.logging.level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("player.toml");

        let mut manager = ConfigManager::new(path.clone());
        tokio_test::block_on(manager.load()).unwrap();

        assert!(path.exists());
        assert_eq!(manager.get_config(), &AppConfig::default());
    }

    #[tokio::test]
    async fn test_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("player.toml");

        let mut manager = ConfigManager::new(path.clone());
        manager.get_config_mut().playback.frame_rate_hz = 30;
        manager.get_config_mut().logging.level = "debug".to_string();
        manager.save().await.unwrap();

        let mut reloaded = ConfigManager::new(path);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.get_config().playback.frame_rate_hz, 30);
        assert_eq!(reloaded.get_config().logging.level, "debug");
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("player.toml");
        tokio::fs::write(
            &path,
            r#"
[playback]
frame_rate_hz = 0

[stream]
action_url = "ws://localhost/action"
audio_url = "ws://localhost/audio"

[logging]
level = "info"
"#,
        )
        .await
        .unwrap();

        let mut manager = ConfigManager::new(path);
        assert!(matches!(
            manager.load().await,
            Err(PlaybackError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_non_websocket_url() {
        let mut manager = ConfigManager::new(PathBuf::from("unused.toml"));
        assert!(manager.validate().is_ok());

        manager.get_config_mut().stream.audio_url = "udp://127.0.0.1:5000".to_string();
        assert!(manager.validate().is_err());

        manager.get_config_mut().stream.audio_url = "not a url".to_string();
        assert!(manager.validate().is_err());
    }

    #[test]
    fn test_frame_interval() {
        let playback = PlaybackConfig { frame_rate_hz: 50 };
        assert_eq!(playback.frame_interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("REPLAY_PLAYER_FRAME_RATE", "24");
        std::env::set_var("REPLAY_PLAYER_ACTION_URL", "wss://example.org/action");
        std::env::set_var("REPLAY_PLAYER_LOG_LEVEL", "warn");

        let mut config = AppConfig::default();
        EnvConfigOverride::apply_overrides(&mut config);

        std::env::remove_var("REPLAY_PLAYER_FRAME_RATE");
        std::env::remove_var("REPLAY_PLAYER_ACTION_URL");
        std::env::remove_var("REPLAY_PLAYER_LOG_LEVEL");

        assert_eq!(config.playback.frame_rate_hz, 24);
        assert_eq!(config.stream.action_url, "wss://example.org/action");
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.stream.audio_url, StreamConfig::default().audio_url);
    }
}
