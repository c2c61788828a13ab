use std::path::PathBuf;
use std::time::Duration;

use eyre::Result;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub default_lang: String,
    pub bind: String,
    pub clip_dir: PathBuf,
    pub work_dir: PathBuf,
    pub cookie_file: Option<PathBuf>,
    pub video_codec: String,
    pub audio_codec: String,
    pub clip_extension: String,
    pub ffmpeg: String,
    pub yt_dlp: String,
    pub external_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub clip_retention_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_lang: "en".to_string(),
            bind: "127.0.0.1:5000".to_string(),
            clip_dir: PathBuf::from("clips"),
            work_dir: std::env::temp_dir().join("ytclip"),
            cookie_file: None,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            clip_extension: "mp4".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            yt_dlp: "yt-dlp".to_string(),
            external_timeout_secs: 600,
            http_timeout_secs: 30,
            clip_retention_secs: 3600,
        }
    }
}

impl Config {
    /// Load config from ~/.config/ytclip/config.toml if it exists
    pub fn load() -> Result<Self> {
        let path = config_path();
        if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            debug!("No config file found at {}", path.display());
            Ok(Config::default())
        }
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn clip_retention(&self) -> Duration {
        Duration::from_secs(self.clip_retention_secs)
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("ytclip")
        .join("config.toml")
}
