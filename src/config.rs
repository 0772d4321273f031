use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::persona;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub audio: AudioConfig,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    /// REST endpoint for text chat
    pub base_url: String,
    /// WebSocket endpoint for live audio
    pub live_url: String,
    pub chat_model: String,
    pub live_model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub voice_name: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            live_url: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string(),
            chat_model: "gemini-3-flash-preview".to_string(),
            live_model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            temperature: 0.8,
            top_p: 0.95,
            voice_name: persona::DEFAULT_VOICE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Microphone rate expected by the live API
    pub capture_sample_rate: u32,
    /// Rate of synthesized speech from the live API
    pub playback_sample_rate: u32,
    /// Samples per outbound frame
    pub frame_size: usize,
    /// Outbound frames buffered before the oldest is dropped
    pub outbound_queue_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: 16000,
            playback_sample_rate: 24000,
            frame_size: 4096,
            outbound_queue_capacity: 32,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Live session connect timeout
    pub connect_secs: u64,
    /// Maximum wait for the next streamed chat fragment
    pub stream_idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 15,
            stream_idle_secs: 60,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn stream_idle(&self) -> Duration {
        Duration::from_secs(self.stream_idle_secs)
    }
}

impl Config {
    /// Load `path` (any format the `config` crate understands, optional)
    /// layered under `NAYLA_*` environment variables, e.g.
    /// `NAYLA_GEMINI__API_KEY`.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("NAYLA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: Config = settings.try_deserialize()?;

        if cfg.gemini.api_key.is_empty() {
            cfg.gemini.api_key = ["GEMINI_API_KEY", "API_KEY"]
                .iter()
                .find_map(|var| std::env::var(var).ok())
                .unwrap_or_default();
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_live_api_formats() {
        let cfg = Config::default();
        assert_eq!(cfg.audio.capture_sample_rate, 16000);
        assert_eq!(cfg.audio.playback_sample_rate, 24000);
        assert_eq!(cfg.audio.frame_size, 4096);
        assert_eq!(cfg.gemini.voice_name, "Zephyr");
        assert_eq!(cfg.timeouts.connect(), Duration::from_secs(15));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() -> Result<()> {
        let cfg = Config::load("/nonexistent/nayla-config")?;
        assert_eq!(cfg.gemini.temperature, 0.8);
        assert_eq!(cfg.audio.outbound_queue_capacity, 32);
        Ok(())
    }
}
