use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::codec::MediaBlob;
use crate::gemini::Modality;
use crate::persona;

/// Connect-time configuration of a live session
#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    pub model: String,
    pub system_instruction: String,
    pub voice_name: String,
    pub response_modality: Modality,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            system_instruction: persona::SYSTEM_INSTRUCTION.to_string(),
            voice_name: persona::DEFAULT_VOICE.to_string(),
            response_modality: Modality::Audio,
        }
    }
}

/// Which side of the conversation a transcription belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

/// Inbound signal from a live session
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Session setup finished; the remote side accepts audio
    Open,
    /// Synthesized speech (base64 PCM16, 24kHz mono)
    Audio(MediaBlob),
    /// Barge-in: stop local playback now
    Interrupted,
    /// The model finished its turn
    TurnComplete,
    /// Speech transcription, when the service provides it
    Transcription { speaker: Speaker, text: String },
    /// Remote error; the session is unusable
    Error(String),
    /// Remote close, with the reason if one was given
    Closed(Option<String>),
}

/// Outbound half of an open live session
#[async_trait::async_trait]
pub trait LiveSender: Send + Sync {
    /// Send one realtime audio frame
    async fn send_realtime_input(&self, blob: MediaBlob) -> Result<()>;

    /// Close the session. Closing a closed session is a no-op.
    async fn close(&self) -> Result<()>;
}

/// A connected live session
pub struct LiveConnection {
    pub sender: Arc<dyn LiveSender>,
    pub events: mpsc::Receiver<LiveEvent>,
}

/// Remote live-audio API
#[async_trait::async_trait]
pub trait LiveAudioClient: Send + Sync {
    async fn connect(&self, config: &LiveConfig) -> Result<LiveConnection>;
}
