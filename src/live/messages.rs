use serde::{Deserialize, Serialize};

use super::client::{LiveConfig, LiveEvent, Speaker};
use crate::codec::MediaBlob;
use crate::gemini::{Content, GenerationConfig, SpeechConfig};

/// Message sent to the live API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(LiveSetup),
    RealtimeInput(RealtimeInput),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSetup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

impl LiveSetup {
    pub fn from_config(config: &LiveConfig) -> Self {
        let model = if config.model.starts_with("models/") {
            config.model.clone()
        } else {
            format!("models/{}", config.model)
        };

        Self {
            model,
            generation_config: GenerationConfig {
                response_modalities: Some(vec![config.response_modality]),
                speech_config: Some(SpeechConfig::prebuilt(config.voice_name.as_str())),
                ..Default::default()
            },
            system_instruction: Some(Content::instruction(config.system_instruction.as_str())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaBlob>,
}

/// Message received from the live API
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

impl ServerMessage {
    /// Split into session events: setup, then audio, then interruption,
    /// then transcriptions and turn completion.
    pub fn into_events(self) -> Vec<LiveEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(LiveEvent::Open);
        }

        if let Some(content) = self.server_content {
            let audio = content
                .model_turn
                .into_iter()
                .flat_map(|turn| turn.parts)
                .filter_map(|part| part.inline_data)
                .filter(|blob| !blob.data.is_empty());
            events.extend(audio.map(LiveEvent::Audio));

            if content.interrupted {
                events.push(LiveEvent::Interrupted);
            }

            let transcriptions = [
                (Speaker::User, content.input_transcription),
                (Speaker::Assistant, content.output_transcription),
            ];
            for (speaker, transcription) in transcriptions {
                if let Some(t) = transcription.filter(|t| !t.text.is_empty()) {
                    events.push(LiveEvent::Transcription {
                        speaker,
                        text: t.text,
                    });
                }
            }

            if content.turn_complete {
                events.push(LiveEvent::TurnComplete);
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_message_shape() {
        let msg = ClientMessage::Setup(LiveSetup::from_config(&LiveConfig::default()));
        let json = serde_json::to_value(&msg).unwrap();

        let setup = &json["setup"];
        assert_eq!(
            setup["model"],
            "models/gemini-2.5-flash-native-audio-preview-12-2025"
        );
        assert_eq!(setup["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Zephyr"
        );
        assert!(setup["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Nayla"));
    }

    #[test]
    fn realtime_input_shape() {
        let msg = ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaBlob::pcm16(&[0.0; 4], 16000)],
        });
        let json = serde_json::to_value(&msg).unwrap();

        let chunk = &json["realtimeInput"]["mediaChunks"][0];
        assert_eq!(chunk["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(chunk["data"], "AAAAAAAAAAA=");
    }

    #[test]
    fn setup_complete_opens() {
        let msg: ServerMessage = serde_json::from_str(r#"{"setupComplete": {}}"#).unwrap();
        assert_eq!(msg.into_events(), vec![LiveEvent::Open]);
    }

    #[test]
    fn audio_and_interrupt_in_order() {
        let json = r#"{
            "serverContent": {
                "modelTurn": {"parts": [{"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAA="}}]},
                "interrupted": true
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        let events = msg.into_events();

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], LiveEvent::Audio(blob) if blob.data == "AAA="));
        assert_eq!(events[1], LiveEvent::Interrupted);
    }

    #[test]
    fn transcription_and_turn_complete() {
        let json = r#"{
            "serverContent": {
                "outputTranscription": {"text": "Halo"},
                "turnComplete": true
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();

        assert_eq!(
            msg.into_events(),
            vec![
                LiveEvent::Transcription {
                    speaker: Speaker::Assistant,
                    text: "Halo".to_string()
                },
                LiveEvent::TurnComplete
            ]
        );
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"usageMetadata": {"totalTokenCount": 3}}"#).unwrap();
        assert!(msg.into_events().is_empty());
    }
}
