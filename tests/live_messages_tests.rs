use nayla::codec::MediaBlob;
use nayla::live::messages::{ClientMessage, LiveSetup, RealtimeInput, ServerMessage};
use nayla::live::{LiveConfig, LiveEvent, Speaker};

#[test]
fn test_setup_serialization() {
    let config = LiveConfig {
        model: "models/custom-live".to_string(),
        voice_name: "Puck".to_string(),
        ..LiveConfig::default()
    };

    let json = serde_json::to_string(&ClientMessage::Setup(LiveSetup::from_config(&config))).unwrap();
    assert!(json.contains("\"model\":\"models/custom-live\""));
    assert!(json.contains("\"responseModalities\":[\"AUDIO\"]"));
    assert!(json.contains("\"voiceName\":\"Puck\""));
    assert!(!json.contains("temperature"));
}

#[test]
fn test_realtime_input_carries_frame() {
    let frame = MediaBlob::pcm16(&[0.5; 4096], 16000);
    let json = serde_json::to_value(ClientMessage::RealtimeInput(RealtimeInput {
        media_chunks: vec![frame.clone()],
    }))
    .unwrap();

    let chunk: MediaBlob =
        serde_json::from_value(json["realtimeInput"]["mediaChunks"][0].clone()).unwrap();
    assert_eq!(chunk, frame);
}

#[test]
fn test_multi_part_turn_keeps_order() {
    let json = r#"{
        "serverContent": {
            "modelTurn": {
                "role": "model",
                "parts": [
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AQA="}},
                    {"text": "thinking"},
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AgA="}}
                ]
            }
        }
    }"#;

    let events = serde_json::from_str::<ServerMessage>(json).unwrap().into_events();
    let data: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            LiveEvent::Audio(blob) => Some(blob.data.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(data, vec!["AQA=", "AgA="]);
}

#[test]
fn test_input_transcription_is_user_speech() {
    let json = r#"{"serverContent": {"inputTranscription": {"text": "halo Nayla"}}}"#;

    let events = serde_json::from_str::<ServerMessage>(json).unwrap().into_events();
    assert_eq!(
        events,
        vec![LiveEvent::Transcription {
            speaker: Speaker::User,
            text: "halo Nayla".to_string(),
        }]
    );
}

#[test]
fn test_go_away_produces_no_event() {
    let msg: ServerMessage = serde_json::from_str(r#"{"goAway": {"timeLeft": "10s"}}"#).unwrap();
    assert_eq!(
        msg.go_away.as_ref().and_then(|g| g.time_left.as_deref()),
        Some("10s")
    );
    assert!(msg.into_events().is_empty());
}
