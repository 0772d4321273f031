pub mod audio;
pub mod chat;
pub mod codec;
pub mod config;
pub mod gemini;
pub mod live;
pub mod persona;

pub use audio::{
    AudioBackendFactory, AudioBuffer, AudioDeviceFactory, AudioSink, AudioSource, CaptureBackend,
    CaptureConfig, CaptureFrame, PlaybackScheduler, PlaybackSink,
};
pub use chat::{
    ChatClient, ChatConfig, ChatController, ChatUpdate, GeminiChatClient, SendOutcome, Transcript,
    TranscriptMessage,
};
pub use codec::{CodecError, MediaBlob};
pub use config::Config;
pub use live::{
    GeminiLiveClient, LiveAudioClient, LiveError, LiveEvent, LiveSession, LiveSessionConfig,
    LiveState, SessionStatus,
};
