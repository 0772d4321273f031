//! Live voice sessions
//!
//! This module provides the `LiveSession` controller that manages:
//! - Connecting to the remote live-audio API
//! - Microphone capture and outbound frame delivery
//! - Gapless playback of synthesized speech, with barge-in
//! - Session status for the view

pub mod client;
pub mod gemini;
pub mod messages;
mod session;
mod status;

pub use client::{LiveAudioClient, LiveConfig, LiveConnection, LiveEvent, LiveSender, Speaker};
pub use gemini::GeminiLiveClient;
pub use messages::{ClientMessage, ServerMessage};
pub use session::{LiveError, LiveSession, LiveSessionConfig, SessionSignal};
pub use status::{LiveState, SessionStatus};
