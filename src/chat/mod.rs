//! Streamed text chat with Nayla

pub mod client;
mod controller;
pub mod gemini;
pub mod sse;
mod transcript;

pub use client::{ChatClient, ChatConfig, FragmentStream};
pub use controller::{ChatController, ChatUpdate, IgnoreReason, SendOutcome};
pub use gemini::GeminiChatClient;
pub use transcript::{Role, Transcript, TranscriptMessage};
