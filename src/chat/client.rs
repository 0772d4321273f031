use anyhow::Result;
use futures::stream::BoxStream;

use crate::config::Config;
use crate::persona;

/// Reply text arriving piece by piece; the concatenation is the full reply
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Persona configuration fixed when the chat is created
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub model: String,
    pub system_instruction: String,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "gemini-3-flash-preview".to_string(),
            system_instruction: persona::SYSTEM_INSTRUCTION.to_string(),
            temperature: 0.8,
            top_p: 0.95,
        }
    }
}

impl ChatConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            model: cfg.gemini.chat_model.clone(),
            temperature: cfg.gemini.temperature,
            top_p: cfg.gemini.top_p,
            ..Self::default()
        }
    }
}

/// Remote text-chat API holding one conversation
#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a message and wait for the complete reply
    async fn send_message(&self, message: &str) -> Result<String>;

    /// Send a message and stream the reply
    async fn send_message_stream(&self, message: &str) -> Result<FragmentStream>;
}
