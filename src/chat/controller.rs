use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures::StreamExt;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

use super::client::ChatClient;
use super::transcript::{Role, Transcript};
use crate::persona;

/// Why a message was not sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Empty or whitespace-only input
    Empty,
    /// Another reply is still streaming
    Busy,
}

/// Result of [`ChatController::send_message`]
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Ignored(IgnoreReason),
    /// The reply streamed to completion
    Completed { reply: String },
    /// The reply failed; the fallback apology was shown
    Failed { reason: String },
}

/// Transcript changes, for views rendering the conversation live
#[derive(Debug, Clone, PartialEq)]
pub enum ChatUpdate {
    UserMessage { index: usize, text: String },
    AssistantStarted { index: usize },
    Fragment { index: usize, text: String },
    Completed { index: usize },
    /// Fallback text was placed at `index`
    Failed { index: usize, text: String },
}

/// Single-flight streamed text chat over a [`ChatClient`]
pub struct ChatController {
    client: Arc<dyn ChatClient>,
    transcript: RwLock<Transcript>,
    in_flight: AtomicBool,
    stream_idle_timeout: Duration,
    updates: broadcast::Sender<ChatUpdate>,
}

/// Clears the in-flight flag however the send ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ChatController {
    pub fn new(client: Arc<dyn ChatClient>, stream_idle_timeout: Duration) -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            client,
            transcript: RwLock::new(Transcript::with_greeting()),
            in_flight: AtomicBool::new(false),
            stream_idle_timeout,
            updates,
        }
    }

    /// Send a user message and stream the reply into the transcript
    pub async fn send_message(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored(IgnoreReason::Empty);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Message ignored, a reply is still streaming");
            return SendOutcome::Ignored(IgnoreReason::Busy);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let index = self.transcript.write().await.push(Role::User, text);
        self.notify(ChatUpdate::UserMessage {
            index,
            text: text.to_string(),
        });

        let mut placeholder = None;
        match self.stream_reply(text, &mut placeholder).await {
            Ok(reply) => {
                info!("Reply complete ({} chars)", reply.len());
                if let Some(index) = placeholder {
                    self.notify(ChatUpdate::Completed { index });
                }
                SendOutcome::Completed { reply }
            }
            Err(e) => {
                error!("Chat reply failed: {:#}", e);
                self.show_fallback(placeholder).await;
                SendOutcome::Failed {
                    reason: format!("{:#}", e),
                }
            }
        }
    }

    async fn stream_reply(&self, text: &str, placeholder: &mut Option<usize>) -> Result<String> {
        let mut fragments = self.client.send_message_stream(text).await?;

        let index = self.transcript.write().await.push(Role::Assistant, "");
        *placeholder = Some(index);
        self.notify(ChatUpdate::AssistantStarted { index });

        let mut reply = String::new();
        loop {
            let next = tokio::time::timeout(self.stream_idle_timeout, fragments.next())
                .await
                .map_err(|_| anyhow!("no reply fragment within {:?}", self.stream_idle_timeout))?;

            let fragment = match next {
                Some(fragment) => fragment?,
                None => break,
            };

            self.transcript.write().await.append_text(index, &fragment);
            reply.push_str(&fragment);
            self.notify(ChatUpdate::Fragment {
                index,
                text: fragment,
            });
        }

        Ok(reply)
    }

    async fn show_fallback(&self, placeholder: Option<usize>) {
        let mut transcript = self.transcript.write().await;

        let index = match placeholder {
            Some(index) if transcript.fill_if_empty(index, persona::FALLBACK_REPLY) => index,
            _ => transcript.push(Role::Assistant, persona::FALLBACK_REPLY),
        };
        drop(transcript);

        self.notify(ChatUpdate::Failed {
            index,
            text: persona::FALLBACK_REPLY.to_string(),
        });
    }

    fn notify(&self, update: ChatUpdate) {
        // No subscribers is fine
        let _ = self.updates.send(update);
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Snapshot of the conversation
    pub async fn transcript(&self) -> Transcript {
        self.transcript.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatUpdate> {
        self.updates.subscribe()
    }

    /// Whether the suggested prompts should be offered
    pub async fn suggestions_visible(&self, is_live: bool) -> bool {
        persona::suggestions_visible(is_live, self.transcript.read().await.len())
    }
}
