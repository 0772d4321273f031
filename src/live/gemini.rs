// Gemini Live adapter over a WebSocket (BidiGenerateContent)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::client::{LiveAudioClient, LiveConfig, LiveConnection, LiveEvent, LiveSender};
use super::messages::{ClientMessage, LiveSetup, RealtimeInput, ServerMessage};
use crate::codec::MediaBlob;
use crate::config::GeminiConfig;

enum Outbound {
    Text(String),
    Close,
}

pub struct GeminiLiveClient {
    url: String,
    api_key: String,
}

impl GeminiLiveClient {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &GeminiConfig) -> Self {
        Self::new(config.live_url.as_str(), config.api_key.as_str())
    }
}

#[async_trait::async_trait]
impl LiveAudioClient for GeminiLiveClient {
    async fn connect(&self, config: &LiveConfig) -> Result<LiveConnection> {
        if self.api_key.is_empty() {
            bail!("Gemini API key is not configured");
        }

        info!("Connecting to live API (model={})", config.model);

        let url = format!("{}?key={}", self.url, self.api_key);
        let (ws, _) = connect_async(url.as_str())
            .await
            .context("Failed to connect to live API")?;
        let (mut write, mut read) = ws.split();

        let setup = serde_json::to_string(&ClientMessage::Setup(LiveSetup::from_config(config)))?;
        write
            .send(Message::Text(setup))
            .await
            .context("Failed to send live session setup")?;

        info!("Live API connected, waiting for setup to complete");

        let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(64);
        tokio::spawn(async move {
            while let Some(outbound) = out_rx.recv().await {
                match outbound {
                    Outbound::Text(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            warn!("Live socket write failed: {}", e);
                            break;
                        }
                    }
                    Outbound::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        let _ = write.close().await;
                        break;
                    }
                }
            }
            debug!("Live writer task stopped");
        });

        let (event_tx, events) = mpsc::channel(256);
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let payload = match message {
                    Ok(Message::Text(text)) => text.into_bytes(),
                    Ok(Message::Binary(data)) => data,
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|reason| !reason.is_empty());
                        let _ = event_tx.send(LiveEvent::Closed(reason)).await;
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = event_tx.send(LiveEvent::Error(e.to_string())).await;
                        return;
                    }
                };

                match serde_json::from_slice::<ServerMessage>(&payload) {
                    Ok(message) => {
                        if let Some(go_away) = &message.go_away {
                            warn!("Live API will disconnect soon ({:?})", go_away.time_left);
                        }
                        for event in message.into_events() {
                            if event_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => warn!("Failed to parse live message: {}", e),
                }
            }

            let _ = event_tx.send(LiveEvent::Closed(None)).await;
        });

        Ok(LiveConnection {
            sender: Arc::new(GeminiLiveSender {
                tx: out_tx,
                closed: AtomicBool::new(false),
            }),
            events,
        })
    }
}

struct GeminiLiveSender {
    tx: mpsc::Sender<Outbound>,
    closed: AtomicBool,
}

#[async_trait::async_trait]
impl LiveSender for GeminiLiveSender {
    async fn send_realtime_input(&self, blob: MediaBlob) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("Live session is closed");
        }

        let message = ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![blob],
        });
        let text = serde_json::to_string(&message)?;

        self.tx
            .send(Outbound::Text(text))
            .await
            .map_err(|_| anyhow::anyhow!("Live socket writer has stopped"))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Closing live session");
        // The writer may already be gone after a remote close
        let _ = self.tx.send(Outbound::Close).await;
        Ok(())
    }
}
