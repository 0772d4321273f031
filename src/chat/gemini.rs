// Gemini REST adapter: generateContent / streamGenerateContent (SSE)

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::client::{ChatClient, ChatConfig, FragmentStream};
use super::sse::SseDecoder;
use crate::config::GeminiConfig;
use crate::gemini::{
    ApiErrorBody, Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
};

/// Chat session against the Gemini REST API
///
/// Holds the conversation history; each completed exchange is appended so
/// later messages carry the full context.
pub struct GeminiChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    config: ChatConfig,
    history: Arc<Mutex<Vec<Content>>>,
}

impl GeminiChatClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, config: ChatConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            config,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_config(gemini: &GeminiConfig, config: ChatConfig) -> Self {
        Self::new(gemini.base_url.as_str(), gemini.api_key.as_str(), config)
    }

    /// Completed exchanges so far
    pub async fn history(&self) -> Vec<Content> {
        self.history.lock().await.clone()
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.config.model, method)
    }

    async fn build_request(&self, message: &str) -> GenerateContentRequest {
        let mut contents = self.history.lock().await.clone();
        contents.push(Content::user(message));

        GenerateContentRequest {
            contents,
            system_instruction: Some(Content::instruction(self.config.system_instruction.as_str())),
            generation_config: Some(GenerationConfig {
                temperature: Some(self.config.temperature),
                top_p: Some(self.config.top_p),
                ..Default::default()
            }),
        }
    }

    async fn post(&self, url: &str, query: &[(&str, &str)], message: &str) -> Result<reqwest::Response> {
        if self.api_key.is_empty() {
            bail!("Gemini API key is not configured");
        }

        let body = self.build_request(message).await;
        let response = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .query(query)
            .json(&body)
            .send()
            .await
            .context("Failed to reach Gemini API")?;

        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    bail!("Gemini API returned {}: {}", status, message)
}

#[async_trait::async_trait]
impl ChatClient for GeminiChatClient {
    async fn send_message(&self, message: &str) -> Result<String> {
        let url = self.endpoint("generateContent");
        let response = self.post(&url, &[], message).await?;

        let reply: GenerateContentResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;
        let text = reply.text();

        let mut history = self.history.lock().await;
        history.push(Content::user(message));
        history.push(Content::model(text.as_str()));

        Ok(text)
    }

    async fn send_message_stream(&self, message: &str) -> Result<FragmentStream> {
        let url = self.endpoint("streamGenerateContent");
        let response = self.post(&url, &[("alt", "sse")], message).await?;

        info!("Streaming reply from {}", self.config.model);

        let state = ReplyStream {
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            reply: String::new(),
            message: message.to_string(),
            history: Arc::clone(&self.history),
            done: false,
        };

        Ok(stream::unfold(state, ReplyStream::next_fragment).boxed())
    }
}

struct ReplyStream {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    reply: String,
    message: String,
    history: Arc<Mutex<Vec<Content>>>,
    done: bool,
}

impl ReplyStream {
    async fn next_fragment(mut self) -> Option<(Result<String>, Self)> {
        loop {
            if let Some(fragment) = self.pending.pop_front() {
                return Some((Ok(fragment), self));
            }
            if self.done {
                return None;
            }

            let events = match self.body.next().await {
                Some(Ok(bytes)) => self.decoder.push(&bytes),
                Some(Err(e)) => {
                    self.done = true;
                    return Some((Err(anyhow!(e).context("Reply stream interrupted")), self));
                }
                None => {
                    self.done = true;
                    let tail: Vec<String> = self.decoder.finish().into_iter().collect();
                    if let Err(e) = self.ingest(&tail) {
                        return Some((Err(e), self));
                    }
                    self.commit().await;
                    continue;
                }
            };

            if let Err(e) = self.ingest(&events) {
                self.done = true;
                return Some((Err(e), self));
            }
        }
    }

    fn ingest(&mut self, events: &[String]) -> Result<()> {
        for event in events {
            let chunk: GenerateContentResponse =
                serde_json::from_str(event).context("Malformed stream event")?;
            let text = chunk.text();
            if !text.is_empty() {
                self.reply.push_str(&text);
                self.pending.push_back(text);
            }
        }
        Ok(())
    }

    async fn commit(&mut self) {
        debug!("Reply complete ({} chars)", self.reply.len());
        let mut history = self.history.lock().await;
        history.push(Content::user(self.message.as_str()));
        history.push(Content::model(self.reply.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_carries_history_and_persona() {
        let client = GeminiChatClient::new("https://example.test/v1beta/", "k", ChatConfig::default());
        client.history.lock().await.push(Content::user("earlier"));

        let request = client.build_request("Halo").await;
        assert_eq!(request.contents.len(), 2);
        assert_eq!(request.contents[1].joined_text(), "Halo");

        let config = request.generation_config.unwrap();
        assert_eq!(config.temperature, Some(0.8));
        assert_eq!(config.top_p, Some(0.95));
        assert!(request.system_instruction.unwrap().joined_text().contains("Nayla"));
    }

    #[test]
    fn endpoint_uses_model() {
        let client = GeminiChatClient::new("https://example.test/v1beta/", "k", ChatConfig::default());
        assert_eq!(
            client.endpoint("generateContent"),
            "https://example.test/v1beta/models/gemini-3-flash-preview:generateContent"
        );
    }

    fn sse_body(events: &[&str]) -> BoxStream<'static, reqwest::Result<Vec<u8>>> {
        let bytes: Vec<reqwest::Result<Vec<u8>>> = events
            .iter()
            .map(|e| Ok(format!("data: {}\r\n\r\n", e).into_bytes()))
            .collect();
        stream::iter(bytes).boxed()
    }

    #[tokio::test]
    async fn streamed_reply_commits_history_on_end() {
        let history = Arc::new(Mutex::new(Vec::new()));
        let state = ReplyStream {
            body: sse_body(&[
                r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hal"}]}}]}"#,
                r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"o!"}]}}]}"#,
            ]),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            reply: String::new(),
            message: "Halo".to_string(),
            history: Arc::clone(&history),
            done: false,
        };

        // Spawning requires the stream to be Send
        let fragments: FragmentStream = stream::unfold(state, ReplyStream::next_fragment).boxed();
        let collected = tokio::spawn(fragments.collect::<Vec<_>>()).await.unwrap();
        let texts: Vec<String> = collected.into_iter().map(|f| f.unwrap()).collect();
        assert_eq!(texts, vec!["Hal", "o!"]);

        let history = history.lock().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].joined_text(), "Halo");
        assert_eq!(history[1].joined_text(), "Halo!");
    }

    #[tokio::test]
    async fn missing_key_fails_before_request() {
        let client = GeminiChatClient::new("https://example.test", "", ChatConfig::default());
        assert!(client.send_message_stream("Halo").await.is_err());
        assert!(client.history().await.is_empty());
    }
}
