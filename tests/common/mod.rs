// Shared test doubles: manual-clock playback sink, scripted devices,
// scripted live and chat clients.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use futures::stream::{self, StreamExt};
use nayla::audio::{
    AudioBuffer, AudioDeviceFactory, CaptureBackend, CaptureConfig, CaptureFrame, PlaybackOutput,
    PlaybackSink, VoiceId,
};
use nayla::chat::{ChatClient, FragmentStream};
use nayla::codec::MediaBlob;
use nayla::live::{LiveAudioClient, LiveConfig, LiveConnection, LiveEvent, LiveSender};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Playback

#[derive(Debug, Clone, PartialEq)]
pub struct Played {
    pub id: VoiceId,
    pub start: f64,
    pub duration: f64,
}

#[derive(Debug, Default)]
pub struct SinkState {
    pub now: f64,
    pub next_id: VoiceId,
    pub played: Vec<Played>,
    pub stopped: Vec<VoiceId>,
    pub closes: usize,
}

/// Playback sink whose clock only moves when the test says so
#[derive(Clone)]
pub struct FakeSink {
    pub rate: u32,
    pub state: Arc<Mutex<SinkState>>,
}

impl FakeSink {
    pub fn new(rate: u32) -> Self {
        Self {
            rate,
            state: Arc::new(Mutex::new(SinkState::default())),
        }
    }

    pub fn set_time(&self, now: f64) {
        self.state.lock().unwrap().now = now;
    }

    pub fn played(&self) -> Vec<Played> {
        self.state.lock().unwrap().played.clone()
    }

    pub fn stopped(&self) -> Vec<VoiceId> {
        self.state.lock().unwrap().stopped.clone()
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

impl PlaybackSink for FakeSink {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().now
    }

    fn play(&mut self, buffer: AudioBuffer, start_at: f64) -> Result<VoiceId> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.played.push(Played {
            id,
            start: start_at,
            duration: buffer.duration(),
        });
        Ok(id)
    }

    fn stop(&mut self, id: VoiceId) {
        self.state.lock().unwrap().stopped.push(id);
    }

    fn close(&mut self) {
        self.state.lock().unwrap().closes += 1;
    }
}

/// Base64 PCM16 chunk of `seconds` of silence at `rate`
pub fn speech_chunk(seconds: f64, rate: u32) -> MediaBlob {
    let samples = vec![0.0f32; (seconds * rate as f64).round() as usize];
    MediaBlob::pcm16(&samples, rate)
}

// ---------------------------------------------------------------------------
// Devices

#[derive(Default)]
pub struct CaptureState {
    pub starts: usize,
    pub stops: usize,
    pub frames: Option<mpsc::Sender<CaptureFrame>>,
}

/// Capture backend fed by the test through `CaptureState::frames`
pub struct StubCapture {
    state: Arc<Mutex<CaptureState>>,
}

#[async_trait::async_trait]
impl CaptureBackend for StubCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureFrame>> {
        let (tx, rx) = mpsc::channel(16);
        let mut state = self.state.lock().unwrap();
        state.starts += 1;
        state.frames = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.stops += 1;
        state.frames = None;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.state.lock().unwrap().frames.is_some()
    }

    fn name(&self) -> &str {
        "stub capture"
    }
}

#[derive(Clone)]
pub struct StubDevices {
    pub capture: Arc<Mutex<CaptureState>>,
    pub sink: FakeSink,
    pub finished: Arc<Mutex<Option<mpsc::UnboundedSender<VoiceId>>>>,
    pub deny_microphone: bool,
}

impl StubDevices {
    pub fn new() -> Self {
        Self {
            capture: Arc::new(Mutex::new(CaptureState::default())),
            sink: FakeSink::new(24000),
            finished: Arc::new(Mutex::new(None)),
            deny_microphone: false,
        }
    }

    pub fn denying_microphone() -> Self {
        Self {
            deny_microphone: true,
            ..Self::new()
        }
    }

    pub fn capture_starts(&self) -> usize {
        self.capture.lock().unwrap().starts
    }

    pub fn capture_stops(&self) -> usize {
        self.capture.lock().unwrap().stops
    }

    /// Push one block of samples as if the microphone produced it
    pub async fn speak(&self, samples: Vec<f32>) -> Result<()> {
        let tx = self
            .capture
            .lock()
            .unwrap()
            .frames
            .clone()
            .ok_or_else(|| anyhow!("capture not started"))?;
        tx.send(CaptureFrame {
            samples,
            sample_rate: 16000,
            timestamp_ms: 0,
        })
        .await?;
        Ok(())
    }

    /// Report natural completion of a voice, as the device thread would
    pub fn finish_voice(&self, id: VoiceId) {
        if let Some(tx) = self.finished.lock().unwrap().as_ref() {
            let _ = tx.send(id);
        }
    }
}

impl AudioDeviceFactory for StubDevices {
    fn open_capture(&self, _config: &CaptureConfig) -> Result<Box<dyn CaptureBackend>> {
        if self.deny_microphone {
            bail!("Permission denied");
        }
        Ok(Box::new(StubCapture {
            state: Arc::clone(&self.capture),
        }))
    }

    fn open_playback(&self, _sample_rate: u32) -> Result<PlaybackOutput> {
        let (tx, finished) = mpsc::unbounded_channel();
        *self.finished.lock().unwrap() = Some(tx);
        Ok(PlaybackOutput {
            sink: Box::new(self.sink.clone()),
            finished,
        })
    }
}

// ---------------------------------------------------------------------------
// Live client

#[derive(Default)]
pub struct StubSender {
    pub sent: Mutex<Vec<MediaBlob>>,
    pub closes: AtomicUsize,
    pub fail_sends: bool,
}

impl StubSender {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl LiveSender for StubSender {
    async fn send_realtime_input(&self, blob: MediaBlob) -> Result<()> {
        if self.fail_sends {
            bail!("socket closed");
        }
        self.sent.lock().unwrap().push(blob);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Succeed,
    Reject,
    Hang,
}

pub struct StubLiveClient {
    pub behavior: ConnectBehavior,
    pub connects: AtomicUsize,
    pub sender: Arc<StubSender>,
    pub events: Mutex<Option<mpsc::Sender<LiveEvent>>>,
    pub last_config: Mutex<Option<LiveConfig>>,
}

impl StubLiveClient {
    pub fn new(behavior: ConnectBehavior) -> Self {
        Self {
            behavior,
            connects: AtomicUsize::new(0),
            sender: Arc::new(StubSender::default()),
            events: Mutex::new(None),
            last_config: Mutex::new(None),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Deliver an event on the current connection
    pub async fn emit(&self, event: LiveEvent) -> Result<()> {
        let tx = self
            .events
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("not connected"))?;
        tx.send(event).await?;
        Ok(())
    }

    /// Drop the event channel, as a vanished socket would
    pub fn disconnect(&self) {
        self.events.lock().unwrap().take();
    }
}

#[async_trait::async_trait]
impl LiveAudioClient for StubLiveClient {
    async fn connect(&self, config: &LiveConfig) -> Result<LiveConnection> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last_config.lock().unwrap() = Some(config.clone());

        match self.behavior {
            ConnectBehavior::Reject => bail!("API key not valid"),
            ConnectBehavior::Hang => std::future::pending::<()>().await,
            ConnectBehavior::Succeed => {}
        }

        let (tx, events) = mpsc::channel(16);
        *self.events.lock().unwrap() = Some(tx);
        Ok(LiveConnection {
            sender: Arc::clone(&self.sender) as Arc<dyn LiveSender>,
            events,
        })
    }
}

// ---------------------------------------------------------------------------
// Chat client

/// Chat client replaying one scripted reply per call
#[derive(Default)]
pub struct StubChatClient {
    replies: Mutex<VecDeque<Result<FragmentStream>>>,
    pub calls: AtomicUsize,
}

impl StubChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, fragments: Vec<Result<String>>) -> Self {
        self.push(Ok(stream::iter(fragments).boxed()))
    }

    pub fn push(self, reply: Result<FragmentStream>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChatClient for StubChatClient {
    async fn send_message(&self, message: &str) -> Result<String> {
        let mut reply = String::new();
        let mut fragments = self.send_message_stream(message).await?;
        while let Some(fragment) = fragments.next().await {
            reply.push_str(&fragment?);
        }
        Ok(reply)
    }

    async fn send_message_stream(&self, _message: &str) -> Result<FragmentStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted reply")))
    }
}

/// Stream whose fragments arrive only when the test sends them
pub fn gated_stream() -> (mpsc::UnboundedSender<Result<String>>, FragmentStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let fragments = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed();
    (tx, fragments)
}

/// Poll `check` until it holds or a second passes
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    check()
}
