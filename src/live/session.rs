use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::client::{LiveAudioClient, LiveConfig, LiveConnection, LiveEvent, LiveSender, Speaker};
use super::status::{LiveState, SessionStatus};
use crate::audio::{
    AudioDeviceFactory, CaptureBackend, CaptureConfig, CapturePipeline, CaptureStats,
    PlaybackOutput, PlaybackScheduler, VoiceId,
};
use crate::codec::MediaBlob;
use crate::config::Config;
use crate::persona;

/// Why a live session could not be started
#[derive(Debug, Error)]
pub enum LiveError {
    #[error("audio device unavailable: {0:#}")]
    Device(anyhow::Error),

    #[error("live session rejected: {0:#}")]
    Connect(anyhow::Error),

    #[error("live session did not open within {0:?}")]
    Timeout(Duration),
}

impl LiveError {
    /// Text to show the user
    pub fn user_notice(&self) -> &'static str {
        persona::VOICE_START_FAILED
    }
}

/// Configuration for a live session controller
#[derive(Debug, Clone)]
pub struct LiveSessionConfig {
    pub live: LiveConfig,
    pub capture: CaptureConfig,
    /// Rate inbound speech is decoded at
    pub playback_sample_rate: u32,
    /// Outbound frames buffered before the oldest is dropped
    pub outbound_queue_capacity: usize,
    /// Limit on the whole open: handshake, setup and the remote's open signal
    pub connect_timeout: Duration,
}

impl Default for LiveSessionConfig {
    fn default() -> Self {
        Self {
            live: LiveConfig::default(),
            capture: CaptureConfig::default(),
            playback_sample_rate: 24000,
            outbound_queue_capacity: 32,
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl LiveSessionConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            live: LiveConfig {
                model: cfg.gemini.live_model.clone(),
                voice_name: cfg.gemini.voice_name.clone(),
                ..LiveConfig::default()
            },
            capture: CaptureConfig {
                sample_rate: cfg.audio.capture_sample_rate,
                frame_size: cfg.audio.frame_size,
            },
            playback_sample_rate: cfg.audio.playback_sample_rate,
            outbound_queue_capacity: cfg.audio.outbound_queue_capacity,
            connect_timeout: cfg.timeouts.connect(),
        }
    }
}

/// Resources owned by one open (or opening) session
struct ActiveSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    sender: Arc<dyn LiveSender>,
    events: mpsc::Receiver<LiveEvent>,
    capture: Box<dyn CaptureBackend>,
    pipeline: Option<CapturePipeline>,
    playback: PlaybackScheduler,
    finished: mpsc::UnboundedReceiver<VoiceId>,
    stats: Arc<CaptureStats>,
    chunks_scheduled: u64,
    /// The remote must signal open before this instant
    open_deadline: Instant,
}

/// Something the session needs to react to, see [`LiveSession::next_signal`]
#[derive(Debug)]
pub enum SessionSignal {
    /// Remote event; `None` when the connection's event stream ended
    Remote(Option<LiveEvent>),
    PlaybackFinished(VoiceId),
    /// The remote accepted the connection but never signalled open
    OpenTimedOut,
}

/// Controller for the single bidirectional voice session
///
/// Owns the remote connection, the capture backend and the playback
/// scheduler of the current session. All state changes happen through
/// `&mut self` on the task that owns the controller; device and socket
/// tasks only feed it through channels.
pub struct LiveSession {
    client: Arc<dyn LiveAudioClient>,
    devices: Arc<dyn AudioDeviceFactory>,
    config: LiveSessionConfig,
    state: LiveState,
    active: Option<ActiveSession>,
    last_error: Option<String>,
    status_tx: watch::Sender<SessionStatus>,
}

impl LiveSession {
    pub fn new(
        client: Arc<dyn LiveAudioClient>,
        devices: Arc<dyn AudioDeviceFactory>,
        config: LiveSessionConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::default());
        Self {
            client,
            devices,
            config,
            state: LiveState::Idle,
            active: None,
            last_error: None,
            status_tx,
        }
    }

    pub fn state(&self) -> LiveState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state == LiveState::Open
    }

    pub fn is_speaking(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.playback.is_speaking())
    }

    /// Number of playback handles currently active
    pub fn active_playback_count(&self) -> usize {
        self.active
            .as_ref()
            .map_or(0, |active| active.playback.active_count())
    }

    /// Current status snapshot
    pub fn status(&self) -> SessionStatus {
        let mut status = SessionStatus {
            state: self.state,
            speaking: self.is_speaking(),
            last_error: self.last_error.clone(),
            ..SessionStatus::default()
        };

        if let Some(active) = &self.active {
            status.session_id = Some(active.id.to_string());
            status.started_at = Some(active.started_at);
            status.frames_sent = active.stats.frames_sent.load(Ordering::Relaxed);
            status.frames_dropped = active.stats.frames_dropped.load(Ordering::Relaxed);
            status.chunks_scheduled = active.chunks_scheduled;
        }

        status
    }

    /// Watch status changes
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }

    fn set_state(&mut self, state: LiveState) {
        if self.state != state {
            debug!("Live session state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
        self.publish();
    }

    /// Start a live session.
    ///
    /// A no-op while a session is connecting or open. On failure every
    /// acquired resource is released and the controller returns to `Idle`.
    pub async fn start(&mut self) -> Result<(), LiveError> {
        if matches!(self.state, LiveState::Connecting | LiveState::Open) {
            warn!("Live session already active");
            return Ok(());
        }

        info!("Starting live session");
        self.last_error = None;
        self.set_state(LiveState::Connecting);

        match self.acquire().await {
            Ok(active) => {
                info!("Live session {} connected", active.id);
                self.active = Some(active);
                self.publish();
                Ok(())
            }
            Err(e) => {
                error!("Failed to start live session: {}", e);
                self.last_error = Some(e.to_string());
                self.set_state(LiveState::Idle);
                Err(e)
            }
        }
    }

    async fn acquire(&self) -> Result<ActiveSession, LiveError> {
        let open_deadline = Instant::now() + self.config.connect_timeout;
        let mut capture = self
            .devices
            .open_capture(&self.config.capture)
            .map_err(LiveError::Device)?;

        let PlaybackOutput { sink, finished } =
            match self.devices.open_playback(self.config.playback_sample_rate) {
                Ok(output) => output,
                Err(e) => {
                    release_capture(capture.as_mut()).await;
                    return Err(LiveError::Device(e));
                }
            };
        let mut playback = PlaybackScheduler::new(sink);

        let connected =
            tokio::time::timeout_at(open_deadline, self.client.connect(&self.config.live)).await;

        let LiveConnection { sender, events } = match connected {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                release_capture(capture.as_mut()).await;
                playback.close();
                return Err(LiveError::Connect(e));
            }
            Err(_) => {
                release_capture(capture.as_mut()).await;
                playback.close();
                return Err(LiveError::Timeout(self.config.connect_timeout));
            }
        };

        Ok(ActiveSession {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            sender,
            events,
            capture,
            pipeline: None,
            playback,
            finished,
            stats: Arc::new(CaptureStats::default()),
            chunks_scheduled: 0,
            open_deadline,
        })
    }

    /// Stop the session and release everything. Safe from any state,
    /// including when nothing was ever started.
    pub async fn stop(&mut self) {
        if self.active.is_some() {
            info!("Stopping live session");
        }
        self.teardown(LiveState::Idle).await;
    }

    async fn teardown(&mut self, next: LiveState) {
        if let Some(mut active) = self.active.take() {
            if let Some(pipeline) = active.pipeline.take() {
                pipeline.shutdown();
            }
            release_capture(active.capture.as_mut()).await;
            if let Err(e) = active.sender.close().await {
                warn!("Failed to close live session: {:#}", e);
            }
            active.playback.close();

            info!(
                "Live session {} ended (frames sent={}, dropped={}, chunks played={})",
                active.id,
                active.stats.frames_sent.load(Ordering::Relaxed),
                active.stats.frames_dropped.load(Ordering::Relaxed),
                active.chunks_scheduled
            );
        }
        self.set_state(next);
    }

    /// Wait for the next remote event or playback completion and apply it.
    ///
    /// Returns `false` when there is no session to wait on.
    pub async fn process_next(&mut self) -> bool {
        match self.next_signal().await {
            Some(signal) => {
                self.apply(signal).await;
                true
            }
            None => false,
        }
    }

    /// Wait for the next signal without applying it.
    ///
    /// Cancel safe: dropping the future loses nothing, so it can sit in a
    /// `select!` next to shutdown triggers. Returns `None` when there is no
    /// session to wait on.
    pub async fn next_signal(&mut self) -> Option<SessionSignal> {
        let connecting = self.state == LiveState::Connecting;
        let active = self.active.as_mut()?;

        Some(tokio::select! {
            event = active.events.recv() => SessionSignal::Remote(event),
            Some(id) = active.finished.recv() => SessionSignal::PlaybackFinished(id),
            _ = tokio::time::sleep_until(active.open_deadline), if connecting => {
                SessionSignal::OpenTimedOut
            }
        })
    }

    /// Apply a signal returned by [`next_signal`](Self::next_signal)
    pub async fn apply(&mut self, signal: SessionSignal) {
        match signal {
            SessionSignal::Remote(Some(event)) => self.handle_event(event).await,
            SessionSignal::Remote(None) => self.handle_event(LiveEvent::Closed(None)).await,
            SessionSignal::PlaybackFinished(id) => self.on_playback_finished(id),
            SessionSignal::OpenTimedOut => self.on_open_timeout().await,
        }
    }

    /// Apply one remote event
    pub async fn handle_event(&mut self, event: LiveEvent) {
        match event {
            LiveEvent::Open => self.on_open().await,
            LiveEvent::Audio(chunk) => self.on_audio(&chunk),
            LiveEvent::Interrupted => self.on_interrupted(),
            LiveEvent::TurnComplete => debug!("Model turn complete"),
            LiveEvent::Transcription { speaker, text } => match speaker {
                Speaker::User => debug!("You: {}", text),
                Speaker::Assistant => debug!("Nayla: {}", text),
            },
            LiveEvent::Error(message) => {
                error!("Live session error: {}", message);
                self.last_error = Some(message);
                self.teardown(LiveState::Closed).await;
            }
            LiveEvent::Closed(reason) => {
                info!("Live session closed by remote ({})", reason.as_deref().unwrap_or("no reason"));
                self.teardown(LiveState::Closed).await;
            }
        }
    }

    /// Apply a playback completion
    pub fn on_playback_finished(&mut self, id: VoiceId) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.playback.on_finished(id) {
            self.publish();
        }
    }

    async fn on_open(&mut self) {
        if self.state != LiveState::Connecting {
            warn!("Ignoring open signal in state {:?}", self.state);
            return;
        }
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let frames = match active.capture.start().await {
            Ok(frames) => frames,
            Err(e) => {
                error!("Failed to start audio capture: {:#}", e);
                self.last_error = Some(format!("{:#}", e));
                self.teardown(LiveState::Idle).await;
                return;
            }
        };

        info!("Live session open, streaming from {}", active.capture.name());
        active.pipeline = Some(CapturePipeline::spawn(
            frames,
            self.config.capture.frame_size,
            self.config.capture.sample_rate,
            self.config.outbound_queue_capacity,
            Arc::clone(&active.sender),
            Arc::clone(&active.stats),
        ));

        self.set_state(LiveState::Open);
    }

    async fn on_open_timeout(&mut self) {
        if self.state != LiveState::Connecting {
            return;
        }
        let err = LiveError::Timeout(self.config.connect_timeout);
        error!("Failed to start live session: {}", err);
        self.last_error = Some(err.to_string());
        self.teardown(LiveState::Idle).await;
    }

    fn on_audio(&mut self, chunk: &MediaBlob) {
        let Some(active) = self.active.as_mut() else {
            debug!("Dropping audio received without a session");
            return;
        };

        match active.playback.schedule_chunk(chunk) {
            Ok(_) => {
                active.chunks_scheduled += 1;
                self.publish();
            }
            Err(e) => warn!("Dropping inbound audio: {:#}", e),
        }
    }

    fn on_interrupted(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.playback.interrupt();
            self.publish();
        }
    }
}

async fn release_capture(capture: &mut dyn CaptureBackend) {
    if let Err(e) = capture.stop().await {
        warn!("Failed to stop {}: {:#}", capture.name(), e);
    }
}
