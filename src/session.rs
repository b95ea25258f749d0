//! One call attempt, from the first keystroke to hang-up.
//!
//! A [`Session`] owns the phase, the transcript, the channel and the media handles.
//! Background tasks (the channel reader, the recognizer, the elapsed-time ticker) never
//! touch it directly; they push [`SessionEvent`]s into its queue and the owner feeds them
//! back through [`Session::handle_event`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use botcall_types::{CallMode, Phase, Sender, TranscriptEntry};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use url::Url;

use crate::channel::SignalingChannel;
use crate::client::utils;
use crate::discovery::{BotId, DiscoveryClient};
use crate::error::{NegotiationFailure, SessionError};
use crate::negotiator::CallNegotiator;
use crate::prefs::SharedPreferences;
use crate::presenter::{Presenter, Severity};
use crate::speech::{RecognitionSink, SpeechBridge};

pub type EventSink = mpsc::UnboundedSender<SessionEvent>;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Text the bot sent over the channel.
    Inbound(String),
    Recognized { text: String, is_final: bool },
    ChannelClosed,
    ChannelFailed(String),
    Tick,
}

/// Collaborators a session is built from.
pub struct SessionParts {
    pub discovery: DiscoveryClient,
    pub negotiator: CallNegotiator,
    pub speech: SpeechBridge,
    pub presenter: Arc<dyn Presenter>,
    pub prefs: SharedPreferences,
    pub channel_capacity: usize,
    pub connect_timeout: Duration,
}

pub struct Session {
    phase: Phase,
    mode: CallMode,
    bot_id: Option<BotId>,
    discovery_endpoint: Option<Url>,
    started_at: Option<Instant>,
    muted: bool,
    transcript: Vec<TranscriptEntry>,
    status_text: String,
    channel_url: Option<Url>,
    channel: Option<SignalingChannel>,
    timer: Option<JoinHandle<()>>,
    tick_pending: Arc<AtomicBool>,
    speech_warned: bool,

    discovery: DiscoveryClient,
    negotiator: CallNegotiator,
    speech: SpeechBridge,
    presenter: Arc<dyn Presenter>,
    prefs: SharedPreferences,
    channel_capacity: usize,
    connect_timeout: Duration,

    events_tx: EventSink,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

fn allowed(from: Phase, to: Phase) -> bool {
    matches!(
        (from, to),
        (Phase::Idle, Phase::Connecting)
            | (Phase::Connecting, Phase::Negotiating)
            | (Phase::Connecting, Phase::Ended)
            | (Phase::Negotiating, Phase::Active)
            | (Phase::Negotiating, Phase::Ended)
            | (Phase::Active, Phase::Ended)
    )
}

impl Session {
    /// A fresh session in [`Phase::Idle`] that will ask for `mode` when it connects.
    pub fn new(parts: SessionParts, mode: CallMode) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            phase: Phase::Idle,
            mode,
            bot_id: None,
            discovery_endpoint: None,
            started_at: None,
            muted: false,
            transcript: Vec::new(),
            status_text: String::new(),
            channel_url: None,
            channel: None,
            timer: None,
            tick_pending: Arc::new(AtomicBool::new(false)),
            speech_warned: false,
            discovery: parts.discovery,
            negotiator: parts.negotiator,
            speech: parts.speech,
            presenter: parts.presenter,
            prefs: parts.prefs,
            channel_capacity: parts.channel_capacity,
            connect_timeout: parts.connect_timeout,
            events_tx,
            events_rx,
        }
    }

    /// Resolves the bot, negotiates the call and opens the channel.
    ///
    /// Without `endpoint` the persisted discovery URL is used. Input errors leave the
    /// session in `Idle`; a failed lookup ends it. Voice and call-request failures are
    /// not errors: the session goes `Active` in text mode.
    pub async fn connect(
        &mut self,
        bot_id: &str,
        endpoint: Option<&str>,
    ) -> Result<(), SessionError> {
        if self.phase != Phase::Idle {
            return Err(SessionError::InvalidTransition {
                from: self.phase,
                to: Phase::Connecting,
            });
        }

        let bot_id = BotId::parse(bot_id).map_err(|e| self.reject(e))?;
        let endpoint = match endpoint {
            Some(endpoint) => endpoint.to_string(),
            None => self.persisted_discovery_url(),
        };
        let discovery = utils::parse_discovery_url(&endpoint).map_err(|e| self.reject(e))?;

        self.bot_id = Some(bot_id.clone());
        self.discovery_endpoint = Some(discovery.clone());
        self.transition(Phase::Connecting, "Connecting...")?;

        let record = match self.discovery.resolve(&bot_id, &discovery).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("lookup for {} failed: {}", bot_id, e);
                self.presenter
                    .notify(&format!("Connection failed: {}", e), Severity::Error);
                self.transition(Phase::Ended, "Offline")?;
                return Err(e.into());
            }
        };

        self.transition(Phase::Negotiating, "Negotiating...")?;
        let requested = self.mode;
        let negotiation = self.negotiator.negotiate(&record, requested, &discovery).await;
        if let Some(failure) = &negotiation.fallback {
            self.report_fallback(requested, failure);
        }
        self.mode = negotiation.mode;
        tracing::info!(
            "call with {} as {} in {} mode",
            bot_id,
            negotiation.human_id,
            self.mode
        );

        if let Some(greeting) = negotiation.greeting {
            self.receive(&greeting);
        }

        self.enter_active(&bot_id, &discovery).await
    }

    async fn enter_active(&mut self, bot_id: &BotId, discovery: &Url) -> Result<(), SessionError> {
        self.transition(Phase::Active, "Connected")?;
        self.started_at = Some(Instant::now());
        self.timer = Some(spawn_ticker(
            self.events_tx.clone(),
            self.tick_pending.clone(),
            TICK,
        ));

        match SignalingChannel::url_for(bot_id, discovery) {
            Ok(url) => {
                self.channel_url = Some(url.clone());
                match SignalingChannel::open(
                    url,
                    self.events_tx.clone(),
                    self.channel_capacity,
                    self.connect_timeout,
                )
                .await
                {
                    Ok(channel) => self.channel = Some(channel),
                    Err(e) => {
                        tracing::warn!("channel unavailable: {}", e);
                        self.presenter.notify(
                            "Could not reach the bot's message channel",
                            Severity::Warning,
                        );
                    }
                }
            }
            Err(e) => tracing::error!("no channel url: {}", e),
        }

        if self.mode == CallMode::Voice {
            self.start_recognition();
            self.presenter.render_voice_status("In voice call");
        }
        Ok(())
    }

    /// Appends `text` as a human entry and sends it to the bot.
    ///
    /// Returns whether the message went out. Blank input is ignored. The transcript
    /// keeps the entry even when the channel is down.
    pub fn send_text(&mut self, text: &str) -> Result<bool, SessionError> {
        if self.phase != Phase::Active {
            return Err(SessionError::NotActive);
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(false);
        }

        self.append(Sender::Human, text);
        let sent = match &self.channel {
            Some(channel) => channel.send(text),
            None => {
                tracing::debug!("no channel, message kept locally");
                false
            }
        };
        Ok(sent)
    }

    /// Switches between voice and text without touching the channel.
    pub async fn switch_mode(&mut self, mode: CallMode) -> Result<(), SessionError> {
        if self.phase != Phase::Active {
            return Err(SessionError::NotActive);
        }
        if mode == self.mode {
            return Ok(());
        }

        self.mode = mode;
        match mode {
            CallMode::Voice => {
                self.start_recognition();
                self.presenter.render_voice_status("Listening...");
            }
            CallMode::Text => {
                self.speech.stop_recognition();
                self.negotiator.release().await;
                self.muted = false;
                self.presenter.render_voice_status("Text mode");
            }
        }
        tracing::info!("switched to {} mode", mode);
        Ok(())
    }

    /// Flips the microphone. Only has an effect in voice mode with a microphone held;
    /// returns the muted state.
    pub fn toggle_mute(&mut self) -> Result<bool, SessionError> {
        if self.phase != Phase::Active {
            return Err(SessionError::NotActive);
        }
        if self.mode != CallMode::Voice {
            return Ok(self.muted);
        }
        if !self.negotiator.has_media() {
            tracing::debug!("no microphone held, mute ignored");
            return Ok(self.muted);
        }

        self.muted = !self.muted;
        self.negotiator.set_muted(self.muted);
        self.presenter
            .render_voice_status(if self.muted { "Muted" } else { "In voice call" });
        Ok(self.muted)
    }

    /// Ends the call and releases everything. A second call does nothing.
    pub async fn hangup(&mut self) -> Result<(), SessionError> {
        match self.phase {
            Phase::Ended => return Ok(()),
            Phase::Active => {}
            from => {
                return Err(SessionError::InvalidTransition {
                    from,
                    to: Phase::Ended,
                })
            }
        }

        self.speech.stop_recognition();
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
        self.negotiator.release().await;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.muted = false;
        self.transition(Phase::Ended, "Call ended")?;
        Ok(())
    }

    /// Waits for the next event from the channel, the recognizer or the ticker.
    ///
    /// The owner must keep draining this. At most one `Tick` is queued at a time, but
    /// channel and recognizer events pile up until they are read.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let event = self.events_rx.recv().await;
        if event == Some(SessionEvent::Tick) {
            self.tick_pending.store(false, Ordering::SeqCst);
        }
        event
    }

    /// Applies one event. Outside `Active` events are dropped.
    pub async fn handle_event(&mut self, event: SessionEvent) {
        if self.phase != Phase::Active {
            tracing::debug!("ignoring {:?} in phase {}", event, self.phase);
            return;
        }

        match event {
            SessionEvent::Inbound(text) => self.receive(&text),
            SessionEvent::Recognized { text, is_final } => {
                if self.mode != CallMode::Voice {
                    tracing::debug!("late recognition result dropped");
                } else if is_final {
                    if let Err(e) = self.send_text(&text) {
                        tracing::warn!("failed to send recognized text: {}", e);
                    }
                } else {
                    self.presenter.render_interim(&text);
                }
            }
            SessionEvent::ChannelClosed => {
                self.drop_channel().await;
                self.presenter
                    .notify("The bot closed the message channel", Severity::Warning);
            }
            SessionEvent::ChannelFailed(reason) => {
                tracing::warn!("channel failed: {}", reason);
                self.drop_channel().await;
                self.presenter
                    .notify("Connection to the bot was lost", Severity::Error);
            }
            SessionEvent::Tick => self.presenter.render_elapsed(self.elapsed()),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn mode(&self) -> CallMode {
        self.mode
    }

    pub fn bot_id(&self) -> Option<&BotId> {
        self.bot_id.as_ref()
    }

    pub fn discovery_endpoint(&self) -> Option<&Url> {
        self.discovery_endpoint.as_ref()
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// The channel URL derived when the session went active, whether or not it opened.
    pub fn channel_url(&self) -> Option<&Url> {
        self.channel_url.as_ref()
    }

    pub fn is_channel_open(&self) -> bool {
        self.channel.as_ref().is_some_and(SignalingChannel::is_open)
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_recognizing(&self) -> bool {
        self.speech.is_recognizing()
    }

    pub fn has_media(&self) -> bool {
        self.negotiator.has_media()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Time since the session went active; zero before that.
    pub fn elapsed(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    fn transition(&mut self, to: Phase, label: &str) -> Result<(), SessionError> {
        let from = self.phase;
        if !allowed(from, to) {
            return Err(SessionError::InvalidTransition { from, to });
        }
        self.phase = to;
        self.status_text = label.to_string();
        tracing::info!("session {} -> {}", from, to);
        self.presenter.render_status(to, label);
        Ok(())
    }

    fn reject<E: Into<SessionError> + std::fmt::Display>(&self, error: E) -> SessionError {
        self.presenter.notify(&error.to_string(), Severity::Error);
        error.into()
    }

    fn persisted_discovery_url(&self) -> String {
        match self.prefs.lock() {
            Ok(prefs) => prefs.get().discovery_url.clone(),
            Err(_) => {
                tracing::error!("failed to read preferences");
                crate::client::consts::DEFAULT_DISCOVERY_URL.to_string()
            }
        }
    }

    fn report_fallback(&self, requested: CallMode, failure: &NegotiationFailure) {
        let message = match (requested, failure) {
            (CallMode::Voice, NegotiationFailure::CallInitiation(_)) => {
                "Call request failed, continuing in text mode".to_string()
            }
            (CallMode::Voice, _) => format!("Voice unavailable ({}), using text", failure),
            (CallMode::Text, _) => "Call request failed, continuing in text mode".to_string(),
        };
        self.presenter.notify(&message, Severity::Warning);
    }

    fn append(&mut self, sender: Sender, text: &str) {
        self.transcript.push(TranscriptEntry::new(sender, text));
        self.presenter.append_transcript_entry(sender, text);
    }

    /// A bot message: transcript first, then speech. Text mode speaks too.
    fn receive(&mut self, text: &str) {
        self.append(Sender::Bot, text);
        self.speech.speak(text);
    }

    fn start_recognition(&mut self) {
        let sink = RecognitionSink::new(self.events_tx.clone());
        if let Err(e) = self.speech.start_recognition(sink) {
            tracing::warn!("recognition not started: {}", e);
            if !self.speech_warned {
                self.speech_warned = true;
                self.presenter
                    .notify("Speech recognition not available", Severity::Warning);
            }
        }
    }

    async fn drop_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Sends a `Tick` every `period` unless the previous one is still queued.
fn spawn_ticker(events: EventSink, pending: Arc<AtomicBool>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if pending.swap(true, Ordering::SeqCst) {
                continue;
            }
            if events.send(SessionEvent::Tick).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MockMediaBackend;
    use crate::prefs::PreferenceStore;
    use crate::presenter::MockPresenter;
    use secrecy::SecretString;

    fn session(presenter: MockPresenter) -> Session {
        let http = reqwest::Client::new();
        let prefs = PreferenceStore::in_memory().shared();
        let parts = SessionParts {
            discovery: DiscoveryClient::new(http.clone(), prefs.clone()),
            negotiator: CallNegotiator::new(
                http,
                Arc::new(MockMediaBackend::new()),
                SecretString::from("anonymous".to_string()),
                "stun:stun.example:3478",
            ),
            speech: SpeechBridge::disabled(),
            presenter: Arc::new(presenter),
            prefs,
            channel_capacity: 8,
            connect_timeout: Duration::from_secs(1),
        };
        Session::new(parts, CallMode::Text)
    }

    #[test]
    fn test_transition_table() {
        assert!(allowed(Phase::Idle, Phase::Connecting));
        assert!(allowed(Phase::Connecting, Phase::Ended));
        assert!(allowed(Phase::Negotiating, Phase::Active));
        assert!(allowed(Phase::Active, Phase::Ended));
        assert!(!allowed(Phase::Idle, Phase::Active));
        assert!(!allowed(Phase::Ended, Phase::Connecting));
        assert!(!allowed(Phase::Active, Phase::Connecting));
        assert!(!allowed(Phase::Ended, Phase::Ended));
    }

    #[tokio::test]
    async fn test_empty_bot_id_stays_idle() {
        let mut presenter = MockPresenter::new();
        presenter
            .expect_notify()
            .withf(|message, severity| {
                message == "Please enter a Bot ID" && *severity == Severity::Error
            })
            .times(1)
            .return_const(());
        presenter.expect_render_status().never();

        let mut session = session(presenter);
        let result = session.connect("   ", None).await;
        assert!(matches!(result, Err(SessionError::Validation(_))));
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_bad_endpoint_stays_idle() {
        let mut presenter = MockPresenter::new();
        presenter.expect_notify().times(1).return_const(());
        presenter.expect_render_status().never();

        let mut session = session(presenter);
        let result = session.connect("bot42", Some("not a url")).await;
        assert!(matches!(result, Err(SessionError::Validation(_))));
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_operations_need_an_active_session() {
        let mut session = session(MockPresenter::new());
        assert!(matches!(session.send_text("hi"), Err(SessionError::NotActive)));
        assert!(matches!(session.toggle_mute(), Err(SessionError::NotActive)));
        assert!(matches!(
            session.switch_mode(CallMode::Voice).await,
            Err(SessionError::NotActive)
        ));
        assert!(matches!(
            session.hangup().await,
            Err(SessionError::InvalidTransition {
                from: Phase::Idle,
                to: Phase::Ended
            })
        ));
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_undrained_ticks_do_not_pile_up() {
        let mut session = session(MockPresenter::new());
        let pending = session.tick_pending.clone();
        let timer = spawn_ticker(
            session.events_tx.clone(),
            pending.clone(),
            Duration::from_millis(5),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(session.next_event().await, Some(SessionEvent::Tick));
        assert!(session.events_rx.is_empty());
        assert!(!pending.load(Ordering::SeqCst));

        // Draining frees the slot for the next tick.
        assert_eq!(session.next_event().await, Some(SessionEvent::Tick));
        timer.abort();
    }

    #[tokio::test]
    async fn test_events_before_active_are_ignored() {
        let mut presenter = MockPresenter::new();
        presenter.expect_append_transcript_entry().never();
        presenter.expect_render_elapsed().never();

        let mut session = session(presenter);
        session
            .handle_event(SessionEvent::Inbound("early".to_string()))
            .await;
        session.handle_event(SessionEvent::Tick).await;
        assert!(session.transcript().is_empty());
        assert_eq!(session.elapsed(), Duration::ZERO);
    }
}
