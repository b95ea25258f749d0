use std::sync::Arc;

use botcall_types::CallMode;

use crate::discovery::DiscoveryClient;
use crate::error::{SessionError, ValidationError};
use crate::media::{self, MediaBackend};
use crate::negotiator::CallNegotiator;
use crate::prefs::{PreferenceStore, Preferences, SharedPreferences};
use crate::presenter::{Presenter, Severity};
use crate::session::{Session, SessionEvent, SessionParts};
use crate::speech::{CommandSynthesizer, Recognizer, SpeechBridge, Synthesizer};

pub mod config;
pub(crate) mod consts;
pub(crate) mod utils;

pub struct ClientBuilder {
    config: config::Config,
    presenter: Arc<dyn Presenter>,
    prefs: Option<PreferenceStore>,
    media: Option<Arc<dyn MediaBackend>>,
    recognizer: Option<Arc<dyn Recognizer>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
}

impl ClientBuilder {
    fn new(config: config::Config, presenter: Arc<dyn Presenter>) -> Self {
        Self {
            config,
            presenter,
            prefs: None,
            media: None,
            recognizer: None,
            synthesizer: None,
        }
    }

    /// Defaults to the file named by the config, or memory only if there is none.
    pub fn with_preferences(mut self, prefs: PreferenceStore) -> Self {
        self.prefs = Some(prefs);
        self
    }

    /// Defaults to [`media::default_backend`].
    pub fn with_media(mut self, media: Arc<dyn MediaBackend>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// Defaults to a [`CommandSynthesizer`] when the config names a command.
    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Builds the client. Must run inside a tokio runtime when a synthesis command is set.
    pub fn build(self) -> anyhow::Result<Client> {
        let http = reqwest::Client::builder()
            .timeout(self.config.http_timeout())
            .build()?;

        let prefs = match self.prefs {
            Some(prefs) => prefs,
            None => match self.config.preferences_path() {
                Some(path) => PreferenceStore::load(path),
                None => PreferenceStore::in_memory(),
            },
        };
        let prefs = prefs.shared();

        if let Some(url) = self.config.discovery_url() {
            let url = utils::parse_discovery_url(url)?;
            persist(&prefs, |p| p.set_discovery_url(url.as_str().trim_end_matches('/')));
        }

        let synthesizer = match (self.synthesizer, self.config.tts_command()) {
            (Some(synthesizer), _) => Some(synthesizer),
            (None, Some(command)) => match CommandSynthesizer::spawn(command) {
                Ok(synthesizer) => Some(Arc::new(synthesizer) as Arc<dyn Synthesizer>),
                Err(e) => {
                    tracing::warn!("speech synthesis disabled: {}", e);
                    None
                }
            },
            (None, None) => None,
        };

        Ok(Client {
            config: self.config,
            http,
            prefs,
            media: self.media.unwrap_or_else(media::default_backend),
            recognizer: self.recognizer,
            synthesizer,
            presenter: self.presenter,
            session: None,
        })
    }
}

/// Owns the host capabilities and at most one live session.
pub struct Client {
    config: config::Config,
    http: reqwest::Client,
    prefs: SharedPreferences,
    media: Arc<dyn MediaBackend>,
    recognizer: Option<Arc<dyn Recognizer>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    presenter: Arc<dyn Presenter>,
    session: Option<Session>,
}

impl Client {
    pub fn builder(config: config::Config, presenter: Arc<dyn Presenter>) -> ClientBuilder {
        ClientBuilder::new(config, presenter)
    }

    /// Warns about missing voice or speech support. Call once at startup.
    pub fn check_capabilities(&self) {
        if !self.media.is_available() {
            tracing::warn!("no media backend, voice calls will fall back to text");
            self.presenter
                .notify("Voice mode unavailable on this host", Severity::Warning);
        }
        if self.recognizer.is_none() {
            tracing::warn!("speech recognition not available");
        }
        if self.synthesizer.is_none() {
            tracing::warn!("speech synthesis not available");
        }
    }

    pub fn voice_available(&self) -> bool {
        self.media.is_available()
    }

    /// Starts a new session against the persisted discovery URL.
    pub async fn connect(&mut self, bot_id: &str, mode: CallMode) -> Result<(), SessionError> {
        self.connect_to(bot_id, None, mode).await
    }

    /// Starts a new session. Fails with [`SessionError::Busy`] while another is live.
    pub async fn connect_to(
        &mut self,
        bot_id: &str,
        endpoint: Option<&str>,
        mode: CallMode,
    ) -> Result<(), SessionError> {
        if self.session.as_ref().is_some_and(|s| s.phase().is_live()) {
            return Err(SessionError::Busy);
        }

        let parts = self.session_parts();
        let session = self.session.insert(Session::new(parts, mode));
        session.connect(bot_id, endpoint).await
    }

    fn session_parts(&self) -> SessionParts {
        let current = self.preferences();
        let speech = SpeechBridge::new(self.recognizer.clone(), self.synthesizer.clone())
            .with_language(&current.stt_lang)
            .with_rate(current.tts_rate);
        SessionParts {
            discovery: DiscoveryClient::new(self.http.clone(), self.prefs.clone()),
            negotiator: CallNegotiator::new(
                self.http.clone(),
                self.media.clone(),
                self.config.attestation().clone(),
                self.config.relay_server(),
            ),
            speech,
            presenter: self.presenter.clone(),
            prefs: self.prefs.clone(),
            channel_capacity: self.config.channel_capacity(),
            connect_timeout: self.config.http_timeout(),
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Hangs up the current session, if there is one.
    pub async fn hangup(&mut self) -> Result<(), SessionError> {
        match self.session.as_mut() {
            Some(session) if session.phase().is_live() => session.hangup().await,
            _ => Ok(()),
        }
    }

    /// The next event of the current session. Pending forever without one.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        match self.session.as_mut() {
            Some(session) => session.next_event().await,
            None => std::future::pending().await,
        }
    }

    pub async fn handle_event(&mut self, event: SessionEvent) {
        if let Some(session) = self.session.as_mut() {
            session.handle_event(event).await;
        }
    }

    pub fn preferences(&self) -> Preferences {
        match self.prefs.lock() {
            Ok(prefs) => prefs.get().clone(),
            Err(_) => {
                tracing::error!("failed to read preferences");
                Preferences::default()
            }
        }
    }

    pub fn set_discovery_url(&self, url: &str) -> Result<(), ValidationError> {
        let url = utils::parse_discovery_url(url)?;
        persist(&self.prefs, |p| {
            p.set_discovery_url(url.as_str().trim_end_matches('/'))
        });
        Ok(())
    }

    /// Applies to sessions started after this call.
    pub fn set_tts_rate(&self, rate: f32) {
        persist(&self.prefs, |p| p.set_tts_rate(rate));
    }

    /// Applies to sessions started after this call.
    pub fn set_stt_lang(&self, lang: &str) {
        persist(&self.prefs, |p| p.set_stt_lang(lang));
    }
}

fn persist(prefs: &SharedPreferences, f: impl FnOnce(&mut PreferenceStore)) {
    match prefs.lock() {
        Ok(mut store) => f(&mut store),
        Err(_) => tracing::error!("failed to update preferences"),
    }
}
