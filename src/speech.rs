//! Speech at the edges of a session: recognized speech becomes outbound text, inbound
//! text becomes speech. Both halves are optional; a host without them still has text.

use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::SpeechError;
use crate::session::{EventSink, SessionEvent};

/// Where a recognizer reports results. Cheap to clone.
#[derive(Clone)]
pub struct RecognitionSink {
    events: EventSink,
}

impl RecognitionSink {
    pub(crate) fn new(events: EventSink) -> Self {
        Self { events }
    }

    pub fn interim(&self, text: &str) {
        self.push(text, false);
    }

    pub fn finalized(&self, text: &str) {
        self.push(text, true);
    }

    fn push(&self, text: &str, is_final: bool) {
        let event = SessionEvent::Recognized {
            text: text.to_string(),
            is_final,
        };
        if self.events.send(event).is_err() {
            tracing::debug!("recognition result dropped, session is gone");
        }
    }
}

/// Continuous speech recognition with interim results.
#[cfg_attr(test, mockall::automock)]
pub trait Recognizer: Send + Sync {
    fn start(&self, language: &str, sink: RecognitionSink) -> Result<(), SpeechError>;

    fn stop(&self);
}

/// Speaks one utterance per call. Implementations keep utterances in call order.
#[cfg_attr(test, mockall::automock)]
pub trait Synthesizer: Send + Sync {
    fn speak(&self, text: &str, rate: f32) -> Result<(), SpeechError>;
}

/// Runs a text-to-speech command once per utterance, one at a time.
///
/// The command line is split on whitespace; `{rate}` in an argument is replaced by the
/// rate and the utterance is appended as the last argument, e.g. `espeak -s {rate}`.
pub struct CommandSynthesizer {
    tx: mpsc::UnboundedSender<(String, f32)>,
}

impl CommandSynthesizer {
    /// Spawns the worker task; must be called inside a tokio runtime.
    pub fn spawn(command_line: &str) -> Result<Self, SpeechError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(SpeechError::Unavailable("synthesis"))?;
        let args: Vec<String> = parts.collect();

        let (tx, mut rx) = mpsc::unbounded_channel::<(String, f32)>();
        tokio::spawn(async move {
            while let Some((text, rate)) = rx.recv().await {
                let args = args.iter().map(|a| a.replace("{rate}", &rate_arg(rate)));
                match Command::new(&program).args(args).arg(&text).status().await {
                    Ok(status) if status.success() => {}
                    Ok(status) => tracing::warn!("{} exited with {}", program, status),
                    Err(e) => tracing::error!("failed to run {}: {}", program, e),
                }
            }
        });
        Ok(Self { tx })
    }
}

fn rate_arg(rate: f32) -> String {
    // espeak-style words per minute around a 175 wpm baseline.
    format!("{}", (175.0 * rate).round() as i64)
}

impl Synthesizer for CommandSynthesizer {
    fn speak(&self, text: &str, rate: f32) -> Result<(), SpeechError> {
        self.tx
            .send((text.to_string(), rate))
            .map_err(|_| SpeechError::Engine("synthesis worker stopped".to_string()))
    }
}

/// Per-session view over the host's recognizer and synthesizer.
pub struct SpeechBridge {
    recognizer: Option<Arc<dyn Recognizer>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    language: String,
    rate: f32,
    recognizing: bool,
}

impl SpeechBridge {
    pub fn new(
        recognizer: Option<Arc<dyn Recognizer>>,
        synthesizer: Option<Arc<dyn Synthesizer>>,
    ) -> Self {
        Self {
            recognizer,
            synthesizer,
            language: crate::client::consts::DEFAULT_STT_LANG.to_string(),
            rate: crate::client::consts::DEFAULT_TTS_RATE,
            recognizing: false,
        }
    }

    /// A bridge with neither half. Text mode works, voice degrades.
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }

    pub fn can_recognize(&self) -> bool {
        self.recognizer.is_some()
    }

    pub fn can_speak(&self) -> bool {
        self.synthesizer.is_some()
    }

    pub fn is_recognizing(&self) -> bool {
        self.recognizing
    }

    pub fn start_recognition(&mut self, sink: RecognitionSink) -> Result<(), SpeechError> {
        if self.recognizing {
            return Ok(());
        }
        let recognizer = self
            .recognizer
            .as_ref()
            .ok_or(SpeechError::Unavailable("recognition"))?;
        recognizer.start(&self.language, sink)?;
        self.recognizing = true;
        tracing::debug!("speech recognition started ({})", self.language);
        Ok(())
    }

    pub fn stop_recognition(&mut self) {
        if !self.recognizing {
            return;
        }
        if let Some(recognizer) = &self.recognizer {
            recognizer.stop();
        }
        self.recognizing = false;
        tracing::debug!("speech recognition stopped");
    }

    /// One utterance. Without a synthesizer this does nothing.
    pub fn speak(&self, text: &str) {
        let Some(synthesizer) = &self.synthesizer else {
            tracing::debug!("no synthesizer, not speaking");
            return;
        };
        if let Err(e) = synthesizer.speak(text, self.rate) {
            tracing::warn!("failed to speak: {}", e);
        }
    }
}
