use std::sync::Arc;

use botcall_types::{BotRecord, CallMode, CallRequest, CallResponse};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::client::consts::HUMAN_ID_PREFIX;
use crate::client::utils;
use crate::error::NegotiationFailure;
use crate::media::{LocalAudio, MediaBackend, PeerConnection};

/// What a negotiation settled on.
#[derive(Debug)]
pub struct Negotiation {
    pub mode: CallMode,
    pub greeting: Option<String>,
    /// Why the session ended up in text, if it asked for voice or the call request failed.
    pub fallback: Option<NegotiationFailure>,
    pub human_id: String,
}

/// Sets up the call with a resolved bot and owns the media resources while it lasts.
///
/// Voice is best-effort. Any failure on the voice path or the call request drops the
/// session to text instead of failing it.
pub struct CallNegotiator {
    http: reqwest::Client,
    media: Arc<dyn MediaBackend>,
    attestation: SecretString,
    relay_server: String,
    audio: Option<Box<dyn LocalAudio>>,
    peer: Option<Box<dyn PeerConnection>>,
}

impl CallNegotiator {
    pub fn new(
        http: reqwest::Client,
        media: Arc<dyn MediaBackend>,
        attestation: SecretString,
        relay_server: &str,
    ) -> Self {
        Self {
            http,
            media,
            attestation,
            relay_server: relay_server.to_string(),
            audio: None,
            peer: None,
        }
    }

    pub async fn negotiate(
        &mut self,
        record: &BotRecord,
        requested: CallMode,
        discovery: &Url,
    ) -> Negotiation {
        let mut fallback = None;

        if requested == CallMode::Voice {
            let attempt = if record.supports_direct_call() {
                self.start_media().await
            } else {
                Err(NegotiationFailure::NoDirectCall)
            };
            if let Err(e) = attempt {
                tracing::warn!("voice path failed, falling back to text: {}", e);
                self.release().await;
                fallback = Some(e);
            }
        }

        let human_id = new_human_id();
        let greeting = match self.initiate_call(record, discovery, &human_id).await {
            Ok(response) => {
                tracing::info!(
                    "call accepted: call_id={:?}, webrtc={}",
                    response.call_id(),
                    response.webrtc()
                );
                response.message().map(str::to_string)
            }
            Err(e) => {
                tracing::warn!("{}, continuing in text mode", e);
                self.release().await;
                fallback.get_or_insert(e);
                None
            }
        };

        let mode = if fallback.is_some() {
            CallMode::Text
        } else {
            requested
        };

        Negotiation {
            mode,
            greeting,
            fallback,
            human_id,
        }
    }

    async fn start_media(&mut self) -> Result<(), NegotiationFailure> {
        let audio = self.media.acquire_audio().await?;
        let track_id = audio.track_id();
        self.audio = Some(audio);

        let ice_servers = vec![self.relay_server.clone()];
        let peer = self.media.connect_peer(&ice_servers, &track_id).await?;
        tracing::debug!(
            "peer connection ready via {}, offer is {} bytes",
            self.relay_server,
            peer.local_offer().len()
        );
        self.peer = Some(peer);
        Ok(())
    }

    async fn initiate_call(
        &self,
        record: &BotRecord,
        discovery: &Url,
        human_id: &str,
    ) -> Result<CallResponse, NegotiationFailure> {
        let url = utils::call_url(record.endpoint(), discovery)
            .map_err(NegotiationFailure::CallInitiation)?;
        tracing::debug!("call request to {} as {}", url, human_id);

        let body = CallRequest::new(human_id, self.attestation.expose_secret());
        let response = self
            .http
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| NegotiationFailure::CallInitiation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NegotiationFailure::CallInitiation(format!(
                "{} returned {}",
                url, status
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| NegotiationFailure::CallInitiation(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(CallResponse::default());
        }
        Ok(serde_json::from_str(&text).unwrap_or_else(|e| {
            tracing::warn!("call accepted with unreadable body: {}", e);
            CallResponse::default()
        }))
    }

    pub fn has_media(&self) -> bool {
        self.audio.is_some() || self.peer.is_some()
    }

    pub fn set_muted(&mut self, muted: bool) {
        if let Some(audio) = self.audio.as_mut() {
            audio.set_enabled(!muted);
        }
    }

    /// Closes the peer connection, then stops the local capture. Safe to call twice.
    pub async fn release(&mut self) {
        if let Some(mut peer) = self.peer.take() {
            peer.close().await;
            tracing::debug!("peer connection closed");
        }
        if let Some(mut audio) = self.audio.take() {
            audio.stop();
            tracing::debug!("local audio released");
        }
    }
}

fn new_human_id() -> String {
    format!("{}{}", HUMAN_ID_PREFIX, uuid::Uuid::new_v4())
}
