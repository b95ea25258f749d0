use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use botcall_types::Envelope;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::client::utils;
use crate::discovery::BotId;
use crate::error::ChannelError;
use crate::session::{EventSink, SessionEvent};

const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// The text path to the bot: a WebSocket on the discovery origin.
///
/// Outbound messages are queued to a writer task and never retried. Inbound `text`
/// envelopes are pushed to the session as [`SessionEvent::Inbound`]; anything else is
/// dropped here.
pub struct SignalingChannel {
    url: Url,
    c_tx: Option<mpsc::Sender<Envelope>>,
    open: Arc<AtomicBool>,
    send_handle: Option<JoinHandle<()>>,
    recv_handle: Option<JoinHandle<()>>,
}

impl SignalingChannel {
    pub fn url_for(bot_id: &BotId, discovery: &Url) -> Result<Url, ChannelError> {
        utils::channel_url(discovery, bot_id.as_str()).map_err(ChannelError::InvalidUrl)
    }

    pub async fn open(
        url: Url,
        events: EventSink,
        capacity: usize,
        connect_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        tracing::debug!("opening channel: {}", url);
        let (ws_stream, _) =
            tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url.as_str()))
                .await
                .map_err(|_| ChannelError::Timeout)??;

        let (mut write, mut read) = ws_stream.split();
        let (c_tx, mut c_rx) = mpsc::channel::<Envelope>(capacity);
        let open = Arc::new(AtomicBool::new(true));

        let send_handle = tokio::spawn(async move {
            while let Some(envelope) = c_rx.recv().await {
                match serde_json::to_string(&envelope) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize envelope: {}", e);
                    }
                }
            }
            if let Err(e) = write.close().await {
                tracing::debug!("failed to close channel: {}", e);
            }
        });

        let recv_open = open.clone();
        let recv_handle = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        recv_open.store(false, Ordering::SeqCst);
                        let _ = events.send(SessionEvent::ChannelFailed(e.to_string()));
                        return;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => match serde_json::from_str::<Envelope>(&text) {
                        Ok(Envelope::Text { text }) => {
                            tracing::debug!("received text envelope ({} chars)", text.len());
                            if events.send(SessionEvent::Inbound(text)).is_err() {
                                break;
                            }
                        }
                        Ok(Envelope::Unknown) => {
                            tracing::debug!("ignoring envelope: {}", text);
                        }
                        Err(e) => {
                            tracing::warn!("failed to parse envelope: {}, text=> {:?}", e, text);
                        }
                    },
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    Message::Close(reason) => {
                        tracing::info!("channel closed: {:?}", reason);
                        break;
                    }
                    _ => {}
                }
            }
            recv_open.store(false, Ordering::SeqCst);
            let _ = events.send(SessionEvent::ChannelClosed);
        });

        tracing::info!("channel open: {}", url);
        Ok(Self {
            url,
            c_tx: Some(c_tx),
            open,
            send_handle: Some(send_handle),
            recv_handle: Some(recv_handle),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_open(&self) -> bool {
        self.c_tx.is_some() && self.open.load(Ordering::SeqCst)
    }

    /// Queues one text envelope. Returns false when it was dropped.
    pub fn send(&self, text: &str) -> bool {
        let Some(tx) = self.c_tx.as_ref().filter(|_| self.is_open()) else {
            tracing::debug!("channel not open, message dropped");
            return false;
        };
        match tx.try_send(Envelope::text(text)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("outbound queue full, message dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("writer gone, message dropped");
                false
            }
        }
    }

    /// Flushes queued messages, sends a close frame and stops both tasks.
    pub async fn close(&mut self) {
        self.open.store(false, Ordering::SeqCst);
        if let Some(recv) = self.recv_handle.take() {
            recv.abort();
        }
        // Dropping the sender lets the writer drain and close the socket.
        self.c_tx = None;
        if let Some(mut send) = self.send_handle.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut send).await.is_err() {
                tracing::debug!("writer did not finish in time");
                send.abort();
            }
        }
        tracing::info!("channel closed: {}", self.url);
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        for handle in [self.send_handle.take(), self.recv_handle.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}
