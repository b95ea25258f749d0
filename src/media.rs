use async_trait::async_trait;

use crate::error::MediaError;

/// A local audio capture handle. Stopping releases the device.
#[cfg_attr(test, mockall::automock)]
pub trait LocalAudio: Send {
    fn track_id(&self) -> String;

    fn set_enabled(&mut self, enabled: bool);

    fn stop(&mut self);
}

/// A direct peer connection with a local offer already applied.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PeerConnection: Send {
    fn local_offer(&self) -> String;

    async fn close(&mut self);
}

/// Host media capability: microphone capture and peer connections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Whether voice can work on this host at all.
    fn is_available(&self) -> bool;

    async fn acquire_audio(&self) -> Result<Box<dyn LocalAudio>, MediaError>;

    /// Builds a peer connection using `ice_servers`, declares the local track, and
    /// generates the local offer. Captured samples are not written to the track.
    /// Remote tracks are played back as they arrive.
    async fn connect_peer(
        &self,
        ice_servers: &[String],
        track_id: &str,
    ) -> Result<Box<dyn PeerConnection>, MediaError>;
}

/// Backend for hosts without voice support. Every voice attempt falls back to text.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableMedia;

#[async_trait]
impl MediaBackend for UnavailableMedia {
    fn is_available(&self) -> bool {
        false
    }

    async fn acquire_audio(&self) -> Result<Box<dyn LocalAudio>, MediaError> {
        Err(MediaError::Unavailable)
    }

    async fn connect_peer(
        &self,
        _ice_servers: &[String],
        _track_id: &str,
    ) -> Result<Box<dyn PeerConnection>, MediaError> {
        Err(MediaError::Unavailable)
    }
}

/// The host's default backend: native media with the `voice` feature, none without.
pub fn default_backend() -> std::sync::Arc<dyn MediaBackend> {
    #[cfg(feature = "voice")]
    {
        std::sync::Arc::new(native::NativeMedia::default())
    }
    #[cfg(not(feature = "voice"))]
    {
        std::sync::Arc::new(UnavailableMedia)
    }
}

#[cfg(feature = "voice")]
pub mod native {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use botcall_utils::device::{self, MicCapture};
    use botcall_utils::peer::{PeerLink, PlaybackFn};

    use super::{LocalAudio, MediaBackend, PeerConnection};
    use crate::error::MediaError;

    /// cpal capture plus a webrtc-rs peer connection.
    #[derive(Default)]
    pub struct NativeMedia {
        device_name: Option<String>,
        remote_bytes: Arc<AtomicU64>,
    }

    impl NativeMedia {
        pub fn with_device(device_name: &str) -> Self {
            Self {
                device_name: Some(device_name.to_string()),
                remote_bytes: Arc::default(),
            }
        }

        /// Bytes of remote media received so far.
        pub fn remote_bytes(&self) -> u64 {
            self.remote_bytes.load(Ordering::Relaxed)
        }
    }

    struct MicTrack {
        id: String,
        capture: Option<MicCapture>,
    }

    impl LocalAudio for MicTrack {
        fn track_id(&self) -> String {
            self.id.clone()
        }

        fn set_enabled(&mut self, enabled: bool) {
            if let Some(capture) = &self.capture {
                capture.set_enabled(enabled);
            }
        }

        fn stop(&mut self) {
            if let Some(mut capture) = self.capture.take() {
                capture.stop();
            }
        }
    }

    struct NativePeer {
        link: Option<PeerLink>,
        offer: String,
    }

    #[async_trait]
    impl PeerConnection for NativePeer {
        fn local_offer(&self) -> String {
            self.offer.clone()
        }

        async fn close(&mut self) {
            if let Some(link) = self.link.take() {
                if let Err(e) = link.close().await {
                    tracing::warn!("failed to close peer connection: {}", e);
                }
            }
        }
    }

    #[async_trait]
    impl MediaBackend for NativeMedia {
        fn is_available(&self) -> bool {
            device::has_input_device()
        }

        async fn acquire_audio(&self) -> Result<Box<dyn LocalAudio>, MediaError> {
            let device_name = self.device_name.clone();
            let capture = tokio::task::spawn_blocking(move || MicCapture::open(device_name))
                .await
                .map_err(|e| MediaError::Capture(e.to_string()))?
                .map_err(|e| MediaError::Capture(e.to_string()))?;
            tracing::info!("capturing from {}", capture.device_name());
            Ok(Box::new(MicTrack {
                id: format!("mic-{}", uuid::Uuid::new_v4()),
                capture: Some(capture),
            }))
        }

        async fn connect_peer(
            &self,
            ice_servers: &[String],
            track_id: &str,
        ) -> Result<Box<dyn PeerConnection>, MediaError> {
            let counter = self.remote_bytes.clone();
            let playback: PlaybackFn = Arc::new(move |payload: &[u8]| {
                counter.fetch_add(payload.len() as u64, Ordering::Relaxed);
            });
            let link = PeerLink::offer(ice_servers, track_id, playback)
                .await
                .map_err(|e| MediaError::Peer(e.to_string()))?;
            let offer = link.offer_sdp().to_string();
            Ok(Box::new(NativePeer {
                link: Some(link),
                offer,
            }))
        }
    }
}
