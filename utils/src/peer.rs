use std::sync::Arc;

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Receives each RTP payload of a remote track as it arrives.
pub type PlaybackFn = Arc<dyn Fn(&[u8]) + Send + Sync>;

const STREAM_ID: &str = "botcall";

/// A peer connection with one outgoing audio track and a generated local offer.
///
/// The track is declared in the offer but never written to; no Opus samples are sent.
/// The offer is generated and kept locally, not delivered to the bot.
pub struct PeerLink {
    pc: Arc<RTCPeerConnection>,
    offer_sdp: String,
}

impl PeerLink {
    /// Builds the connection, attaches the local track, then creates and applies the offer
    /// (in that order, so the offer advertises the track).
    pub async fn offer(
        ice_servers: &[String],
        track_id: &str,
        playback: PlaybackFn,
    ) -> anyhow::Result<Self> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media)?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let pc = Arc::new(api.new_peer_connection(config).await?);

        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            track_id.to_owned(),
            STREAM_ID.to_owned(),
        ));
        pc.add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        pc.on_track(Box::new(move |remote, _receiver, _transceiver| {
            let playback = playback.clone();
            Box::pin(async move {
                tracing::info!("remote {} track arrived", remote.kind());
                tokio::spawn(async move {
                    while let Ok((packet, _)) = remote.read_rtp().await {
                        playback(&packet.payload);
                    }
                    tracing::debug!("remote track ended");
                });
            })
        }));

        let offer = pc.create_offer(None).await?;
        pc.set_local_description(offer).await?;
        let offer_sdp = pc
            .local_description()
            .await
            .map(|d| d.sdp)
            .unwrap_or_default();
        tracing::debug!("local offer ready ({} bytes of sdp)", offer_sdp.len());

        Ok(Self { pc, offer_sdp })
    }

    pub fn offer_sdp(&self) -> &str {
        &self.offer_sdp
    }

    pub async fn close(&self) -> anyhow::Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}
