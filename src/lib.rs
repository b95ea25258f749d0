mod channel;
mod client;
mod discovery;
mod error;
mod negotiator;
mod session;

pub mod media;
pub mod prefs;
pub mod presenter;
pub mod speech;

pub use botcall_types as types;
pub use channel::SignalingChannel;
pub use client::config::{Config, ConfigBuilder, ConfigError};
pub use client::{Client, ClientBuilder};
pub use discovery::{BotId, DiscoveryClient};
pub use error::{
    ChannelError, DiscoveryError, MediaError, NegotiationFailure, SessionError, SpeechError,
    ValidationError,
};
pub use negotiator::{CallNegotiator, Negotiation};
pub use session::{EventSink, Session, SessionEvent, SessionParts};

#[cfg(feature = "voice")]
pub use botcall_utils as voice;
