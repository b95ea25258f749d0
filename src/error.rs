use botcall_types::Phase;

/// Bad input caught before any I/O happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter a Bot ID")]
    EmptyBotId,
    #[error("Invalid discovery URL: {0}")]
    InvalidEndpoint(String),
}

/// Lookup failures. Any of these ends the session.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Bot not found: {0}")]
    NotFound(u16),
    #[error("Bot is offline")]
    Offline,
    #[error("Discovery unreachable: {0}")]
    Unreachable(String),
    #[error("Malformed lookup response: {0}")]
    Malformed(String),
}

/// Why the voice path could not be used. Never surfaced as a hard error; the session
/// falls back to text instead.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationFailure {
    #[error("media unavailable: {0}")]
    Media(#[from] MediaError),
    #[error("bot does not accept direct calls")]
    NoDirectCall,
    #[error("call initiation failed: {0}")]
    CallInitiation(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("voice capability unavailable on this host")]
    Unavailable,
    #[error("audio capture failed: {0}")]
    Capture(String),
    #[error("peer connection failed: {0}")]
    Peer(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid channel url: {0}")]
    InvalidUrl(String),
    #[error("channel connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("channel connect timed out")]
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    #[error("speech {0} not available")]
    Unavailable(&'static str),
    #[error("speech engine error: {0}")]
    Engine(String),
}

/// Errors returned by the public session and client operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("a call is already in progress; hang up first")]
    Busy,
    #[error("no active call")]
    NotActive,
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },
}
