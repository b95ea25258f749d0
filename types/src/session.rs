use std::fmt;
use std::str::FromStr;

/// Where a call session is in its lifecycle. `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Connecting,
    Negotiating,
    Active,
    Ended,
}

impl Phase {
    /// A session in one of these phases holds (or is acquiring) call resources.
    pub fn is_live(&self) -> bool {
        matches!(self, Phase::Connecting | Phase::Negotiating | Phase::Active)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Connecting => "connecting",
            Phase::Negotiating => "negotiating",
            Phase::Active => "active",
            Phase::Ended => "ended",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallMode {
    #[default]
    Voice,
    Text,
}

impl fmt::Display for CallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallMode::Voice => f.write_str("voice"),
            CallMode::Text => f.write_str("text"),
        }
    }
}

impl FromStr for CallMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "voice" => Ok(CallMode::Voice),
            "text" => Ok(CallMode::Text),
            other => Err(format!("unknown call mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Human,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TranscriptEntry {
    sender: Sender,
    text: String,
}

impl TranscriptEntry {
    pub fn new(sender: Sender, text: &str) -> Self {
        Self {
            sender,
            text: text.to_string(),
        }
    }

    pub fn human(text: &str) -> Self {
        Self::new(Sender::Human, text)
    }

    pub fn bot(text: &str) -> Self {
        Self::new(Sender::Bot, text)
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
