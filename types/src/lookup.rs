/// Mode value a bot registers with when it accepts calls on its own endpoint.
pub const DIRECT_MODE: &str = "direct";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BotStatus {
    #[serde(rename = "online")]
    Online,
    #[serde(rename = "offline")]
    Offline,
    #[serde(other)]
    Unknown,
}

/// Body of `GET /v1/lookup/{bot}`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BotRecord {
    status: BotStatus,

    /// Where the bot accepts call-initiation requests, e.g. "https://bot42.example/call" or "0.0.0.0:9000".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,

    /// "direct", "relay", "nat-pending"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mode: Option<String>,

    #[serde(default)]
    attestation_valid: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_seen: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl BotRecord {
    pub fn new(status: BotStatus) -> Self {
        Self {
            status,
            endpoint: None,
            mode: None,
            attestation_valid: false,
            last_seen: None,
            error: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = Some(mode.to_string());
        self
    }

    pub fn status(&self) -> BotStatus {
        self.status
    }

    pub fn is_online(&self) -> bool {
        self.status == BotStatus::Online
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref().filter(|e| !e.trim().is_empty())
    }

    pub fn mode(&self) -> Option<&str> {
        self.mode.as_deref()
    }

    /// Whether the bot can take a call on its own endpoint (and so a media offer).
    pub fn supports_direct_call(&self) -> bool {
        self.mode.as_deref() == Some(DIRECT_MODE)
    }

    pub fn attestation_valid(&self) -> bool {
        self.attestation_valid
    }

    pub fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
