/// Body of the call-initiation `POST .../call`.
///
/// The attestation is an opaque token; this crate never looks inside it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CallRequest {
    human_id: String,
    attestation: String,
}

impl CallRequest {
    pub fn new(human_id: &str, attestation: &str) -> Self {
        Self {
            human_id: human_id.to_string(),
            attestation: attestation.to_string(),
        }
    }

    pub fn human_id(&self) -> &str {
        &self.human_id
    }

    pub fn attestation(&self) -> &str {
        &self.attestation
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CallResponse {
    /// "accepted"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    call_id: Option<String>,

    /// Greeting the bot wants spoken as soon as the call is up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,

    #[serde(default)]
    webrtc: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    agent_id: Option<String>,
}

impl CallResponse {
    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    /// The greeting, if the bot sent a non-empty one.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().filter(|m| !m.trim().is_empty())
    }

    pub fn webrtc(&self) -> bool {
        self.webrtc
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }
}
