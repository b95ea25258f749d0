/// A frame on the signaling channel. Same shape in both directions.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    #[serde(rename = "text")]
    Text { text: String },

    /// Any type this client does not understand yet.
    #[serde(other)]
    Unknown,
}

impl Envelope {
    pub fn text(text: &str) -> Self {
        Envelope::Text {
            text: text.to_string(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Envelope::Text { text } => Some(text),
            Envelope::Unknown => None,
        }
    }
}
