use std::time::Duration;

pub const DEFAULT_DISCOVERY_URL: &str = "http://localhost:8080";
pub const DEFAULT_RELAY_SERVER: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_ATTESTATION: &str = "anonymous";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
pub const DEFAULT_STT_LANG: &str = "en-US";
pub const DEFAULT_TTS_RATE: f32 = 1.0;

pub const LOOKUP_PATH: [&str; 2] = ["v1", "lookup"];
pub const CALL_PATH: &str = "call";
pub const AGENT_QUERY: &str = "agent";
pub const HUMAN_ID_PREFIX: &str = "human-";

pub const ENV_DISCOVERY: &str = "BOTCALL_DISCOVERY";
pub const ENV_ATTESTATION: &str = "BOTCALL_ATTESTATION";
pub const ENV_HTTP_TIMEOUT: &str = "BOTCALL_HTTP_TIMEOUT_SECS";
pub const ENV_RELAY: &str = "BOTCALL_RELAY";
pub const ENV_TTS_COMMAND: &str = "BOTCALL_TTS_COMMAND";
pub const ENV_PREFERENCES: &str = "BOTCALL_PREFERENCES";
