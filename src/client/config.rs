use std::env;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::client::consts::{
    DEFAULT_ATTESTATION, DEFAULT_CHANNEL_CAPACITY, DEFAULT_HTTP_TIMEOUT, DEFAULT_RELAY_SERVER,
    ENV_ATTESTATION, ENV_DISCOVERY, ENV_HTTP_TIMEOUT, ENV_PREFERENCES, ENV_RELAY, ENV_TTS_COMMAND,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidVar { var: &'static str, value: String },
}

/// Client settings. Everything the user picks per call (bot, mode) lives on the session
/// instead.
#[derive(Debug, Clone)]
pub struct Config {
    discovery_url: Option<String>,
    attestation: SecretString,
    http_timeout: Duration,
    relay_server: String,
    channel_capacity: usize,
    tts_command: Option<String>,
    preferences_path: Option<PathBuf>,
}

pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_discovery_url(mut self, url: &str) -> Self {
        self.config.discovery_url = Some(url.to_string());
        self
    }

    pub fn with_attestation(mut self, token: &str) -> Self {
        self.config.attestation = SecretString::from(token.to_string());
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.config.http_timeout = timeout;
        self
    }

    pub fn with_relay_server(mut self, relay: &str) -> Self {
        self.config.relay_server = relay.to_string();
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn with_tts_command(mut self, command: &str) -> Self {
        self.config.tts_command = Some(command.to_string());
        self
    }

    pub fn with_preferences_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.preferences_path = Some(path.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    // Defaults only; nothing is read from the environment here.
    pub fn new() -> Self {
        Self {
            discovery_url: None,
            attestation: SecretString::from(DEFAULT_ATTESTATION.to_string()),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            relay_server: DEFAULT_RELAY_SERVER.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            tts_command: None,
            preferences_path: None,
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// A builder seeded with these settings, for layering overrides on top.
    pub fn into_builder(self) -> ConfigBuilder {
        ConfigBuilder { config: self }
    }

    /// Loads settings from the environment (and `.env`, if present).
    ///
    // *   `BOTCALL_DISCOVERY`: discovery server URL; overrides the persisted one.
    // *   `BOTCALL_ATTESTATION`: opaque token sent with every call request. Defaults to "anonymous".
    // *   `BOTCALL_HTTP_TIMEOUT_SECS`: timeout for lookup, call and channel connect. Defaults to 10.
    // *   `BOTCALL_RELAY`: ICE server used for the voice path. Defaults to Google's public STUN.
    // *   `BOTCALL_TTS_COMMAND`: (Optional) command line that speaks its last argument, e.g. "espeak".
    // *   `BOTCALL_PREFERENCES`: (Optional) preferences file. Defaults to the user config dir.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = Self::builder();

        if let Some(url) = non_empty_var(ENV_DISCOVERY) {
            builder = builder.with_discovery_url(&url);
        }
        if let Some(token) = non_empty_var(ENV_ATTESTATION) {
            builder = builder.with_attestation(&token);
        }
        if let Some(secs) = non_empty_var(ENV_HTTP_TIMEOUT) {
            let parsed = secs
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or(ConfigError::InvalidVar {
                    var: ENV_HTTP_TIMEOUT,
                    value: secs.clone(),
                })?;
            builder = builder.with_http_timeout(Duration::from_secs(parsed));
        }
        if let Some(relay) = non_empty_var(ENV_RELAY) {
            builder = builder.with_relay_server(&relay);
        }
        if let Some(command) = non_empty_var(ENV_TTS_COMMAND) {
            builder = builder.with_tts_command(&command);
        }
        if let Some(path) = non_empty_var(ENV_PREFERENCES) {
            builder = builder.with_preferences_path(path);
        }

        Ok(builder.build())
    }

    pub fn discovery_url(&self) -> Option<&str> {
        self.discovery_url.as_deref()
    }

    pub fn attestation(&self) -> &SecretString {
        &self.attestation
    }

    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    pub fn relay_server(&self) -> &str {
        &self.relay_server
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn tts_command(&self) -> Option<&str> {
        self.tts_command.as_deref()
    }

    /// The configured preferences file, or `<config dir>/botcall/preferences.json`.
    pub fn preferences_path(&self) -> Option<PathBuf> {
        self.preferences_path.clone().or_else(|| {
            dirs::config_dir().map(|dir| dir.join("botcall").join("preferences.json"))
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
