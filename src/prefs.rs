//! User preferences that survive restarts: the last discovery URL, synthesis rate and
//! recognition language. None of them are needed for correctness; a missing or broken
//! file just means defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::client::consts::{DEFAULT_DISCOVERY_URL, DEFAULT_STT_LANG, DEFAULT_TTS_RATE};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub discovery_url: String,
    pub tts_rate: f32,
    pub stt_lang: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            discovery_url: DEFAULT_DISCOVERY_URL.to_string(),
            tts_rate: DEFAULT_TTS_RATE,
            stt_lang: DEFAULT_STT_LANG.to_string(),
        }
    }
}

pub type SharedPreferences = Arc<Mutex<PreferenceStore>>;

/// Preferences backed by an optional JSON file. Without a path it is memory-only.
#[derive(Debug)]
pub struct PreferenceStore {
    path: Option<PathBuf>,
    current: Preferences,
}

impl PreferenceStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: Preferences::default(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let current = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable preferences {}: {}", path.display(), e);
                Preferences::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Preferences::default(),
            Err(e) => {
                tracing::warn!("failed to read preferences {}: {}", path.display(), e);
                Preferences::default()
            }
        };
        Self {
            path: Some(path),
            current,
        }
    }

    pub fn shared(self) -> SharedPreferences {
        Arc::new(Mutex::new(self))
    }

    pub fn get(&self) -> &Preferences {
        &self.current
    }

    pub fn set_discovery_url(&mut self, url: &str) {
        self.update(|p| p.discovery_url = url.to_string());
    }

    pub fn set_tts_rate(&mut self, rate: f32) {
        self.update(|p| p.tts_rate = rate);
    }

    pub fn set_stt_lang(&mut self, lang: &str) {
        self.update(|p| p.stt_lang = lang.to_string());
    }

    fn update(&mut self, f: impl FnOnce(&mut Preferences)) {
        let before = self.current.clone();
        f(&mut self.current);
        if self.current != before {
            if let Err(e) = self.save() {
                tracing::warn!("failed to save preferences: {}", e);
            }
        }
    }

    fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&self.current)?)?;
        tracing::debug!("preferences saved to {}", path.display());
        Ok(())
    }
}
