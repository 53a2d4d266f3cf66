//! Configuration loading and language model resolution.
//!
//! The configuration file maps language selectors to on-disk decoder model
//! paths and stopword sources. Sessions never read the file directly: the
//! [`ConfigStore`] hands out immutable snapshots, and `reload()` is the only
//! way the running configuration changes.

use crate::defaults;
use crate::error::{RemvoxError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub stt: SttConfig,
    /// Language selector → model entry (e.g. `[languages.en]`).
    pub languages: HashMap<String, LanguageEntry>,
}

/// Session server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

/// Speech-to-text configuration shared by all sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    /// Base directory all model paths are resolved against.
    pub model_dir: PathBuf,
    /// Data-URI prefix stripped from incoming base64 audio chunks.
    pub audio_prefix: String,
}

/// One configured language: decoder model paths plus the stopword source
/// for keyphrase ranking. Paths are relative to `stt.model_dir`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageEntry {
    pub name: String,
    pub acoustic_model: PathBuf,
    pub language_model: PathBuf,
    pub dictionary: PathBuf,
    /// Stopword source identifier: `builtin:<language>` or a file path.
    #[serde(default)]
    pub stopwords: Option<String>,
    /// Accent variants that swap in a different acoustic model.
    #[serde(default)]
    pub accents: HashMap<String, AccentEntry>,
}

/// Accent override for a language entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccentEntry {
    pub acoustic_model: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: defaults::DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            audio_prefix: defaults::DEFAULT_AUDIO_PREFIX.to_string(),
        }
    }
}

/// A resolved language model: the three decoder resources for one
/// language/accent combination. Consumed read-only by the session worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageModel {
    pub name: String,
    pub acoustic_model: PathBuf,
    pub language_model: PathBuf,
    pub dictionary: PathBuf,
}

impl LanguageModel {
    /// A model is valid only if all three resources exist on disk.
    pub fn is_valid(&self) -> bool {
        self.acoustic_model.exists() && self.language_model.exists() && self.dictionary.exists()
    }

    /// Validity check that names the first missing resource.
    pub fn validate(&self) -> Result<()> {
        for (label, path) in [
            ("acoustic model", &self.acoustic_model),
            ("language model", &self.language_model),
            ("dictionary", &self.dictionary),
        ] {
            if !path.exists() {
                return Err(RemvoxError::ModelInvalid {
                    name: self.name.clone(),
                    message: format!("{} missing at {}", label, path.display()),
                });
            }
        }
        Ok(())
    }
}

/// The text-processing side of a language selection: where the keyphrase
/// ranker's stopword list comes from. Read-only once set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextModel {
    pub stopwords: String,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RemvoxError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                RemvoxError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file, or return defaults if it is missing.
    ///
    /// Invalid TOML is still an error; only a missing file falls back.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(RemvoxError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Resolve a language selector (and optional accent) to the model pair a
    /// session needs.
    pub fn resolve(&self, language: &str, accent: Option<&str>) -> Result<(LanguageModel, TextModel)> {
        let entry = self
            .languages
            .get(language)
            .ok_or_else(|| RemvoxError::UnknownLanguage {
                language: language.to_string(),
            })?;

        let acoustic = match accent {
            None | Some("") => entry.acoustic_model.clone(),
            Some(accent) => {
                entry
                    .accents
                    .get(accent)
                    .ok_or_else(|| RemvoxError::UnknownAccent {
                        language: language.to_string(),
                        accent: accent.to_string(),
                    })?
                    .acoustic_model
                    .clone()
            }
        };

        let base = &self.stt.model_dir;
        let language_model = LanguageModel {
            name: entry.name.clone(),
            acoustic_model: base.join(acoustic),
            language_model: base.join(&entry.language_model),
            dictionary: base.join(&entry.dictionary),
        };
        let text_model = TextModel {
            stopwords: entry
                .stopwords
                .clone()
                .unwrap_or_else(|| format!("builtin:{}", language)),
        };
        Ok((language_model, text_model))
    }
}

/// Holds the current configuration and hands out immutable snapshots.
///
/// Sessions capture an `Arc<Config>` when they start and keep it for their
/// lifetime; `reload()` only affects sessions created afterwards.
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<Config>>,
}

impl ConfigStore {
    /// Load the initial configuration from `path`.
    pub fn open(path: PathBuf) -> Result<Self> {
        let config = Config::load_or_default(&path)?;
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// Create a store around a fixed configuration (tests, embedding).
    pub fn fixed(config: Config) -> Self {
        Self {
            path: PathBuf::new(),
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// The current configuration snapshot.
    pub fn snapshot(&self) -> Arc<Config> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            // A poisoned lock still holds a usable snapshot.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Re-read the configuration file and swap in the new snapshot.
    ///
    /// On failure the previous snapshot stays in place.
    pub fn reload(&self) -> Result<()> {
        let config = Config::load(&self.path)?;
        let snapshot = Arc::new(config);
        match self.current.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
        Ok(())
    }
}
