//! Error types for remvox.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemvoxError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Configuration error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Unknown language '{language}' in configuration")]
    UnknownLanguage { language: String },

    #[error("Unknown accent '{accent}' for language '{language}'")]
    UnknownAccent { language: String, accent: String },

    // Model errors
    #[error("Invalid language model '{name}': {message}")]
    ModelInvalid { name: String, message: String },

    #[error("Failed loading stopwords from {origin}: {message}")]
    StopwordLoad { origin: String, message: String },

    // Channel errors
    #[error("Channel broken after {attempts} send attempts")]
    ChannelBroken { attempts: u32 },

    #[error("Channel disconnected")]
    ChannelDisconnected,

    // Decoder errors
    #[error("Decoder error: {message}")]
    Decoder { message: String },

    // Worker lifecycle errors
    #[error("Failed to spawn session worker: {message}")]
    WorkerSpawn { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience result type for remvox operations.
pub type Result<T> = std::result::Result<T, RemvoxError>;
