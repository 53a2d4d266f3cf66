//! remvox - Streaming speech-to-text session engine
//!
//! Per-connection isolated workers, a framed command protocol, and
//! keyphrase extraction over recognized text.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod channel;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod defaults;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod text;

// Core traits
pub use decoder::{EngineFactory, RecognitionEngine};
pub use text::Tokenizer;

// Session engine
pub use session::{SessionController, SessionState, SessionWorker, WorkerLauncher};

// Wire types
pub use protocol::{Command, DecoderState, KeyphraseRank, WorkerReply};

// Error handling
pub use error::{RemvoxError, Result};

// Config
pub use config::{Config, ConfigStore, LanguageModel, TextModel};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
