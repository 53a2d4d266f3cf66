//! Command-line interface for remvox
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Streaming speech-to-text session server
#[derive(Parser, Debug)]
#[command(name = "remvox", version, about = "Streaming speech-to-text session server")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the session server (default)
    Serve {
        /// Listen address override, e.g. 127.0.0.1:8090
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
    },

    /// Validate the configuration file and every model it references
    CheckConfig,

    /// Internal: run a session worker over stdin/stdout
    #[command(hide = true)]
    Worker {
        /// Expected data-URI prefix on incoming audio chunks
        #[arg(long, value_name = "PREFIX")]
        audio_prefix: Option<String>,
    },
}
