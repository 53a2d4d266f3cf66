//! Default configuration constants for remvox.
//!
//! Shared tuning knobs for the framed channel protocol, the session
//! lifecycle, and audio preprocessing. Kept in one place so the worker and
//! controller sides of a channel always agree.

use std::time::Duration;

/// Sample rate the decoder expects, in Hz.
///
/// 16kHz 16-bit mono is the standard input format for speech recognition
/// engines; all incoming audio is resampled to this rate.
pub const SAMPLE_RATE: u32 = 16000;

/// Maximum payload bytes carried by a single channel record.
///
/// Matches the transport's practical unit size; messages larger than this
/// are split into multiple chunk records by the framed protocol.
pub const RECORD_PAYLOAD_MAX: usize = 3000;

/// Maximum send attempts for one record before the channel is declared broken.
pub const SEND_RETRY_LIMIT: u32 = 1000;

/// Delay between send attempts on a transiently unavailable channel.
pub const SEND_RETRY_DELAY: Duration = Duration::from_micros(500);

/// Delay between receive polls when no record is available yet.
pub const RECV_POLL_DELAY: Duration = Duration::from_millis(10);

/// Interval at which the worker's watcher polls the shutdown signal.
pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Grace period between a shutdown request and the hard kill of a worker
/// that has not exited on its own.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Capacity (in records) of an in-memory record channel.
pub const RECORD_CHANNEL_CAPACITY: usize = 256;

/// Data-URI prefix browsers put in front of base64 audio blobs.
pub const DEFAULT_AUDIO_PREFIX: &str = "data:audio/wav;base64,";

/// Default listen address for the session server.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8090";

/// Default configuration file path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "configs/remvox.toml";
