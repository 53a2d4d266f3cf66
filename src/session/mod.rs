//! Session engine: per-connection worker and its controller.

pub mod controller;
pub mod worker;

pub use controller::{SessionController, WorkerLauncher};
pub use worker::{SessionWorker, ShutdownSignal, run_worker_process};

/// Where a connection stands in the utterance lifecycle.
///
/// Owned by the connection handler and mutated only on its serial command
/// path; it mirrors the worker's own state guard so illegal commands can be
/// rejected at the protocol boundary without a worker round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing initialized yet; only model selection is legal.
    Uninitialized,
    /// A model has been requested; audio may be started.
    ModelLoaded,
    /// Inside an utterance; audio chunks and end-of-speech are legal.
    Listening,
}
