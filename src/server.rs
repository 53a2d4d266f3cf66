//! Line-delimited JSON server for streaming transcription sessions.
//!
//! Each TCP connection gets its own isolated worker. Client commands are
//! single JSON objects per line; worker replies are forwarded back as JSON
//! lines in arrival order. The connection handler owns a coarse session
//! state and rejects out-of-order commands with a client-visible error
//! instead of forwarding them.

use crate::audio::AudioPreprocessor;
use crate::config::ConfigStore;
use crate::decoder::EngineFactory;
use crate::defaults;
use crate::session::{SessionController, SessionState, WorkerLauncher};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const ERR_MODEL_NOT_SET: &str = "The language model is not currently set!";
const ERR_AUDIO_NOT_READY: &str =
    "The language model is not currently set, and/or the start speech command hasn't been sent!";
const ERR_UNNECESSARY_END: &str = "Unnecessary end speech has been called!";
const ERR_INVALID_COMMAND: &str = "Invalid command!";
const ERR_WORKER_UNAVAILABLE: &str = "Speech worker is unavailable!";

/// How the server hosts each connection's worker.
#[derive(Clone)]
pub enum WorkerMode {
    /// Child process per connection, launched through the given launcher.
    Process(WorkerLauncher),
    /// Dedicated thread per connection with the given in-process engine.
    InThread(Arc<dyn EngineFactory>),
}

pub struct Server {
    store: Arc<ConfigStore>,
    mode: WorkerMode,
}

impl Server {
    pub fn new(store: Arc<ConfigStore>, mode: WorkerMode) -> Self {
        Self { store, mode }
    }

    /// Bind and accept until the listener fails.
    pub async fn run(self, listen: &str) -> crate::error::Result<()> {
        let listener = TcpListener::bind(listen).await?;
        self.serve(listener).await
    }

    /// Bind and run, reporting the bound address through `bound`. Lets
    /// callers use an ephemeral port.
    pub async fn run_bound(
        self,
        listen: &str,
        bound: tokio::sync::oneshot::Sender<SocketAddr>,
    ) -> crate::error::Result<()> {
        let listener = TcpListener::bind(listen).await?;
        let _ = bound.send(listener.local_addr()?);
        self.serve(listener).await
    }

    async fn serve(self, listener: TcpListener) -> crate::error::Result<()> {
        let addr = listener.local_addr()?;
        info!(%addr, "listening for transcription sessions");

        loop {
            let (socket, peer) = listener.accept().await?;
            let store = Arc::clone(&self.store);
            let mode = self.mode.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, peer, store, mode).await {
                    warn!(%peer, "connection ended with error: {}", e);
                }
            });
        }
    }
}

async fn handle_connection(
    socket: TcpStream,
    peer: SocketAddr,
    store: Arc<ConfigStore>,
    mode: WorkerMode,
) -> crate::error::Result<()> {
    info!(%peer, "session opened");
    let (read_half, mut write_half) = socket.into_split();

    // Single writer task keeps worker replies and handler errors from
    // interleaving mid-line.
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(line) = outbound_rx.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if write_half.write_all(b"\n").await.is_err() {
                break;
            }
            if write_half.flush().await.is_err() {
                break;
            }
        }
    });

    let preprocessor = AudioPreprocessor::new(store.snapshot().stt.audio_prefix.clone());
    let controller = match &mode {
        WorkerMode::Process(launcher) => SessionController::spawn_process(launcher),
        WorkerMode::InThread(factory) => {
            SessionController::spawn_thread(Arc::clone(factory), preprocessor)
        }
    };
    let controller = match controller {
        Ok(controller) => controller,
        Err(e) => {
            warn!(%peer, "failed to spawn session worker: {}", e);
            send_error(&outbound, ERR_WORKER_UNAVAILABLE);
            drop(outbound);
            let _ = writer.await;
            return Err(e);
        }
    };

    let reply_outbound = outbound.clone();
    controller.set_reply_callback(move |reply| match serde_json::to_string(&reply) {
        Ok(line) => {
            let _ = reply_outbound.send(line);
        }
        Err(e) => warn!("failed to serialize worker reply: {}", e),
    });

    let mut state = SessionState::Uninitialized;
    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        handle_client_line(&line, &mut state, &controller, &store, &outbound);
    }

    info!(%peer, "session closed");
    controller.shutdown();
    // The reply callback holds an outbound sender; the writer drains only
    // after the controller (and its listener thread) let go of it.
    drop(controller);
    drop(outbound);
    let _ = tokio::time::timeout(defaults::SHUTDOWN_GRACE * 2, writer).await;
    Ok(())
}

/// Dispatch one client line. Key precedence follows the session grammar:
/// model selection first, then speech start, audio, speech end, options.
fn handle_client_line(
    line: &str,
    state: &mut SessionState,
    controller: &SessionController,
    store: &ConfigStore,
    outbound: &mpsc::UnboundedSender<String>,
) {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            debug!("unparseable client line: {}", e);
            send_error(outbound, ERR_INVALID_COMMAND);
            return;
        }
    };

    if let Some(model) = value.get("model").and_then(serde_json::Value::as_str) {
        let accent = value.get("accent").and_then(serde_json::Value::as_str);
        match store.snapshot().resolve(model, accent) {
            Ok((language_model, text_model)) => {
                if controller.set_models(language_model, text_model).is_ok() {
                    *state = SessionState::ModelLoaded;
                } else {
                    send_error(outbound, ERR_WORKER_UNAVAILABLE);
                }
            }
            Err(e) => send_error(outbound, &e.to_string()),
        }
    } else if value.get("start_speech").is_some() {
        match state {
            SessionState::ModelLoaded => {
                if controller.start_audio().is_ok() {
                    *state = SessionState::Listening;
                } else {
                    send_error(outbound, ERR_WORKER_UNAVAILABLE);
                }
            }
            _ => send_error(outbound, ERR_MODEL_NOT_SET),
        }
    } else if let Some(audio) = value.get("audio").and_then(serde_json::Value::as_str) {
        match state {
            SessionState::Listening => {
                if controller.process_audio_chunk(audio.to_string()).is_err() {
                    send_error(outbound, ERR_WORKER_UNAVAILABLE);
                }
            }
            _ => send_error(outbound, ERR_AUDIO_NOT_READY),
        }
    } else if value.get("end_speech").is_some() {
        match state {
            SessionState::Listening => {
                if controller.stop_audio().is_ok() {
                    *state = SessionState::ModelLoaded;
                } else {
                    send_error(outbound, ERR_WORKER_UNAVAILABLE);
                }
            }
            _ => send_error(outbound, ERR_UNNECESSARY_END),
        }
    } else if let Some(enabled) = value.get("set_keyphrases").and_then(serde_json::Value::as_bool) {
        if controller.set_keyphrase_mode(enabled).is_err() {
            send_error(outbound, ERR_WORKER_UNAVAILABLE);
        }
    } else {
        send_error(outbound, ERR_INVALID_COMMAND);
    }
}

fn send_error(outbound: &mpsc::UnboundedSender<String>, message: &str) {
    let line = serde_json::json!({ "error": message }).to_string();
    let _ = outbound.send(line);
}
