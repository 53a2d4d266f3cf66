//! Session controller: the connection-side handle to one worker.
//!
//! The controller owns the channel pair and a background result listener.
//! Command methods are fire-and-forget sends over the framed protocol;
//! replies arrive asynchronously on the listener thread and are forwarded to
//! the single registered callback. Shutdown is cooperative first (signal +
//! `Shutdown` command), forceful after a grace period: a hard kill is the
//! backstop for a worker process that will not exit.

use crate::audio::AudioPreprocessor;
use crate::channel::{
    FramedReceiver, FramedSender, PipeRecordReader, PipeRecordWriter, RecordReceiver, RecordSender,
    memory_record_channel,
};
use crate::config::{LanguageModel, TextModel};
use crate::decoder::EngineFactory;
use crate::defaults;
use crate::error::{RemvoxError, Result};
use crate::protocol::{Command, WorkerReply};
use crate::session::worker::{SessionWorker, ShutdownSignal};
use std::path::PathBuf;
use std::process::{Child, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type ReplyCallback = Box<dyn Fn(WorkerReply) + Send + 'static>;

/// How to start a worker child process.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl WorkerLauncher {
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Launch workers by re-invoking the current executable's hidden
    /// `worker` subcommand.
    pub fn current_exe(audio_prefix: &str) -> Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: vec![
                "worker".to_string(),
                "--audio-prefix".to_string(),
                audio_prefix.to_string(),
            ],
        })
    }

    fn spawn(&self) -> Result<Child> {
        std::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| RemvoxError::WorkerSpawn {
                message: format!("{}: {}", self.program.display(), e),
            })
    }
}

/// The worker's host: a child process or a dedicated thread.
enum WorkerBackend {
    Thread(Mutex<Option<thread::JoinHandle<()>>>),
    Process(Mutex<Option<Child>>),
}

/// Per-connection handle to one isolated session worker.
pub struct SessionController {
    commands: FramedSender<Box<dyn RecordSender>>,
    callback: Arc<Mutex<Option<ReplyCallback>>>,
    signal: ShutdownSignal,
    backend: Arc<WorkerBackend>,
    shutdown_started: Arc<AtomicBool>,
    reaped: Arc<AtomicBool>,
}

impl SessionController {
    /// Spawn the worker as a child process via `launcher`.
    ///
    /// This is the production mode: decoding happens in its own OS process
    /// and can never stall the server's event loop.
    pub fn spawn_process(launcher: &WorkerLauncher) -> Result<Self> {
        let mut child = launcher.spawn()?;
        let stdin = child.stdin.take().ok_or_else(|| RemvoxError::WorkerSpawn {
            message: "worker child has no stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| RemvoxError::WorkerSpawn {
            message: "worker child has no stdout".to_string(),
        })?;
        info!(pid = child.id(), "spawned worker process");

        let commands: Box<dyn RecordSender> = Box::new(PipeRecordWriter::new(stdin));
        let replies = PipeRecordReader::spawn(stdout);
        Ok(Self::assemble(
            commands,
            replies,
            ShutdownSignal::new(),
            WorkerBackend::Process(Mutex::new(Some(child))),
        ))
    }

    /// Spawn the worker on a dedicated thread with in-memory channels.
    ///
    /// No shared mutable state crosses the boundary; communication is
    /// message-passing only, exactly as in process mode. Used when the
    /// engine factory lives in-process (and by the test suite).
    pub fn spawn_thread(
        engine_factory: Arc<dyn EngineFactory>,
        preprocessor: AudioPreprocessor,
    ) -> Result<Self> {
        let (cmd_tx, cmd_rx) = memory_record_channel(defaults::RECORD_CHANNEL_CAPACITY);
        let (reply_tx, reply_rx) = memory_record_channel(defaults::RECORD_CHANNEL_CAPACITY);
        let signal = ShutdownSignal::new();

        let worker = SessionWorker::new(
            cmd_rx,
            reply_tx,
            engine_factory,
            preprocessor,
            signal.clone(),
        );
        let handle = thread::Builder::new()
            .name("session-worker".to_string())
            .spawn(move || worker.run())
            .map_err(|e| RemvoxError::WorkerSpawn {
                message: e.to_string(),
            })?;

        let commands: Box<dyn RecordSender> = Box::new(cmd_tx);
        Ok(Self::assemble(
            commands,
            reply_rx,
            signal,
            WorkerBackend::Thread(Mutex::new(Some(handle))),
        ))
    }

    fn assemble<R>(
        commands: Box<dyn RecordSender>,
        replies: R,
        signal: ShutdownSignal,
        backend: WorkerBackend,
    ) -> Self
    where
        R: RecordReceiver + 'static,
    {
        let callback: Arc<Mutex<Option<ReplyCallback>>> = Arc::new(Mutex::new(None));
        spawn_result_listener(replies, Arc::clone(&callback));
        Self {
            commands: FramedSender::new(commands),
            callback,
            signal,
            backend: Arc::new(backend),
            shutdown_started: Arc::new(AtomicBool::new(false)),
            reaped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register the reply callback; replaces any previous registration.
    pub fn set_reply_callback<F>(&self, callback: F)
    where
        F: Fn(WorkerReply) + Send + 'static,
    {
        let mut guard = match self.callback.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Box::new(callback));
    }

    pub fn set_models(&self, language_model: LanguageModel, text_model: TextModel) -> Result<()> {
        self.send(&Command::SetModels {
            language_model,
            text_model,
        })
    }

    pub fn start_audio(&self) -> Result<()> {
        self.send(&Command::StartAudio)
    }

    pub fn process_audio_chunk(&self, audio: String) -> Result<()> {
        self.send(&Command::ProcessAudio { audio })
    }

    pub fn stop_audio(&self) -> Result<()> {
        self.send(&Command::StopAudio)
    }

    pub fn set_keyphrase_mode(&self, enabled: bool) -> Result<()> {
        self.send(&Command::SetKeyphraseMode { enabled })
    }

    fn send(&self, command: &Command) -> Result<()> {
        self.commands.send(command)
    }

    /// Request shutdown: cooperative signal plus a grace-period reaper that
    /// forcefully terminates the worker if it does not exit on its own.
    /// Idempotent; later calls are no-ops.
    pub fn shutdown(&self) {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.send(&Command::Shutdown) {
            debug!("shutdown command not delivered: {}", e);
        }
        self.signal.trip();

        let backend = Arc::clone(&self.backend);
        let reaped = Arc::clone(&self.reaped);
        let spawned = thread::Builder::new()
            .name("worker-reaper".to_string())
            .spawn(move || {
                reap_worker(&backend, defaults::SHUTDOWN_GRACE);
                reaped.store(true, Ordering::SeqCst);
            });
        if let Err(e) = spawned {
            warn!("failed to spawn worker reaper: {}", e);
            reap_worker(&self.backend, defaults::SHUTDOWN_GRACE);
            self.reaped.store(true, Ordering::SeqCst);
        }
    }

    /// Wait until the worker has exited (or been forcefully reaped).
    /// Returns false on timeout. Intended for orderly teardown and tests.
    pub fn wait_exit(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.reaped.load(Ordering::SeqCst) {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.reaped.load(Ordering::SeqCst)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The single consumer of the inbound reply channel: receives each reply and
/// forwards it to the registered callback. Per-iteration failures are logged
/// and the loop continues; only channel disconnection ends it.
fn spawn_result_listener<R>(replies: R, callback: Arc<Mutex<Option<ReplyCallback>>>)
where
    R: RecordReceiver + 'static,
{
    let spawned = thread::Builder::new()
        .name("result-listener".to_string())
        .spawn(move || {
            let mut framed = FramedReceiver::new(replies);
            loop {
                match framed.recv::<WorkerReply>() {
                    Ok(reply) => {
                        let guard = match callback.lock() {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        match guard.as_ref() {
                            Some(cb) => cb(reply),
                            None => warn!("worker reply dropped: no callback registered"),
                        }
                    }
                    Err(RemvoxError::ChannelDisconnected) => {
                        debug!("reply channel disconnected, result listener exiting");
                        break;
                    }
                    Err(e) => {
                        error!("failed receiving worker reply: {}", e);
                    }
                }
            }
        });
    if let Err(e) = spawned {
        error!("failed to spawn result listener: {}", e);
    }
}

/// Give the worker the grace period, then terminate it the hard way.
fn reap_worker(backend: &WorkerBackend, grace: Duration) {
    let deadline = Instant::now() + grace;
    match backend {
        WorkerBackend::Thread(slot) => {
            let handle = match slot.lock() {
                Ok(mut guard) => guard.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            let Some(handle) = handle else { return };
            while Instant::now() < deadline {
                if handle.is_finished() {
                    let _ = handle.join();
                    return;
                }
                thread::sleep(Duration::from_millis(20));
            }
            // Threads cannot be killed; the worker is detached and the
            // channels it holds are already poisoned by the signal.
            warn!("worker thread did not exit within grace period, abandoning");
        }
        WorkerBackend::Process(slot) => {
            let child = match slot.lock() {
                Ok(mut guard) => guard.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            let Some(mut child) = child else { return };
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        debug!(pid = child.id(), %status, "worker process exited");
                        return;
                    }
                    Ok(None) if Instant::now() >= deadline => {
                        warn!(pid = child.id(), "worker missed grace period, killing");
                        if let Err(e) = child.kill() {
                            warn!("failed to kill worker process: {}", e);
                        }
                        let _ = child.wait();
                        return;
                    }
                    Ok(None) => thread::sleep(Duration::from_millis(20)),
                    Err(e) => {
                        warn!("failed to poll worker process: {}", e);
                        return;
                    }
                }
            }
        }
    }
}
