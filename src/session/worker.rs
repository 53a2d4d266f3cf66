//! Session worker: command dispatch loop and utterance state machine.
//!
//! One worker owns one decoder instance and serves one session. It consumes
//! commands serially from its framed channel, drives the recognition engine
//! and the keyphrase ranker, and pushes replies back on the opposite
//! channel. State transitions are race-free by construction: the dispatch
//! loop is the only mutator, and the shutdown watcher only ever pushes the
//! loop toward exit.
//!
//! Workers run either inside a spawned child process (see
//! [`run_worker_process`]) or on a dedicated thread with in-memory record
//! channels; the loop is generic over the transport either way.

use crate::audio::AudioPreprocessor;
use crate::channel::{
    FramedReceiver, FramedSender, PipeRecordReader, PipeRecordWriter, RecordReceiver, RecordSender,
};
use crate::decoder::{EngineFactory, RecognitionEngine};
use crate::defaults;
use crate::error::{RemvoxError, Result};
use crate::protocol::{Command, KeyphraseRank, WorkerReply};
use crate::text::{KeyphraseRanker, RuleTokenizer, stopword_set};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, error, info, warn};

/// Error reported when model loading fails, verbatim on the client protocol.
pub const ERR_MODEL_LOAD: &str = "Failed loading language model!";
/// Error reported for audio commands without a loaded model.
pub const ERR_MODEL_NOT_LOADED: &str = "Language model not loaded!";

/// Cooperative cancellation signal observed by the worker at bounded latency.
///
/// Trips exactly once and never resets; every observer only ever moves the
/// worker toward shutdown, so signal/loop interleavings commute.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    tripped: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self) {
        self.tripped.store(true, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

/// Worker-side lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    NoModel,
    ModelLoaded,
    Listening,
    ShuttingDown,
}

/// The per-session worker loop.
pub struct SessionWorker<R: RecordReceiver, S: RecordSender> {
    commands: FramedReceiver<R>,
    replies: FramedSender<S>,
    engine_factory: Arc<dyn EngineFactory>,
    preprocessor: AudioPreprocessor,
    tokenizer: RuleTokenizer,
    engine: Option<Box<dyn RecognitionEngine>>,
    ranker: Option<KeyphraseRanker>,
    keyphrases_enabled: bool,
    state: WorkerState,
    signal: ShutdownSignal,
    running: Arc<AtomicBool>,
}

impl<R: RecordReceiver, S: RecordSender> SessionWorker<R, S> {
    pub fn new(
        command_rx: R,
        reply_tx: S,
        engine_factory: Arc<dyn EngineFactory>,
        preprocessor: AudioPreprocessor,
        signal: ShutdownSignal,
    ) -> Self {
        Self {
            commands: FramedReceiver::new(command_rx),
            replies: FramedSender::new(reply_tx),
            engine_factory,
            preprocessor,
            tokenizer: RuleTokenizer,
            engine: None,
            ranker: None,
            keyphrases_enabled: false,
            state: WorkerState::NoModel,
            signal,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Run the command loop until shutdown or channel disconnect.
    ///
    /// Never propagates a per-iteration failure; everything is logged and the
    /// loop continues, so a controller can always still deliver a shutdown.
    pub fn run(mut self) {
        debug!("session worker started");
        let watcher = self.spawn_shutdown_watcher();

        while self.running.load(Ordering::SeqCst) {
            let running = Arc::clone(&self.running);
            match self
                .commands
                .recv_until::<Command, _>(|| !running.load(Ordering::SeqCst))
            {
                Ok(Some(command)) => self.dispatch(command),
                Ok(None) => break,
                Err(RemvoxError::ChannelDisconnected) => {
                    info!("command channel disconnected, shutting down worker");
                    break;
                }
                Err(e) => {
                    error!("failed receiving command: {}", e);
                }
            }
        }

        self.enter_shutdown();
        self.running.store(false, Ordering::SeqCst);
        if let Some(watcher) = watcher {
            let _ = watcher.join();
        }
        debug!("session worker exited");
    }

    /// Watcher polling the cooperative signal independently of the command
    /// loop, so "stop accepting commands" does not wait on a command in
    /// flight.
    fn spawn_shutdown_watcher(&self) -> Option<thread::JoinHandle<()>> {
        let signal = self.signal.clone();
        let running = Arc::clone(&self.running);
        thread::Builder::new()
            .name("shutdown-watcher".to_string())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    if signal.is_tripped() {
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                    thread::sleep(defaults::SHUTDOWN_POLL_INTERVAL);
                }
            })
            .map_err(|e| warn!("failed to spawn shutdown watcher: {}", e))
            .ok()
    }

    /// Terminal cleanup: close any active utterance, best effort.
    fn enter_shutdown(&mut self) {
        if self.state == WorkerState::Listening
            && let Some(engine) = self.engine.as_mut()
            && let Err(e) = engine.end_utterance()
        {
            // The connection is already terminating; log only.
            warn!("failed ending utterance during shutdown: {}", e);
        }
        self.state = WorkerState::ShuttingDown;
    }

    fn dispatch(&mut self, command: Command) {
        match command {
            Command::SetModels {
                language_model,
                text_model,
            } => self.handle_set_models(language_model, text_model),
            Command::StartAudio => self.handle_start_audio(),
            Command::ProcessAudio { audio } => self.handle_process_audio(&audio),
            Command::StopAudio => self.handle_stop_audio(),
            Command::SetKeyphraseMode { enabled } => {
                debug!(enabled, "keyphrase mode updated");
                self.keyphrases_enabled = enabled;
            }
            Command::Shutdown => {
                info!("shutdown command received");
                self.signal.trip();
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    fn handle_set_models(
        &mut self,
        language_model: crate::config::LanguageModel,
        text_model: crate::config::TextModel,
    ) {
        if !language_model.is_valid() {
            error!("language model '{}' is invalid", language_model.name);
            self.reply(&WorkerReply::error(ERR_MODEL_LOAD));
            return;
        }

        let stopwords = match stopword_set(&text_model.stopwords) {
            Ok(set) => set,
            Err(e) => {
                error!("text model '{}' failed to load: {}", text_model.stopwords, e);
                self.reply(&WorkerReply::error(ERR_MODEL_LOAD));
                return;
            }
        };

        let engine = match self.engine_factory.load(&language_model) {
            Ok(engine) => engine,
            Err(e) => {
                error!("decoder rejected model '{}': {}", language_model.name, e);
                self.reply(&WorkerReply::error(ERR_MODEL_LOAD));
                return;
            }
        };

        // Swapping models mid-utterance closes the old one first.
        if self.state == WorkerState::Listening
            && let Some(old) = self.engine.as_mut()
            && let Err(e) = old.end_utterance()
        {
            warn!("failed ending utterance before model swap: {}", e);
        }

        self.engine = Some(engine);
        self.ranker = Some(KeyphraseRanker::new(stopwords));
        self.state = WorkerState::ModelLoaded;
        info!("language model set to '{}'", language_model.name);
        self.reply(&WorkerReply::success());
    }

    fn handle_start_audio(&mut self) {
        if self.state != WorkerState::ModelLoaded {
            self.reply(&WorkerReply::error(ERR_MODEL_NOT_LOADED));
            self.reply(&WorkerReply::ready(false));
            return;
        }
        let Some(engine) = self.engine.as_mut() else {
            self.reply(&WorkerReply::error(ERR_MODEL_NOT_LOADED));
            self.reply(&WorkerReply::ready(false));
            return;
        };

        match engine.begin_utterance() {
            Ok(()) => {
                self.state = WorkerState::Listening;
                self.reply(&WorkerReply::ready(true));
            }
            Err(e) => {
                error!("failed to begin utterance: {}", e);
                self.reply(&WorkerReply::error(format!("Failed starting audio: {}", e)));
                self.reply(&WorkerReply::ready(false));
            }
        }
    }

    fn handle_process_audio(&mut self, audio: &str) {
        if self.state != WorkerState::Listening || self.engine.is_none() {
            self.reply(&WorkerReply::error(ERR_MODEL_NOT_LOADED));
            return;
        }

        // Malformed chunks are dropped; the utterance continues.
        let Some(pcm) = self.preprocessor.process_chunk(audio) else {
            debug!("dropped malformed audio chunk");
            return;
        };

        let hypothesis = {
            let engine = match self.engine.as_mut() {
                Some(engine) => engine,
                None => return,
            };
            if let Err(e) = engine.feed(&pcm) {
                error!("decoder rejected audio chunk: {}", e);
                return;
            }
            engine.hypothesis()
        };

        let reply = match hypothesis {
            None => WorkerReply::partial_silence(),
            Some(hypothesis) => {
                let keyphrases = self.rank_if_enabled(&hypothesis.text);
                WorkerReply::PartialHypothesis {
                    partial_silence: hypothesis.text.is_empty(),
                    partial_hypothesis: Some(hypothesis.text),
                    keyphrases,
                }
            }
        };
        self.reply(&reply);
    }

    fn handle_stop_audio(&mut self) {
        if self.state != WorkerState::Listening || self.engine.is_none() {
            self.reply(&WorkerReply::error(ERR_MODEL_NOT_LOADED));
            return;
        }

        let hypothesis = {
            let engine = match self.engine.as_mut() {
                Some(engine) => engine,
                None => return,
            };
            if let Err(e) = engine.end_utterance() {
                // Final hypothesis may still be retrievable.
                warn!("failed ending utterance: {}", e);
            }
            engine.hypothesis()
        };
        self.state = WorkerState::ModelLoaded;

        let reply = match hypothesis {
            None => {
                info!("silence detected");
                WorkerReply::final_silence()
            }
            Some(hypothesis) => {
                let keyphrases = self.rank_if_enabled(&hypothesis.text);
                info!("speech detected: '{}'", hypothesis.text);
                WorkerReply::FinalHypothesis {
                    silence: hypothesis.text.is_empty(),
                    confidence: Some(hypothesis.confidence()),
                    score: Some(hypothesis.score),
                    hypothesis: Some(hypothesis.text),
                    keyphrases,
                }
            }
        };
        self.reply(&reply);
    }

    fn rank_if_enabled(&self, text: &str) -> Option<Vec<KeyphraseRank>> {
        if !self.keyphrases_enabled || text.is_empty() {
            return None;
        }
        self.ranker
            .as_ref()
            .map(|ranker| ranker.rank(text, &self.tokenizer))
    }

    fn reply(&mut self, reply: &WorkerReply) {
        match self.replies.send(reply) {
            Ok(()) => {}
            Err(RemvoxError::ChannelDisconnected) => {
                // Controller is gone; nothing left to serve.
                info!("reply channel disconnected, shutting down worker");
                self.running.store(false, Ordering::SeqCst);
            }
            Err(e) => error!("failed to send reply: {}", e),
        }
    }
}

/// Entry point for the `remvox worker` child process.
///
/// Commands arrive length-prefixed on stdin, replies leave on stdout; the
/// parent's controller holds the other ends. Runs until the parent sends
/// `Shutdown` or closes the pipe.
pub fn run_worker_process(engine_factory: Arc<dyn EngineFactory>, audio_prefix: &str) -> Result<()> {
    info!(pid = std::process::id(), "worker process started");
    let command_rx = PipeRecordReader::spawn(std::io::stdin());
    let reply_tx = PipeRecordWriter::new(std::io::stdout());
    let worker = SessionWorker::new(
        command_rx,
        reply_tx,
        engine_factory,
        AudioPreprocessor::new(audio_prefix),
        ShutdownSignal::new(),
    );
    worker.run();
    info!(pid = std::process::id(), "worker process exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{MemoryRecordReceiver, MemoryRecordSender, memory_record_channel};
    use crate::config::{LanguageModel, TextModel};
    use crate::decoder::MockEngineFactory;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    struct WorkerHarness {
        commands: FramedSender<MemoryRecordSender>,
        replies: FramedReceiver<MemoryRecordReceiver>,
        signal: ShutdownSignal,
        handle: Option<thread::JoinHandle<()>>,
        _model_dir: tempfile::TempDir,
        language_model: LanguageModel,
    }

    impl WorkerHarness {
        fn start(factory: MockEngineFactory) -> Self {
            let (cmd_tx, cmd_rx) = memory_record_channel(defaults::RECORD_CHANNEL_CAPACITY);
            let (reply_tx, reply_rx) = memory_record_channel(defaults::RECORD_CHANNEL_CAPACITY);
            let signal = ShutdownSignal::new();

            let worker = SessionWorker::new(
                cmd_rx,
                reply_tx,
                Arc::new(factory),
                AudioPreprocessor::default(),
                signal.clone(),
            );
            let handle = thread::spawn(move || worker.run());

            let model_dir = tempfile::tempdir().expect("should create tempdir");
            let mut paths = Vec::new();
            for name in ["acoustic", "model.lm.bin", "model.dict"] {
                let path = model_dir.path().join(name);
                std::fs::write(&path, b"resource").expect("should write model file");
                paths.push(path);
            }
            let language_model = LanguageModel {
                name: "English".to_string(),
                acoustic_model: paths[0].clone(),
                language_model: paths[1].clone(),
                dictionary: paths[2].clone(),
            };

            Self {
                commands: FramedSender::new(cmd_tx),
                replies: FramedReceiver::new(reply_rx),
                signal,
                handle: Some(handle),
                _model_dir: model_dir,
                language_model,
            }
        }

        fn send(&self, command: Command) {
            self.commands.send(&command).expect("should send command");
        }

        fn set_valid_models(&self) {
            self.send(Command::SetModels {
                language_model: self.language_model.clone(),
                text_model: TextModel {
                    stopwords: "builtin:english".to_string(),
                },
            });
        }

        fn recv(&mut self) -> WorkerReply {
            self.replies.recv().expect("should receive reply")
        }

        fn send_audio_chunk(&self) {
            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: 16000,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut cursor = Cursor::new(Vec::new());
            {
                let mut writer =
                    hound::WavWriter::new(&mut cursor, spec).expect("should create writer");
                for s in [100i16, -100, 200, -200] {
                    writer.write_sample(s).expect("should write");
                }
                writer.finalize().expect("should finalize");
            }
            let audio = format!(
                "{}{}",
                defaults::DEFAULT_AUDIO_PREFIX,
                BASE64_STANDARD.encode(cursor.into_inner())
            );
            self.send(Command::ProcessAudio { audio });
        }

        fn join(&mut self, timeout: Duration) -> bool {
            let deadline = Instant::now() + timeout;
            let handle = match self.handle.take() {
                Some(handle) => handle,
                None => return true,
            };
            while Instant::now() < deadline {
                if handle.is_finished() {
                    let _ = handle.join();
                    return true;
                }
                thread::sleep(Duration::from_millis(10));
            }
            self.handle = Some(handle);
            false
        }
    }

    impl Drop for WorkerHarness {
        fn drop(&mut self) {
            self.signal.trip();
            let _ = self.join(Duration::from_secs(2));
        }
    }

    #[test]
    fn set_models_valid_emits_exactly_one_success() {
        let mut h = WorkerHarness::start(MockEngineFactory::new());
        h.set_valid_models();
        assert_eq!(h.recv(), WorkerReply::success());

        // Next reply is for the next command, not a duplicate
        h.send(Command::StartAudio);
        assert_eq!(h.recv(), WorkerReply::ready(true));
    }

    #[test]
    fn set_models_invalid_emits_exactly_one_error_and_keeps_state() {
        let mut h = WorkerHarness::start(MockEngineFactory::new());
        h.send(Command::SetModels {
            language_model: LanguageModel {
                name: "Broken".to_string(),
                acoustic_model: "/nonexistent/hmm".into(),
                language_model: "/nonexistent/lm".into(),
                dictionary: "/nonexistent/dict".into(),
            },
            text_model: TextModel {
                stopwords: "builtin:english".to_string(),
            },
        });
        assert_eq!(h.recv(), WorkerReply::error(ERR_MODEL_LOAD));

        // Still NoModel: starting audio is refused with ready:false
        h.send(Command::StartAudio);
        assert_eq!(h.recv(), WorkerReply::error(ERR_MODEL_NOT_LOADED));
        assert_eq!(h.recv(), WorkerReply::ready(false));
    }

    #[test]
    fn set_models_engine_load_failure_reports_error() {
        let mut h = WorkerHarness::start(MockEngineFactory::new().with_load_failure());
        h.set_valid_models();
        assert_eq!(h.recv(), WorkerReply::error(ERR_MODEL_LOAD));
    }

    #[test]
    fn audio_commands_outside_listening_are_errors() {
        let mut h = WorkerHarness::start(MockEngineFactory::new());

        h.send(Command::ProcessAudio {
            audio: "ignored".to_string(),
        });
        assert_eq!(h.recv(), WorkerReply::error(ERR_MODEL_NOT_LOADED));

        h.send(Command::StopAudio);
        assert_eq!(h.recv(), WorkerReply::error(ERR_MODEL_NOT_LOADED));

        // Same guards hold in ModelLoaded for StopAudio
        h.set_valid_models();
        assert_eq!(h.recv(), WorkerReply::success());
        h.send(Command::StopAudio);
        assert_eq!(h.recv(), WorkerReply::error(ERR_MODEL_NOT_LOADED));
    }

    #[test]
    fn full_utterance_with_hypothesis() {
        let factory = MockEngineFactory::new().with_hypothesis("i have two dogs", -4521, -0.25);
        let mut h = WorkerHarness::start(factory);

        h.set_valid_models();
        assert_eq!(h.recv(), WorkerReply::success());

        h.send(Command::StartAudio);
        assert_eq!(h.recv(), WorkerReply::ready(true));

        h.send_audio_chunk();
        match h.recv() {
            WorkerReply::PartialHypothesis {
                partial_silence,
                partial_hypothesis,
                keyphrases,
            } => {
                assert!(!partial_silence);
                assert_eq!(partial_hypothesis.as_deref(), Some("i have two dogs"));
                assert!(keyphrases.is_none(), "keyphrase mode is off by default");
            }
            other => panic!("expected partial hypothesis, got {:?}", other),
        }

        h.send(Command::StopAudio);
        match h.recv() {
            WorkerReply::FinalHypothesis {
                silence,
                hypothesis,
                score,
                confidence,
                keyphrases,
            } => {
                assert!(!silence);
                assert_eq!(hypothesis.as_deref(), Some("i have two dogs"));
                assert_eq!(score, Some(-4521));
                let confidence = confidence.expect("final carries confidence");
                assert!((confidence - (-0.25f64).exp()).abs() < 1e-12);
                assert!(keyphrases.is_none());
            }
            other => panic!("expected final hypothesis, got {:?}", other),
        }

        // Back in ModelLoaded: a new utterance can start
        h.send(Command::StartAudio);
        assert_eq!(h.recv(), WorkerReply::ready(true));
    }

    #[test]
    fn silent_utterance_reports_silence() {
        let mut h = WorkerHarness::start(MockEngineFactory::new());

        h.set_valid_models();
        assert_eq!(h.recv(), WorkerReply::success());
        h.send(Command::StartAudio);
        assert_eq!(h.recv(), WorkerReply::ready(true));

        h.send_audio_chunk();
        assert_eq!(h.recv(), WorkerReply::partial_silence());

        h.send(Command::StopAudio);
        assert_eq!(h.recv(), WorkerReply::final_silence());
    }

    #[test]
    fn empty_string_hypothesis_is_silence_with_fields() {
        let factory = MockEngineFactory::new().with_hypothesis("", -100, -0.5);
        let mut h = WorkerHarness::start(factory);

        h.set_valid_models();
        assert_eq!(h.recv(), WorkerReply::success());
        h.send(Command::StartAudio);
        assert_eq!(h.recv(), WorkerReply::ready(true));
        h.send_audio_chunk();

        match h.recv() {
            WorkerReply::PartialHypothesis {
                partial_silence,
                partial_hypothesis,
                ..
            } => {
                assert!(partial_silence, "empty hypothesis counts as silence");
                assert_eq!(partial_hypothesis.as_deref(), Some(""));
            }
            other => panic!("expected partial, got {:?}", other),
        }
    }

    #[test]
    fn malformed_audio_chunk_is_dropped_without_reply() {
        let factory = MockEngineFactory::new().with_hypothesis("hello", -1, -0.1);
        let mut h = WorkerHarness::start(factory);

        h.set_valid_models();
        assert_eq!(h.recv(), WorkerReply::success());
        h.send(Command::StartAudio);
        assert_eq!(h.recv(), WorkerReply::ready(true));

        h.send(Command::ProcessAudio {
            audio: "@@garbage@@".to_string(),
        });
        // No reply for the dropped chunk; the next reply belongs to StopAudio
        h.send(Command::StopAudio);
        assert_eq!(h.recv(), WorkerReply::final_silence());
    }

    #[test]
    fn keyphrase_mode_ranks_hypotheses() {
        let factory =
            MockEngineFactory::new().with_hypothesis("i have two dogs and i have two cats", -9, -0.3);
        let mut h = WorkerHarness::start(factory);

        h.set_valid_models();
        assert_eq!(h.recv(), WorkerReply::success());
        h.send(Command::SetKeyphraseMode { enabled: true });

        h.send(Command::StartAudio);
        assert_eq!(h.recv(), WorkerReply::ready(true));
        h.send_audio_chunk();

        match h.recv() {
            WorkerReply::PartialHypothesis { keyphrases, .. } => {
                let ranked = keyphrases.expect("keyphrases enabled");
                let phrases: Vec<&str> = ranked.iter().map(|r| r.phrase.as_str()).collect();
                assert_eq!(phrases, vec!["two dogs", "two cats"]);
            }
            other => panic!("expected partial, got {:?}", other),
        }

        // Toggle off: the next reply carries no keyphrases
        h.send(Command::SetKeyphraseMode { enabled: false });
        h.send_audio_chunk();
        match h.recv() {
            WorkerReply::PartialHypothesis { keyphrases, .. } => assert!(keyphrases.is_none()),
            other => panic!("expected partial, got {:?}", other),
        }
    }

    #[test]
    fn shutdown_command_exits_the_loop() {
        let mut h = WorkerHarness::start(MockEngineFactory::new());
        h.send(Command::Shutdown);
        assert!(h.join(Duration::from_secs(2)), "worker should exit");
    }

    #[test]
    fn tripped_signal_is_observed_within_polling_latency() {
        let mut h = WorkerHarness::start(MockEngineFactory::new());
        h.signal.trip();
        assert!(
            h.join(defaults::SHUTDOWN_POLL_INTERVAL * 10),
            "worker should observe the signal and exit"
        );
    }

    #[test]
    fn shutdown_while_listening_ends_utterance_once() {
        let factory = MockEngineFactory::new().with_hypothesis("tail", -1, -0.1);
        // Clones share the utterance counter with the engine the worker gets
        let counter = factory.clone();
        let mut h = WorkerHarness::start(factory);

        h.set_valid_models();
        assert_eq!(h.recv(), WorkerReply::success());
        h.send(Command::StartAudio);
        assert_eq!(h.recv(), WorkerReply::ready(true));

        h.send(Command::Shutdown);
        assert!(h.join(Duration::from_secs(2)), "worker should exit");
        // end_utterance during shutdown is best-effort and must run exactly
        // once even though no StopAudio was ever sent.
        assert_eq!(counter.ended_utterances(), 1);
    }

    #[test]
    fn shutdown_end_utterance_failure_is_not_fatal() {
        let factory = MockEngineFactory::new().with_end_failure();
        let mut h = WorkerHarness::start(factory);

        h.set_valid_models();
        assert_eq!(h.recv(), WorkerReply::success());
        h.send(Command::StartAudio);
        assert_eq!(h.recv(), WorkerReply::ready(true));

        h.signal.trip();
        assert!(h.join(Duration::from_secs(2)), "worker should exit anyway");
    }

    #[test]
    fn dropped_command_channel_stops_the_worker() {
        let mut h = WorkerHarness::start(MockEngineFactory::new());
        let commands = std::mem::replace(
            &mut h.commands,
            FramedSender::new(memory_record_channel(1).0),
        );
        drop(commands);
        assert!(h.join(Duration::from_secs(2)), "worker should exit on EOF");
    }
}
