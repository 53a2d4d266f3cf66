//! Recognition engine adapter.
//!
//! The speech decoder itself is an external capability; this module defines
//! the narrow interface the session worker drives (load a model, bound an
//! utterance, feed raw PCM, retrieve a hypothesis) and the stand-in
//! implementations that ship with the crate. A real decoder backend plugs in
//! by implementing [`RecognitionEngine`] and [`EngineFactory`].

use crate::config::LanguageModel;
use crate::error::{RemvoxError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// The decoder's best-guess transcription for the current utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    pub text: String,
    /// Decoder-internal path score (log domain, engine specific).
    pub score: i64,
    /// Log-probability of the hypothesis.
    pub log_prob: f64,
}

impl Hypothesis {
    /// Confidence in linear probability space.
    pub fn confidence(&self) -> f64 {
        self.log_prob.exp()
    }
}

/// One loaded decoder instance, owned exclusively by a session worker.
///
/// Calls may block for as long as the decoder needs; the worker's process
/// isolation keeps that from stalling anything else.
pub trait RecognitionEngine: Send {
    /// Begin accumulating recognition state for a new utterance.
    fn begin_utterance(&mut self) -> Result<()>;

    /// Feed raw PCM (16kHz 16-bit signed mono) into the active utterance.
    fn feed(&mut self, pcm: &[i16]) -> Result<()>;

    /// Close the active utterance so the final hypothesis can settle.
    fn end_utterance(&mut self) -> Result<()>;

    /// Best hypothesis for the current or just-closed utterance, if any.
    fn hypothesis(&self) -> Option<Hypothesis>;
}

/// Constructs engines from validated language models.
pub trait EngineFactory: Send + Sync {
    fn load(&self, model: &LanguageModel) -> Result<Box<dyn RecognitionEngine>>;
}

/// Engine for decoder-less deployments: accepts audio, hears nothing.
///
/// Useful for exercising the full session path (states, framing, shutdown)
/// without a decoder backend; every utterance reports silence.
#[derive(Debug, Default)]
pub struct NullEngine {
    in_utterance: bool,
}

impl RecognitionEngine for NullEngine {
    fn begin_utterance(&mut self) -> Result<()> {
        if self.in_utterance {
            return Err(RemvoxError::Decoder {
                message: "utterance already active".to_string(),
            });
        }
        self.in_utterance = true;
        Ok(())
    }

    fn feed(&mut self, _pcm: &[i16]) -> Result<()> {
        if !self.in_utterance {
            return Err(RemvoxError::Decoder {
                message: "no active utterance".to_string(),
            });
        }
        Ok(())
    }

    fn end_utterance(&mut self) -> Result<()> {
        if !self.in_utterance {
            return Err(RemvoxError::Decoder {
                message: "no active utterance".to_string(),
            });
        }
        self.in_utterance = false;
        Ok(())
    }

    fn hypothesis(&self) -> Option<Hypothesis> {
        None
    }
}

/// Factory for [`NullEngine`].
#[derive(Debug, Default, Clone)]
pub struct NullEngineFactory;

impl EngineFactory for NullEngineFactory {
    fn load(&self, model: &LanguageModel) -> Result<Box<dyn RecognitionEngine>> {
        model.validate()?;
        Ok(Box::new(NullEngine::default()))
    }
}

/// Mock engine for testing session behavior.
///
/// Returns a configured hypothesis once any audio has been fed into the
/// current utterance; reports silence otherwise.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    hypothesis: Option<Hypothesis>,
    fail_on_end: bool,
    in_utterance: bool,
    fed_samples: usize,
    // Shared across clones so a test can watch an engine that moved into a
    // worker thread.
    ended_utterances: Arc<AtomicU32>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the hypothesis reported after audio has been fed.
    pub fn with_hypothesis(mut self, text: &str, score: i64, log_prob: f64) -> Self {
        self.hypothesis = Some(Hypothesis {
            text: text.to_string(),
            score,
            log_prob,
        });
        self
    }

    /// Configure `end_utterance` to fail (shutdown race testing).
    pub fn with_end_failure(mut self) -> Self {
        self.fail_on_end = true;
        self
    }

    /// Total samples fed into this engine.
    pub fn fed_samples(&self) -> usize {
        self.fed_samples
    }

    /// How many utterances were closed, totalled across all clones.
    pub fn ended_utterances(&self) -> u32 {
        self.ended_utterances.load(Ordering::SeqCst)
    }
}

impl RecognitionEngine for MockEngine {
    fn begin_utterance(&mut self) -> Result<()> {
        self.in_utterance = true;
        self.fed_samples = 0;
        Ok(())
    }

    fn feed(&mut self, pcm: &[i16]) -> Result<()> {
        if !self.in_utterance {
            return Err(RemvoxError::Decoder {
                message: "no active utterance".to_string(),
            });
        }
        self.fed_samples += pcm.len();
        Ok(())
    }

    fn end_utterance(&mut self) -> Result<()> {
        self.in_utterance = false;
        self.ended_utterances.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_end {
            return Err(RemvoxError::Decoder {
                message: "mock end_utterance failure".to_string(),
            });
        }
        Ok(())
    }

    fn hypothesis(&self) -> Option<Hypothesis> {
        if self.fed_samples > 0 {
            self.hypothesis.clone()
        } else {
            None
        }
    }
}

/// Factory producing clones of a template [`MockEngine`].
#[derive(Debug, Clone, Default)]
pub struct MockEngineFactory {
    template: MockEngine,
    fail_on_load: bool,
    skip_validation: bool,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hypothesis(mut self, text: &str, score: i64, log_prob: f64) -> Self {
        self.template = self.template.clone().with_hypothesis(text, score, log_prob);
        self
    }

    pub fn with_end_failure(mut self) -> Self {
        self.template = self.template.clone().with_end_failure();
        self
    }

    /// Configure the factory to reject every load.
    pub fn with_load_failure(mut self) -> Self {
        self.fail_on_load = true;
        self
    }

    /// Skip on-disk model validation (tests that use synthetic paths).
    pub fn without_validation(mut self) -> Self {
        self.skip_validation = true;
        self
    }

    /// Utterances closed across every engine this factory produced.
    pub fn ended_utterances(&self) -> u32 {
        self.template.ended_utterances()
    }
}

impl EngineFactory for MockEngineFactory {
    fn load(&self, model: &LanguageModel) -> Result<Box<dyn RecognitionEngine>> {
        if self.fail_on_load {
            return Err(RemvoxError::Decoder {
                message: "mock load failure".to_string(),
            });
        }
        if !self.skip_validation {
            model.validate()?;
        }
        Ok(Box::new(self.template.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_exp_of_log_prob() {
        let hyp = Hypothesis {
            text: "hello".to_string(),
            score: -1200,
            log_prob: 0.0,
        };
        assert!((hyp.confidence() - 1.0).abs() < f64::EPSILON);

        let hyp = Hypothesis {
            log_prob: -1.0,
            ..hyp
        };
        assert!((hyp.confidence() - (-1.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn null_engine_enforces_utterance_boundaries() {
        let mut engine = NullEngine::default();
        assert!(engine.feed(&[0i16; 16]).is_err(), "feed before begin");

        engine.begin_utterance().expect("should begin");
        assert!(engine.begin_utterance().is_err(), "double begin");
        engine.feed(&[0i16; 16]).expect("should feed");
        assert!(engine.hypothesis().is_none(), "null engine hears nothing");
        engine.end_utterance().expect("should end");
        assert!(engine.end_utterance().is_err(), "double end");
    }

    #[test]
    fn mock_engine_reports_hypothesis_only_after_audio() {
        let mut engine = MockEngine::new().with_hypothesis("two dogs", -4521, -0.2);
        engine.begin_utterance().expect("should begin");
        assert!(engine.hypothesis().is_none(), "nothing fed yet");

        engine.feed(&[1i16, 2, 3]).expect("should feed");
        let hyp = engine.hypothesis().expect("should have hypothesis");
        assert_eq!(hyp.text, "two dogs");
        assert_eq!(engine.fed_samples(), 3);
    }

    #[test]
    fn mock_factory_load_failure() {
        let factory = MockEngineFactory::new().with_load_failure();
        let model = LanguageModel {
            name: "English".to_string(),
            acoustic_model: "a".into(),
            language_model: "b".into(),
            dictionary: "c".into(),
        };
        assert!(factory.load(&model).is_err());
    }
}
