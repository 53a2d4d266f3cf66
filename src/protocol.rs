//! Wire types for the controller ↔ worker message protocol.
//!
//! Commands flow controller → worker, replies flow worker → controller.
//! Both are serialized as JSON and carried by the framed channel protocol
//! (see [`crate::channel`]). Replies use the exact JSON key set the client
//! protocol exposes (`error`, `success`, `silence`, `hypothesis`,
//! `partial_hypothesis`, `partial_silence`, `score`, `confidence`,
//! `keyphrases`, `decoder`), so the controller can forward them verbatim.

use crate::config::{LanguageModel, TextModel};
use serde::{Deserialize, Serialize};

/// Commands sent by the session controller to its worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    /// Load the decoder with a language model and the ranker with stopwords.
    SetModels {
        language_model: LanguageModel,
        text_model: TextModel,
    },
    /// Begin an utterance; the client is about to stream audio.
    StartAudio,
    /// One base64-wrapped audio chunk of the active utterance.
    ProcessAudio { audio: String },
    /// End the utterance and produce the final hypothesis.
    StopAudio,
    /// Toggle keyphrase ranking of hypotheses.
    SetKeyphraseMode { enabled: bool },
    /// Cooperative shutdown request.
    Shutdown,
}

/// One ranked keyphrase, produced fresh per ranking pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyphraseRank {
    pub score: f64,
    pub phrase: String,
}

/// Decoder readiness, reported on utterance start attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderState {
    pub ready: bool,
}

/// Replies sent by the worker back to its controller.
///
/// Untagged: each variant carries a distinct mandatory key, which is what
/// picks the variant on deserialization and keeps the client-facing JSON
/// free of envelope fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerReply {
    /// A command failed; the state machine did not advance.
    Error { error: String },
    /// A command succeeded with nothing else to report.
    Success { success: bool },
    /// Decoder readiness (sent with start-audio outcomes).
    ReadyState { decoder: DecoderState },
    /// In-utterance hypothesis after a processed chunk.
    PartialHypothesis {
        partial_silence: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        partial_hypothesis: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        keyphrases: Option<Vec<KeyphraseRank>>,
    },
    /// End-of-utterance hypothesis with score and confidence.
    FinalHypothesis {
        silence: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        hypothesis: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        score: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        keyphrases: Option<Vec<KeyphraseRank>>,
    },
}

impl WorkerReply {
    pub fn error(message: impl Into<String>) -> Self {
        WorkerReply::Error {
            error: message.into(),
        }
    }

    pub fn success() -> Self {
        WorkerReply::Success { success: true }
    }

    pub fn ready(ready: bool) -> Self {
        WorkerReply::ReadyState {
            decoder: DecoderState { ready },
        }
    }

    /// Silence marker for a partial with no usable hypothesis.
    pub fn partial_silence() -> Self {
        WorkerReply::PartialHypothesis {
            partial_silence: true,
            partial_hypothesis: None,
            keyphrases: None,
        }
    }

    /// Silence marker for a final with no usable hypothesis.
    pub fn final_silence() -> Self {
        WorkerReply::FinalHypothesis {
            silence: true,
            hypothesis: None,
            score: None,
            confidence: None,
            keyphrases: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_models() -> (LanguageModel, TextModel) {
        (
            LanguageModel {
                name: "English".to_string(),
                acoustic_model: PathBuf::from("models/en/acoustic"),
                language_model: PathBuf::from("models/en/en.lm.bin"),
                dictionary: PathBuf::from("models/en/en.dict"),
            },
            TextModel {
                stopwords: "builtin:english".to_string(),
            },
        )
    }

    #[test]
    fn test_command_all_variants_roundtrip() {
        let (lm, tm) = sample_models();
        let commands = vec![
            Command::SetModels {
                language_model: lm,
                text_model: tm,
            },
            Command::StartAudio,
            Command::ProcessAudio {
                audio: "UklGRg==".to_string(),
            },
            Command::StopAudio,
            Command::SetKeyphraseMode { enabled: true },
            Command::Shutdown,
        ];

        for cmd in commands {
            let json = serde_json::to_string(&cmd).expect("should serialize");
            let back: Command = serde_json::from_str(&json).expect("should deserialize");
            assert_eq!(cmd, back, "roundtrip failed for {:?}", cmd);
        }
    }

    #[test]
    fn test_command_tag_is_snake_case() {
        let json = serde_json::to_string(&Command::StartAudio).expect("should serialize");
        assert!(
            json.contains("\"op\":\"start_audio\""),
            "commands should be tagged snake_case, got: {}",
            json
        );
    }

    #[test]
    fn test_success_reply_shape() {
        let json = serde_json::to_string(&WorkerReply::success()).expect("should serialize");
        assert_eq!(json, r#"{"success":true}"#);
    }

    #[test]
    fn test_error_reply_shape() {
        let json = serde_json::to_string(&WorkerReply::error("Language model not loaded!"))
            .expect("should serialize");
        assert_eq!(json, r#"{"error":"Language model not loaded!"}"#);
    }

    #[test]
    fn test_ready_reply_shape() {
        let json = serde_json::to_string(&WorkerReply::ready(false)).expect("should serialize");
        assert_eq!(json, r#"{"decoder":{"ready":false}}"#);
    }

    #[test]
    fn test_silence_replies_omit_absent_fields() {
        let json = serde_json::to_string(&WorkerReply::final_silence()).expect("should serialize");
        assert_eq!(json, r#"{"silence":true}"#);

        let json =
            serde_json::to_string(&WorkerReply::partial_silence()).expect("should serialize");
        assert_eq!(json, r#"{"partial_silence":true}"#);
    }

    #[test]
    fn test_untagged_reply_disambiguation() {
        let replies = vec![
            WorkerReply::error("boom"),
            WorkerReply::success(),
            WorkerReply::ready(true),
            WorkerReply::partial_silence(),
            WorkerReply::PartialHypothesis {
                partial_silence: false,
                partial_hypothesis: Some("two dogs".to_string()),
                keyphrases: None,
            },
            WorkerReply::final_silence(),
            WorkerReply::FinalHypothesis {
                silence: false,
                hypothesis: Some("i have two dogs".to_string()),
                score: Some(-4521),
                confidence: Some(0.83),
                keyphrases: Some(vec![KeyphraseRank {
                    score: 4.0,
                    phrase: "two dogs".to_string(),
                }]),
            },
        ];

        for reply in replies {
            let json = serde_json::to_string(&reply).expect("should serialize");
            let back: WorkerReply = serde_json::from_str(&json).expect("should deserialize");
            assert_eq!(reply, back, "roundtrip failed for {}", json);
        }
    }
}
