//! Speech output: a single worker thread speaks queued utterances one at a time

mod engine;
mod serializer;

pub use engine::{CommandSpeech, SpeechEngine};
pub use serializer::{SpeechQueue, SpeechSerializer, SpeechStats, Utterance};
