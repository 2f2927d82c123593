//! Audio path
//!
//! Frames flow from a producer through the bounded frame buffer into the
//! wake word gate, which emits activation events on rising detection edges.

mod buffer;
mod frame;
mod scoring;
mod wake_word;
mod wav;

pub use buffer::{FrameConsumer, FrameError, FrameProducer, frame_buffer};
pub use frame::{AudioFrame, DEFAULT_FRAME_SAMPLES, FrameFeatures, SAMPLE_RATE};
pub use scoring::{EnergyScorer, Scorer, SilentScorer};
pub use wake_word::{
    ActivationEvent, DEFAULT_THRESHOLD, DEFAULT_WINDOW_FRAMES, DetectionWindow, DetectorConfig,
    DetectorHandle, EdgeState, GateMonitor, GateStats, LiveConfig, WakeWordGate,
};
pub use wav::{DecodedAudio, read_wav, read_wav_file, samples_to_wav};
