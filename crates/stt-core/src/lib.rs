//! The streaming transcription decision engine: resampling, windowing,
//! pacing and finalization sitting between audio ingress and the external
//! speech model.

pub mod analyzer;
pub mod constants;
pub mod resampler;
pub mod session;
pub mod transcriber;
pub mod types;
pub mod windower;

pub use session::{finalize_on_close, run_cycle, SessionState, SharedTranscriber};
pub use transcriber::{FixtureTranscriber, TranscribeOptions, Transcriber};
pub use types::{AudioChunk, PaceStats, Segment, StopKind, TranscriptionResult, Word};
