//! Tuning constants for the streaming transcription pipeline.

/// Canonical sample rate everything downstream of the resampler operates at.
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// Samples accumulated before a new analysis cycle runs (1.0s at 16kHz).
pub const TRANSCRIBE_INTERVAL_SAMPLES: usize = SAMPLE_RATE_HZ as usize;

/// Maximum window submitted to the model, in seconds.
pub const WINDOW_MAX_SECONDS: f32 = 12.0;

/// Hard cap on utterance buffer growth, in seconds.
pub const MAX_UTTERANCE_SECONDS: f32 = 30.0;

/// RMS amplitude below which a window is treated as silence.
pub const RMS_THRESHOLD: f32 = 0.005;

/// Number of finalized strings kept for prompt context.
pub const HISTORY_RING_SIZE: usize = 5;

/// Character budget for the prompt built from history.
pub const PROMPT_CHAR_CAP: usize = 500;

/// Retained audio after a word-level split, protecting the next word's onset.
pub const TAIL_CUSHION_SECONDS: f32 = 0.05;

/// Utterance length, in seconds, past which an empty primary pass triggers
/// the no-VAD fallback retry.
pub const FALLBACK_RETRY_MIN_SECONDS: f32 = 15.0;

/// Default words-per-minute assumed before 5s of speech has been finalized.
pub const DEFAULT_WPM: f32 = 150.0;

/// Minimum finalized speech duration before the pace estimate is trusted.
pub const PACE_WARMUP_SECONDS: f32 = 5.0;

/// Lookahead window: a word whose successor starts within this many seconds
/// is never treated as a sentence boundary, regardless of punctuation.
pub const CONTINUATION_LOOKAHEAD_SECONDS: f32 = 0.4;
