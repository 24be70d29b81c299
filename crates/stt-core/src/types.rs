//! Core data types shared across the resampler, analyzer, and session
//! orchestrator.

use serde::{Deserialize, Serialize};

/// One frame of audio as received from a client, before resampling.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono PCM samples in `[-1.0, 1.0]`.
    pub data: Vec<f32>,
    /// Sample rate the samples were captured at. `0` is treated as 16kHz.
    pub sample_rate: u32,
}

/// A transcription update sent back to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionResult {
    pub text: String,
    pub is_final: bool,
    /// Seconds from session start.
    pub start_time: f64,
}

/// Word-level timing returned by the model, relative to the submitted window.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub start: f32,
    pub end: f32,
    pub text: String,
}

/// One model-returned segment, relative to the submitted window.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: f32,
    pub end: f32,
    pub text: String,
    pub avg_log_prob: f32,
    pub no_speech_prob: f32,
    pub words: Vec<Word>,
}

/// Running pace statistics used to derive the session's words-per-minute
/// estimate, which in turn drives every adaptive timing threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaceStats {
    pub total_words_finalized: u64,
    pub total_speech_seconds: f32,
}

impl PaceStats {
    /// Words per minute, or the default assumption before enough speech has
    /// been finalized to trust the estimate.
    pub fn wpm(&self) -> f32 {
        if self.total_speech_seconds > crate::constants::PACE_WARMUP_SECONDS {
            self.total_words_finalized as f32 / (self.total_speech_seconds / 60.0)
        } else {
            crate::constants::DEFAULT_WPM
        }
    }

    pub fn record(&mut self, words: u64, seconds: f32) {
        self.total_words_finalized += words;
        self.total_speech_seconds += seconds.max(0.1);
    }
}

/// Terminal punctuation classification used by the finalization rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    Strong,
    Soft,
    None,
}

pub fn classify_stop(word: &str) -> StopKind {
    let trimmed = word.trim_end();
    if trimmed.ends_with("...")
        || trimmed.ends_with('.')
        || trimmed.ends_with('?')
        || trimmed.ends_with('!')
    {
        StopKind::Strong
    } else if trimmed.ends_with(',')
        || trimmed.ends_with(';')
        || trimmed.ends_with(':')
        || trimmed.ends_with('-')
    {
        StopKind::Soft
    } else {
        StopKind::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_terminal_punctuation() {
        assert_eq!(classify_stop("world."), StopKind::Strong);
        assert_eq!(classify_stop("well,"), StopKind::Soft);
        assert_eq!(classify_stop("word"), StopKind::None);
        assert_eq!(classify_stop("wait..."), StopKind::Strong);
    }

    #[test]
    fn pace_defaults_until_warmup() {
        let mut pace = PaceStats::default();
        assert_eq!(pace.wpm(), crate::constants::DEFAULT_WPM);
        pace.record(20, 10.0);
        assert!(pace.wpm() > 0.0);
    }
}
