//! The boundary between the session orchestrator and the external speech
//! model. The model itself is out of scope; this module only defines the
//! shape of the call and a configurable fixture double for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::types::Segment;
use stt_foundation::error::ModelError;

/// Decoding knobs sent with every model call. Values mirror the reference
/// server's `faster_whisper` invocation; only `vad_filter` and `beam_size`
/// vary between the primary pass and the no-VAD fallback retry.
#[derive(Debug, Clone)]
pub struct TranscribeOptions {
    pub beam_size: u32,
    pub vad_filter: bool,
    pub vad_min_silence_ms: u32,
    pub vad_speech_pad_ms: u32,
    pub word_timestamps: bool,
    pub no_speech_threshold: f32,
    pub log_prob_threshold: f32,
    pub compression_ratio_threshold: f32,
    pub condition_on_previous_text: bool,
    pub initial_prompt: String,
}

impl TranscribeOptions {
    /// Knobs for the normal, VAD-filtered pass.
    pub fn primary(initial_prompt: String) -> Self {
        Self {
            beam_size: 1,
            vad_filter: true,
            vad_min_silence_ms: 500,
            vad_speech_pad_ms: 200,
            word_timestamps: true,
            no_speech_threshold: 0.6,
            log_prob_threshold: -0.5,
            compression_ratio_threshold: 2.4,
            condition_on_previous_text: false,
            initial_prompt,
        }
    }

    /// Knobs for the no-VAD fallback retry (see the orchestrator's forced
    /// finalization step): VAD disabled, wider beam, same prompt.
    pub fn fallback(initial_prompt: String) -> Self {
        Self {
            vad_filter: false,
            beam_size: 2,
            ..Self::primary(initial_prompt)
        }
    }
}

/// The external speech model, called once per analysis cycle with the
/// accumulated utterance window.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribes `window` (mono `f32` samples at the canonical sample
    /// rate) and returns the segments the model recognized, in order.
    async fn transcribe(
        &self,
        window: &[f32],
        options: &TranscribeOptions,
    ) -> Result<Vec<Segment>, ModelError>;
}

type ResponseFn = Box<dyn Fn(&[f32], &TranscribeOptions) -> Vec<Segment> + Send + Sync>;

/// Configurable test double for [`Transcriber`]. Mirrors the shape of the
/// mock STT plugins used elsewhere in this codebase: a fixed response,
/// optional delay, optional failure after N calls.
pub struct FixtureTranscriber {
    calls_made: AtomicUsize,
    fail_after_calls: Option<usize>,
    processing_delay_ms: u64,
    response: ResponseFn,
}

impl FixtureTranscriber {
    /// Always returns `segments`, regardless of the submitted window.
    pub fn with_segments(segments: Vec<Segment>) -> Self {
        Self::new(move |_, _| segments.clone())
    }

    /// Returns no segments for any call (silence / no speech detected).
    pub fn silent() -> Self {
        Self::new(|_, _| Vec::new())
    }

    pub fn new<F>(response: F) -> Self
    where
        F: Fn(&[f32], &TranscribeOptions) -> Vec<Segment> + Send + Sync + 'static,
    {
        Self {
            calls_made: AtomicUsize::new(0),
            fail_after_calls: None,
            processing_delay_ms: 0,
            response: Box::new(response),
        }
    }

    pub fn fail_after_calls(mut self, n: usize) -> Self {
        self.fail_after_calls = Some(n);
        self
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.processing_delay_ms = ms;
        self
    }
}

#[async_trait]
impl Transcriber for FixtureTranscriber {
    async fn transcribe(
        &self,
        window: &[f32],
        options: &TranscribeOptions,
    ) -> Result<Vec<Segment>, ModelError> {
        let calls_made = self.calls_made.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(limit) = self.fail_after_calls {
            if calls_made > limit {
                return Err(ModelError::Transient("fixture: simulated failure".into()));
            }
        }
        if self.processing_delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.processing_delay_ms))
                .await;
        }
        Ok((self.response)(window, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Word;

    fn segment(text: &str, start: f32, end: f32) -> Segment {
        Segment {
            start,
            end,
            text: text.to_string(),
            avg_log_prob: -0.1,
            no_speech_prob: 0.05,
            words: text
                .split_whitespace()
                .enumerate()
                .map(|(i, w)| Word {
                    start: start + i as f32 * 0.2,
                    end: start + (i as f32 + 1.0) * 0.2,
                    text: w.to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn fixture_returns_configured_segments() {
        let fixture = FixtureTranscriber::with_segments(vec![segment("hello world.", 0.0, 1.0)]);
        let opts = TranscribeOptions::primary(String::new());
        let segments = fixture.transcribe(&[0.0; 16000], &opts).await.unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "hello world.");
    }

    #[tokio::test]
    async fn fixture_fails_after_configured_calls() {
        let fixture = FixtureTranscriber::silent().fail_after_calls(1);
        let opts = TranscribeOptions::primary(String::new());
        assert!(fixture.transcribe(&[0.0; 100], &opts).await.is_ok());
        assert!(fixture.transcribe(&[0.0; 100], &opts).await.is_err());
    }

    #[test]
    fn fallback_disables_vad_and_widens_beam() {
        let opts = TranscribeOptions::fallback("ctx".into());
        assert!(!opts.vad_filter);
        assert_eq!(opts.beam_size, 2);
        assert_eq!(opts.initial_prompt, "ctx");
    }
}
