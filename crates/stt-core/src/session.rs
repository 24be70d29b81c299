//! The session orchestrator: owns one stream's mutable state and runs the
//! per-chunk / per-cycle state machine tying the resampler, windower,
//! analyzer, and transcriber together.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::analyzer::{
    self, filter_segments, filter_segments_fallback, is_hallucination, required_silence,
    scan_words, thresholds_for_wpm,
};
use crate::constants::{
    FALLBACK_RETRY_MIN_SECONDS, HISTORY_RING_SIZE, MAX_UTTERANCE_SECONDS, SAMPLE_RATE_HZ,
};
use crate::resampler::resample_to_canonical;
use crate::transcriber::{TranscribeOptions, Transcriber};
use crate::types::{classify_stop, AudioChunk, PaceStats, StopKind, TranscriptionResult};
use crate::windower::{build_initial_prompt, is_quiet, select_window};
use stt_telemetry::SessionMetrics;

const TRANSCRIBE_INTERVAL_SAMPLES: usize = SAMPLE_RATE_HZ as usize;
const MAX_UTTERANCE_SAMPLES: usize = (MAX_UTTERANCE_SECONDS * SAMPLE_RATE_HZ as f32) as usize;
const FALLBACK_RETRY_MIN_SAMPLES: usize =
    (FALLBACK_RETRY_MIN_SECONDS * SAMPLE_RATE_HZ as f32) as usize;

/// Per-stream mutable state. Owned and mutated only by the orchestrator that
/// holds it; never shared across sessions.
pub struct SessionState {
    utterance_buffer: Vec<f32>,
    samples_in_utterance: usize,
    samples_since_last_transcribe: usize,
    /// Total bytes of audio ever appended to this session, used only as an
    /// in-memory counter standing in for the out-of-scope wave-file archive.
    recorded_sample_count: u64,
    absolute_start_time: f64,
    last_partial_text: String,
    last_text_change_time: f32,
    history: VecDeque<String>,
    pace: PaceStats,
    consecutive_quiet_intervals: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            utterance_buffer: Vec::new(),
            samples_in_utterance: 0,
            samples_since_last_transcribe: 0,
            recorded_sample_count: 0,
            absolute_start_time: 0.0,
            last_partial_text: String::new(),
            last_text_change_time: 0.0,
            history: VecDeque::with_capacity(HISTORY_RING_SIZE),
            pace: PaceStats::default(),
            consecutive_quiet_intervals: 0,
        }
    }

    pub fn samples_in_utterance(&self) -> usize {
        self.samples_in_utterance
    }

    pub fn absolute_start_time(&self) -> f64 {
        self.absolute_start_time
    }

    pub fn pace(&self) -> PaceStats {
        self.pace
    }

    /// Resamples and appends one inbound chunk, returning whether enough
    /// new audio has accumulated to run an analysis cycle (§4.2 Trigger).
    pub fn ingest_chunk(&mut self, chunk: &AudioChunk, metrics: &SessionMetrics) -> bool {
        metrics.record_chunk();
        let samples = match resample_to_canonical(chunk) {
            Ok(samples) => samples,
            Err(err) => {
                warn!(error = %err, "dropping malformed audio chunk");
                metrics.record_malformed_chunk();
                return false;
            }
        };
        self.recorded_sample_count += samples.len() as u64;
        self.samples_in_utterance += samples.len();
        self.samples_since_last_transcribe += samples.len();
        self.utterance_buffer.extend_from_slice(&samples);

        if self.samples_since_last_transcribe >= TRANSCRIBE_INTERVAL_SAMPLES {
            self.samples_since_last_transcribe = 0;
            true
        } else {
            false
        }
    }

    fn reset_utterance(&mut self, total_duration: f32) {
        self.utterance_buffer.clear();
        self.samples_in_utterance = 0;
        self.absolute_start_time += total_duration as f64;
        self.last_partial_text.clear();
        self.last_text_change_time = 0.0;
    }

    fn push_history(&mut self, text: String) {
        if self.history.len() >= HISTORY_RING_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(text);
    }
}

/// Runs one analysis cycle against `transcriber`, mutating `session` and
/// returning any results to emit, in emission order.
pub async fn run_cycle(
    session: &mut SessionState,
    transcriber: &dyn Transcriber,
    metrics: &SessionMetrics,
) -> Vec<TranscriptionResult> {
    let total_duration = session.samples_in_utterance as f32 / SAMPLE_RATE_HZ as f32;
    let (window, window_offset) = select_window(&session.utterance_buffer);
    let window = window.to_vec();

    // A long quiet run still has to reach the finalize/emergency-reset logic
    // below, but it does so without spending another model call: once the
    // gate has tripped twice there is nothing new for the model to find.
    let mut skip_model_call = false;
    if is_quiet(&window) {
        session.consecutive_quiet_intervals += 1;
        if session.consecutive_quiet_intervals < 2
            && session.samples_in_utterance < MAX_UTTERANCE_SAMPLES
        {
            return Vec::new();
        }
        skip_model_call = true;
    } else {
        session.consecutive_quiet_intervals = 0;
    }

    let wpm = session.pace.wpm();
    let (_filtered, scan) = if skip_model_call {
        (Vec::new(), analyzer::ScanResult::default())
    } else {
        let initial_prompt = build_initial_prompt(&session.history);
        let primary_options = TranscribeOptions::primary(initial_prompt.clone());

        let call_started = std::time::Instant::now();
        let call_result = transcriber.transcribe(&window, &primary_options).await;
        metrics.record_model_call(call_started.elapsed());
        let segments = match call_result {
            Ok(segments) => segments,
            Err(err) => {
                debug!(error = %err, "model call failed this cycle, buffer preserved");
                metrics.record_model_error();
                return Vec::new();
            }
        };
        let filtered = filter_segments(segments);
        let scan = scan_words(&filtered, wpm, window_offset, total_duration);

        if filtered.is_empty()
            && scan.remaining_text.is_empty()
            && session.samples_in_utterance > FALLBACK_RETRY_MIN_SAMPLES
        {
            info!("empty utterance past fallback threshold, retrying without VAD filter");
            metrics.record_fallback_retry();
            let fallback_options = TranscribeOptions::fallback(initial_prompt);
            if let Ok(fallback_segments) =
                transcriber.transcribe(&window, &fallback_options).await
            {
                let fallback_filtered = filter_segments_fallback(fallback_segments);
                if !fallback_filtered.is_empty() {
                    let fallback_scan =
                        scan_words(&fallback_filtered, wpm, window_offset, total_duration);
                    (fallback_filtered, fallback_scan)
                } else {
                    (filtered, scan)
                }
            } else {
                (filtered, scan)
            }
        } else {
            (filtered, scan)
        }
    };

    let mut results = Vec::new();
    for span in &scan.finalized {
        let start_time = session.absolute_start_time
            + window_offset as f64
            + span.first_word_start_rel as f64;
        results.push(TranscriptionResult {
            text: span.text.clone(),
            is_final: true,
            start_time,
        });
        session.pace.record(span.word_count as u64, span.speech_seconds);
        session.push_history(span.text.clone());
        metrics.record_final();
    }

    let remaining = scan.remaining_text.clone();
    if remaining != session.last_partial_text {
        session.last_partial_text = remaining.clone();
        session.last_text_change_time = total_duration;
    }
    let total_stall = total_duration - session.last_text_change_time;
    let total_silence = total_duration - (window_offset + scan.latest_speech_end_rel);

    let strong_punct = last_word(&remaining)
        .map(|w| classify_stop(w) == StopKind::Strong)
        .unwrap_or(false);
    let word_count = remaining.split_whitespace().count();
    let thresholds = thresholds_for_wpm(wpm);
    let silence_threshold =
        required_silence(thresholds.base_silence, wpm, strong_punct, word_count, total_duration);
    let stall_threshold = if strong_punct {
        thresholds.stall_strong_punct
    } else {
        thresholds.stall_else
    };

    let global_trigger =
        session.samples_in_utterance >= MAX_UTTERANCE_SAMPLES || session.consecutive_quiet_intervals >= 2;
    let silence_trigger = total_silence >= silence_threshold;
    let stall_trigger = total_stall >= stall_threshold && total_silence >= 0.4;
    let any_trigger = global_trigger || silence_trigger || stall_trigger;

    let mut did_full_reset = false;
    if any_trigger && !remaining.is_empty() {
        if is_hallucination(&remaining, total_silence) {
            metrics.record_hallucination_rejected();
            debug!(text = %remaining, "rejected likely hallucination, keeping buffered");
        } else {
            let start_time = session.absolute_start_time + window_offset as f64;
            results.push(TranscriptionResult {
                text: remaining.clone(),
                is_final: true,
                start_time,
            });
            session
                .pace
                .record(word_count as u64, total_duration.max(0.1));
            session.push_history(remaining.clone());
            metrics.record_final();
            session.reset_utterance(total_duration);
            did_full_reset = true;
        }
    } else if any_trigger
        && remaining.is_empty()
        && scan.finalized.is_empty()
        && (global_trigger || session.consecutive_quiet_intervals >= 10)
    {
        info!(duration = total_duration, "emergency reset: long buffer with no recognized text");
        metrics.record_emergency_reset();
        session.reset_utterance(total_duration);
        did_full_reset = true;
    }

    if !did_full_reset {
        if let Some(last) = scan.finalized.last() {
            let splice_seconds = window_offset + last.last_finalized_end_rel;
            let split_sample = (splice_seconds * SAMPLE_RATE_HZ as f32) as usize;
            let split_sample = split_sample.min(session.utterance_buffer.len());
            session.utterance_buffer.drain(0..split_sample);
            session.samples_in_utterance = session.utterance_buffer.len();
            session.absolute_start_time += splice_seconds as f64;
            session.last_text_change_time = 0.0;
            session.last_partial_text.clear();
        } else if !remaining.is_empty() {
            let start_time = session.absolute_start_time + window_offset as f64;
            results.push(TranscriptionResult {
                text: remaining,
                is_final: false,
                start_time,
            });
            metrics.record_partial();
        }
    }

    results
}

fn last_word(text: &str) -> Option<&str> {
    text.split_whitespace().last()
}

/// Runs one forced finalization pass on end-of-stream, per §4.8's transition
/// out of `Accumulating` on client disconnect or cancellation.
pub async fn finalize_on_close(
    session: &mut SessionState,
    transcriber: &dyn Transcriber,
    metrics: &SessionMetrics,
) -> Vec<TranscriptionResult> {
    if session.utterance_buffer.is_empty() {
        return Vec::new();
    }
    run_cycle(session, transcriber, metrics).await
}

/// Shared handle to the model used by all sessions in a server, matching
/// the single in-flight-call-per-session invariant via a process-wide
/// asynchronous mutex (§5).
pub type SharedTranscriber = Arc<tokio::sync::Mutex<Box<dyn Transcriber>>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcriber::FixtureTranscriber;
    use crate::types::{Segment, Word};

    fn word(text: &str, start: f32, end: f32) -> Word {
        Word { start, end, text: text.to_string() }
    }

    fn segment(words: Vec<Word>) -> Segment {
        let start = words.first().map(|w| w.start).unwrap_or(0.0);
        let end = words.last().map(|w| w.end).unwrap_or(0.0);
        let text = words.iter().map(|w| w.text.clone()).collect::<Vec<_>>().join(" ");
        Segment { start, end, text, avg_log_prob: -0.1, no_speech_prob: 0.05, words }
    }

    fn chunk_of(seconds: f32, amplitude: f32) -> AudioChunk {
        AudioChunk {
            data: vec![amplitude; (seconds * SAMPLE_RATE_HZ as f32) as usize],
            sample_rate: SAMPLE_RATE_HZ,
        }
    }

    #[tokio::test]
    async fn silent_session_emits_nothing_and_does_not_call_model() {
        let mut session = SessionState::new();
        let metrics = SessionMetrics::new();
        let transcriber = FixtureTranscriber::silent();

        let mut any_results = false;
        for _ in 0..30 {
            if session.ingest_chunk(&chunk_of(1.0, 0.0), &metrics) {
                let results = run_cycle(&mut session, &transcriber, &metrics).await;
                any_results |= !results.is_empty();
            }
        }
        assert!(!any_results);
    }

    #[tokio::test]
    async fn short_clear_sentence_finalizes_with_start_time_near_zero() {
        let mut session = SessionState::new();
        let metrics = SessionMetrics::new();
        let segments = vec![segment(vec![word("Hello", 0.0, 2.0), word("world.", 2.0, 2.5)])];
        let transcriber = FixtureTranscriber::with_segments(segments);

        let mut results = Vec::new();
        for _ in 0..4 {
            if session.ingest_chunk(&chunk_of(1.0, 0.1), &metrics) {
                results.extend(run_cycle(&mut session, &transcriber, &metrics).await);
            }
        }

        let finals: Vec<_> = results.iter().filter(|r| r.is_final).collect();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].text, "Hello world.");
        assert!(finals[0].start_time < 0.5);
    }

    #[tokio::test]
    async fn start_times_are_monotonically_non_decreasing() {
        let mut session = SessionState::new();
        let metrics = SessionMetrics::new();
        let segments = vec![segment(vec![word("Hello", 0.0, 1.0), word("there.", 1.0, 1.5)])];
        let transcriber = FixtureTranscriber::with_segments(segments);

        let mut last_start = 0.0;
        for _ in 0..10 {
            if session.ingest_chunk(&chunk_of(1.0, 0.1), &metrics) {
                for result in run_cycle(&mut session, &transcriber, &metrics).await {
                    assert!(result.start_time >= last_start);
                    last_start = result.start_time;
                }
            }
        }
    }
}
