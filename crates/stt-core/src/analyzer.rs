//! The decision engine: turns model segments into finalization/partial
//! decisions, adapting its thresholds to the speaker's measured pace.
//!
//! This module is pure with respect to I/O — it takes segments and session
//! timing facts and returns a [`CycleOutcome`] describing what the session
//! orchestrator should do. It owns none of the session's mutable state.

use crate::constants::{CONTINUATION_LOOKAHEAD_SECONDS, TAIL_CUSHION_SECONDS};
use crate::types::{classify_stop, Segment, StopKind, Word};

const HALLUCINATION_SINK: &[&str] = &[
    "please", "thanks", "thank you", "bye", "you", "it", "with", "the",
];

const CONTINUATION_TOKENS: &[&str] = &[
    "when", "and", "which", "but", "while", "that", "because", "the", "a",
];

/// Pace-adaptive thresholds derived from the speaker's current WPM estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaceThresholds {
    pub base_silence: f32,
    pub stall_strong_punct: f32,
    pub stall_else: f32,
}

/// Computes the base silence requirement and stall thresholds for `wpm`.
pub fn thresholds_for_wpm(wpm: f32) -> PaceThresholds {
    if wpm > 180.0 {
        PaceThresholds {
            base_silence: 0.6,
            stall_strong_punct: 1.0,
            stall_else: 1.4,
        }
    } else if wpm >= 140.0 {
        PaceThresholds {
            base_silence: 1.0,
            stall_strong_punct: 1.5,
            stall_else: 2.2,
        }
    } else if wpm >= 110.0 {
        PaceThresholds {
            base_silence: 1.5,
            stall_strong_punct: 2.0,
            stall_else: 2.8,
        }
    } else if wpm >= 85.0 {
        PaceThresholds {
            base_silence: 2.5,
            stall_strong_punct: 3.0,
            stall_else: 4.0,
        }
    } else {
        PaceThresholds {
            base_silence: 4.0,
            stall_strong_punct: 5.0,
            stall_else: 7.0,
        }
    }
}

/// Required silence before a forced finalization fires, after the strong
/// punctuation and long-window overrides (§4.6.B) are applied.
pub fn required_silence(base_silence: f32, wpm: f32, strong_punct: bool, word_count: usize, total_duration: f32) -> f32 {
    let mut required = base_silence;
    if strong_punct {
        required = required.min(if wpm < 130.0 { 0.4 } else { 0.3 });
    }
    if word_count > 15 || total_duration > 15.0 {
        required = required.min(0.6);
    }
    required
}

/// Drops segments the model itself flags as unreliable (§4.6.A).
pub fn filter_segments(segments: Vec<Segment>) -> Vec<Segment> {
    segments
        .into_iter()
        .filter(|s| s.no_speech_prob <= 0.8 && s.avg_log_prob >= -1.0)
        .collect()
}

/// Same filter, widened for the no-VAD fallback pass (§4.5a), which uses the
/// reference's more permissive cutoff since it is a recovery path.
pub fn filter_segments_fallback(segments: Vec<Segment>) -> Vec<Segment> {
    segments.into_iter().filter(|s| s.no_speech_prob < 0.6).collect()
}

/// A finalized phrase produced during incremental word scanning.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedSpan {
    pub text: String,
    /// Seconds relative to the window start.
    pub first_word_start_rel: f32,
    /// Cursor past the last finalized word, plus the tail cushion, relative
    /// to the window start.
    pub last_finalized_end_rel: f32,
    pub word_count: usize,
    pub speech_seconds: f32,
}

/// Result of scanning a window's filtered segments for sentence boundaries.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub finalized: Vec<FinalizedSpan>,
    /// Text still buffered after the last finalized span (or all of it, if
    /// nothing finalized).
    pub remaining_text: String,
    pub remaining_first_word_start_rel: Option<f32>,
    pub latest_speech_end_rel: f32,
}

struct FlatWord {
    word: Word,
    is_absolute_last: bool,
    next_start: Option<f32>,
    next_word_starts_with_continuation: bool,
}

/// Scans filtered `segments` word by word, applying the protected-split
/// rules in §4.6.C and returning every sentence boundary found plus the
/// trailing remainder.
pub fn scan_words(
    segments: &[Segment],
    wpm: f32,
    window_offset: f32,
    total_duration: f32,
) -> ScanResult {
    let flat = flatten_words(segments);
    let mut result = ScanResult::default();
    let mut current_words: Vec<&Word> = Vec::new();

    let min_words = if wpm < 100.0 { 12 } else { 6 };

    for fw in &flat {
        current_words.push(&fw.word);
        let is_stop = is_protected_stop(fw, wpm, window_offset, total_duration, current_words.len(), min_words);

        if is_stop {
            let first = current_words[0];
            let text = join_words(&current_words);
            let speech_seconds = (fw.word.end - first.start).max(0.1);
            result.finalized.push(FinalizedSpan {
                text,
                first_word_start_rel: first.start,
                last_finalized_end_rel: (fw.word.end + TAIL_CUSHION_SECONDS).min(total_duration - window_offset),
                word_count: current_words.len(),
                speech_seconds,
            });
            current_words.clear();
        }
    }

    if let Some(last) = flat.last() {
        result.latest_speech_end_rel = last.word.end;
    }

    if !current_words.is_empty() {
        result.remaining_first_word_start_rel = Some(current_words[0].start);
        result.remaining_text = join_words(&current_words);
    }

    result
}

fn is_protected_stop(
    fw: &FlatWord,
    wpm: f32,
    window_offset: f32,
    total_duration: f32,
    sentence_word_count: usize,
    min_words: usize,
) -> bool {
    if let Some(next_start) = fw.next_start {
        if next_start - fw.word.end < CONTINUATION_LOOKAHEAD_SECONDS {
            return false;
        }
    }

    let stop_kind = classify_stop(&fw.word.text);
    let silence_at_edge = total_duration - (window_offset + fw.word.end);

    match stop_kind {
        StopKind::Strong => {
            if fw.is_absolute_last {
                let required = if sentence_word_count < min_words {
                    if wpm < 100.0 {
                        2.5
                    } else {
                        1.5
                    }
                } else {
                    0.8
                };
                silence_at_edge >= required
            } else {
                // Not the last word overall: per §4.6.C.3 the continuation/
                // min-words protection applies regardless of whether this
                // word also happens to end its segment.
                !(fw.next_word_starts_with_continuation || sentence_word_count < min_words)
            }
        }
        StopKind::Soft => {
            let required = if fw.is_absolute_last { 1.5 } else { 1.0 };
            silence_at_edge >= required
        }
        StopKind::None => false,
    }
}

/// Segment-level fallback for models that don't return word timestamps
/// (§4.6.C, §9 design note): a segment with text but no `Word`s is treated
/// as a single pseudo-word spanning the segment, so its speech still
/// contributes to `remaining_text`/`latest_speech_end_rel` instead of being
/// silently dropped.
fn pseudo_word(seg: &Segment) -> Word {
    Word { start: seg.start, end: seg.end, text: seg.text.clone() }
}

/// Per-segment words to scan: the segment's own `Word`s, or a single
/// pseudo-word spanning the segment when it reported none.
fn effective_words(seg: &Segment) -> Vec<Word> {
    if seg.words.is_empty() {
        if seg.text.trim().is_empty() {
            Vec::new()
        } else {
            vec![pseudo_word(seg)]
        }
    } else {
        seg.words.clone()
    }
}

fn flatten_words(segments: &[Segment]) -> Vec<FlatWord> {
    let per_segment: Vec<Vec<Word>> = segments.iter().map(effective_words).collect();

    let mut flat = Vec::new();
    for (seg_idx, words) in per_segment.iter().enumerate() {
        let is_last_segment = seg_idx == per_segment.len() - 1;
        for (word_idx, word) in words.iter().enumerate() {
            let next_word = if word_idx + 1 < words.len() {
                Some(&words[word_idx + 1])
            } else {
                per_segment.get(seg_idx + 1).and_then(|next| next.first())
            };
            let next_start = next_word.map(|w| w.start);
            let next_word_starts_with_continuation = next_word
                .map(|w| starts_with_continuation(&w.text))
                .unwrap_or(false);
            flat.push(FlatWord {
                word: word.clone(),
                is_absolute_last: is_last_segment && word_idx == words.len() - 1,
                next_start,
                next_word_starts_with_continuation,
            });
        }
    }
    flat
}

fn starts_with_continuation(text: &str) -> bool {
    let lowered = text.to_lowercase();
    let bare = lowered.trim_matches(|c: char| !c.is_alphanumeric());
    CONTINUATION_TOKENS.contains(&bare)
}

fn join_words(words: &[&Word]) -> String {
    words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `text` should be rejected as a model hallucination rather than
/// emitted as a final (§4.6.D).
pub fn is_hallucination(text: &str, total_silence: f32) -> bool {
    let stripped = text.trim().trim_end_matches(['.', '?', '!']).to_lowercase();
    if HALLUCINATION_SINK.contains(&stripped.as_str()) {
        return true;
    }
    let word_count = text.split_whitespace().count();
    if word_count < 3 {
        let has_strong_punct = matches!(classify_stop(text), StopKind::Strong);
        if !has_strong_punct && total_silence <= 1.0 {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Word;

    fn word(text: &str, start: f32, end: f32) -> Word {
        Word { start, end, text: text.to_string() }
    }

    fn segment(words: Vec<Word>, no_speech_prob: f32, avg_log_prob: f32) -> Segment {
        let start = words.first().map(|w| w.start).unwrap_or(0.0);
        let end = words.last().map(|w| w.end).unwrap_or(0.0);
        let text = words.iter().map(|w| w.text.clone()).collect::<Vec<_>>().join(" ");
        Segment { start, end, text, avg_log_prob, no_speech_prob, words }
    }

    #[test]
    fn thresholds_match_table_boundaries() {
        assert_eq!(thresholds_for_wpm(200.0).base_silence, 0.6);
        assert_eq!(thresholds_for_wpm(150.0).base_silence, 1.0);
        assert_eq!(thresholds_for_wpm(120.0).base_silence, 1.5);
        assert_eq!(thresholds_for_wpm(90.0).base_silence, 2.5);
        assert_eq!(thresholds_for_wpm(50.0).base_silence, 4.0);
    }

    #[test]
    fn strong_punct_overrides_base_silence() {
        let required = required_silence(1.0, 150.0, true, 4, 5.0);
        assert_eq!(required, 0.3);
    }

    #[test]
    fn long_window_caps_required_silence() {
        let required = required_silence(4.0, 50.0, false, 20, 5.0);
        assert_eq!(required, 0.6);
    }

    #[test]
    fn filter_drops_low_confidence_segments() {
        let segs = vec![
            segment(vec![word("hi.", 0.0, 0.5)], 0.9, -0.2),
            segment(vec![word("hello.", 1.0, 1.5)], 0.1, -0.2),
        ];
        let filtered = filter_segments(segs);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].text, "hello.");
    }

    #[test]
    fn finalizes_on_strong_stop_with_enough_trailing_silence() {
        // "Hello world." ending at 2.5s, total_duration well past it (silence present).
        let segs = vec![segment(
            vec![word("Hello", 2.0, 2.3), word("world.", 2.3, 2.5)],
            0.05,
            -0.1,
        )];
        let scan = scan_words(&segs, 150.0, 0.0, 4.0);
        assert_eq!(scan.finalized.len(), 1);
        assert_eq!(scan.finalized[0].text, "Hello world.");
    }

    #[test]
    fn lookahead_suppresses_split_when_next_word_close() {
        let segs = vec![segment(
            vec![
                word("Hello", 0.0, 0.3),
                word("world.", 0.3, 0.5),
                word("Continuing", 0.6, 0.9),
            ],
            0.05,
            -0.1,
        )];
        let scan = scan_words(&segs, 150.0, 0.0, 4.0);
        assert!(scan.finalized.is_empty());
        assert!(scan.remaining_text.contains("Continuing"));
    }

    #[test]
    fn mid_segment_strong_stop_is_held_until_min_words() {
        // One segment, two sentences: "Hi." is a strong stop mid-segment but
        // has far fewer than min_words (6, since wpm >= 100) words so far —
        // it must not split off on its own.
        let segs = vec![segment(
            vec![
                word("Hi.", 0.0, 0.3),
                word("How", 1.0, 1.2),
                word("are", 1.2, 1.4),
                word("you", 1.4, 1.6),
                word("doing", 1.6, 1.9),
                word("today.", 1.9, 2.2),
            ],
            0.05,
            -0.1,
        )];
        let scan = scan_words(&segs, 150.0, 0.0, 10.0);
        // "Hi." must not split off on its own; the whole segment finalizes
        // together once the trailing "today." brings it past min_words.
        assert_eq!(scan.finalized.len(), 1, "premature split on a 1-word mid-segment sentence");
        assert_eq!(scan.finalized[0].text, "Hi. How are you doing today.");
    }

    #[test]
    fn mid_segment_strong_stop_splits_once_min_words_reached() {
        let segs = vec![segment(
            vec![
                word("One", 0.0, 0.2),
                word("two", 0.2, 0.4),
                word("three", 0.4, 0.6),
                word("four", 0.6, 0.8),
                word("five", 0.8, 1.0),
                word("six.", 1.0, 1.3),
                word("Next", 2.0, 2.2),
            ],
            0.05,
            -0.1,
        )];
        let scan = scan_words(&segs, 150.0, 0.0, 10.0);
        assert_eq!(scan.finalized.len(), 1);
        assert_eq!(scan.finalized[0].text, "One two three four five six.");
    }

    #[test]
    fn segment_without_word_timestamps_falls_back_to_segment_span() {
        let segs = vec![Segment {
            start: 0.0,
            end: 2.0,
            text: "Hello world.".to_string(),
            avg_log_prob: -0.1,
            no_speech_prob: 0.05,
            words: Vec::new(),
        }];
        let scan = scan_words(&segs, 150.0, 0.0, 4.0);
        assert_eq!(scan.latest_speech_end_rel, 2.0);
        assert!(scan.remaining_text.contains("Hello world.") || scan.finalized.iter().any(|f| f.text == "Hello world."));
    }

    #[test]
    fn hallucination_sink_rejects_short_sink_words() {
        assert!(is_hallucination("Thank you.", 0.2));
        assert!(!is_hallucination("Thank you very much indeed.", 0.2));
    }

    #[test]
    fn hallucination_sink_allows_short_text_after_long_silence() {
        assert!(!is_hallucination("Okay yes", 1.5));
    }
}
