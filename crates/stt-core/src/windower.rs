//! Pure, allocation-light helpers for picking the model window, gating on
//! silence, and building the history-derived prompt. Kept free of session
//! state so they're trivial to unit test in isolation.

use std::collections::VecDeque;

use crate::constants::{PROMPT_CHAR_CAP, RMS_THRESHOLD, SAMPLE_RATE_HZ, WINDOW_MAX_SECONDS};

/// Selects the slice of `full_audio` submitted to the model, and the offset
/// (in seconds) of that slice's start within the full utterance.
pub fn select_window(full_audio: &[f32]) -> (&[f32], f32) {
    let total_duration = full_audio.len() as f32 / SAMPLE_RATE_HZ as f32;
    if total_duration > WINDOW_MAX_SECONDS {
        let window_samples = (WINDOW_MAX_SECONDS * SAMPLE_RATE_HZ as f32) as usize;
        let start = full_audio.len() - window_samples;
        (&full_audio[start..], total_duration - WINDOW_MAX_SECONDS)
    } else {
        (full_audio, 0.0)
    }
}

/// Root-mean-square amplitude of `window`.
pub fn rms(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = window.iter().map(|s| s * s).sum();
    (sum_sq / window.len() as f32).sqrt()
}

/// Whether `window` is quiet enough to skip a model call this cycle.
pub fn is_quiet(window: &[f32]) -> bool {
    rms(window) < RMS_THRESHOLD
}

/// Builds the `initialPrompt` sent with every model call: a fixed preamble
/// plus recent finalized history, capped to [`PROMPT_CHAR_CAP`] characters.
pub fn build_initial_prompt(history: &VecDeque<String>) -> String {
    const PREAMBLE: &str = "I am transcribing live speech.";
    if history.is_empty() {
        return PREAMBLE.to_string();
    }
    let joined = history.iter().cloned().collect::<Vec<_>>().join(" ");
    let context = if joined.len() > PROMPT_CHAR_CAP {
        let start = joined.len() - PROMPT_CHAR_CAP;
        // Find the nearest char boundary so we never split a multi-byte char.
        let boundary = (start..joined.len())
            .find(|&i| joined.is_char_boundary(i))
            .unwrap_or(joined.len());
        joined[boundary..].to_string()
    } else {
        joined
    };
    format!("{PREAMBLE} Context: {context}")
}
