//! Resamples incoming audio chunks to the canonical 16kHz the rest of the
//! pipeline operates at.
//!
//! Uses linear interpolation rather than a sinc-based resampler so that
//! resampling at the canonical rate is an exact no-op and the result is a
//! deterministic, closed-form function of the input samples.

use crate::constants::SAMPLE_RATE_HZ;
use crate::types::AudioChunk;
use stt_foundation::error::TranscodeError;

/// Resamples `chunk` to [`SAMPLE_RATE_HZ`], returning mono `f32` samples.
///
/// A `sample_rate` of `0` is treated as already being the canonical rate.
/// Chunks containing non-finite samples are rejected rather than silently
/// propagated into the model.
pub fn resample_to_canonical(chunk: &AudioChunk) -> Result<Vec<f32>, TranscodeError> {
    if chunk.data.is_empty() {
        return Err(TranscodeError::EmptyChunk);
    }
    if chunk.data.iter().any(|s| !s.is_finite()) {
        return Err(TranscodeError::NonFiniteSamples);
    }

    let received_rate = if chunk.sample_rate == 0 {
        SAMPLE_RATE_HZ
    } else {
        chunk.sample_rate
    };

    if received_rate == SAMPLE_RATE_HZ {
        return Ok(chunk.data.clone());
    }

    Ok(linear_resample(&chunk.data, received_rate, SAMPLE_RATE_HZ))
}

/// Linear interpolation resample, equivalent to `np.interp` over a linspace
/// of the target length.
fn linear_resample(data: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    let src_len = data.len();
    if src_len == 1 {
        return vec![data[0]];
    }

    let duration = src_len as f64 / from_rate as f64;
    let target_len = (duration * to_rate as f64) as usize;
    if target_len == 0 {
        return Vec::new();
    }

    let last_index = (src_len - 1) as f64;
    let mut out = Vec::with_capacity(target_len);
    for i in 0..target_len {
        let x_new = if target_len == 1 {
            0.0
        } else {
            last_index * (i as f64 / (target_len - 1) as f64)
        };
        let x0 = x_new.floor() as usize;
        let x1 = (x0 + 1).min(src_len - 1);
        let frac = (x_new - x0 as f64) as f32;
        let y0 = data[x0];
        let y1 = data[x1];
        out.push(y0 + (y1 - y0) * frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_rate_is_exact_passthrough() {
        let chunk = AudioChunk {
            data: vec![0.1, 0.2, -0.3, 0.4],
            sample_rate: SAMPLE_RATE_HZ,
        };
        let resampled = resample_to_canonical(&chunk).unwrap();
        assert_eq!(resampled, chunk.data);
    }

    #[test]
    fn zero_sample_rate_is_treated_as_canonical() {
        let chunk = AudioChunk {
            data: vec![0.5, -0.5],
            sample_rate: 0,
        };
        let resampled = resample_to_canonical(&chunk).unwrap();
        assert_eq!(resampled, chunk.data);
    }

    #[test]
    fn upsamples_to_expected_length() {
        let chunk = AudioChunk {
            data: vec![0.0; 8000],
            sample_rate: 8000,
        };
        let resampled = resample_to_canonical(&chunk).unwrap();
        assert_eq!(resampled.len(), 16000);
    }

    #[test]
    fn rejects_non_finite_samples() {
        let chunk = AudioChunk {
            data: vec![0.1, f32::NAN],
            sample_rate: SAMPLE_RATE_HZ,
        };
        assert!(matches!(
            resample_to_canonical(&chunk),
            Err(TranscodeError::NonFiniteSamples)
        ));
    }

    #[test]
    fn rejects_empty_chunk() {
        let chunk = AudioChunk {
            data: vec![],
            sample_rate: SAMPLE_RATE_HZ,
        };
        assert!(matches!(
            resample_to_canonical(&chunk),
            Err(TranscodeError::EmptyChunk)
        ));
    }

    #[test]
    fn resampling_is_idempotent_at_canonical_rate() {
        let chunk = AudioChunk {
            data: vec![0.0, 0.3, -0.6, 0.9, -0.1],
            sample_rate: SAMPLE_RATE_HZ,
        };
        let once = resample_to_canonical(&chunk).unwrap();
        let twice = resample_to_canonical(&AudioChunk {
            data: once.clone(),
            sample_rate: SAMPLE_RATE_HZ,
        })
        .unwrap();
        assert_eq!(once, twice);
    }

    proptest::proptest! {
        /// §8's resampler idempotence invariant, generalized: for any finite
        /// sample sequence already at the canonical rate, resampling is an
        /// exact no-op, no matter how many times it's repeated.
        #[test]
        fn canonical_rate_resampling_is_always_a_no_op(data in proptest::collection::vec(-1.0f32..1.0, 1..200)) {
            let chunk = AudioChunk { data: data.clone(), sample_rate: SAMPLE_RATE_HZ };
            let resampled = resample_to_canonical(&chunk).unwrap();
            proptest::prop_assert_eq!(resampled, data);
        }

        /// Off-rate resampling always produces the duration-implied sample
        /// count, regardless of the input's shape or length.
        #[test]
        fn resampled_length_matches_target_duration(
            data in proptest::collection::vec(-1.0f32..1.0, 2..200),
            from_rate in 4000u32..48000,
        ) {
            let chunk = AudioChunk { data: data.clone(), sample_rate: from_rate };
            let resampled = resample_to_canonical(&chunk).unwrap();
            let expected_len = (data.len() as f64 / from_rate as f64 * SAMPLE_RATE_HZ as f64) as usize;
            proptest::prop_assert_eq!(resampled.len(), expected_len);
        }
    }
}
