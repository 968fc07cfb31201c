//! # Pitch Detection Module
//!
//! Fundamental frequency estimation with the Harmonic Product Spectrum.
//!
//! The spectrum arrives as log-magnitudes in dB, so "multiplying" the
//! harmonic bins is done by summing them: a bin whose integer multiples
//! also carry energy scores higher than any single harmonic, which keeps
//! the estimate on the fundamental instead of its octave.
//!
//! The result is quantized to the analysis bin width. There is no
//! parabolic or phase refinement; the silence threshold was tuned
//! against exactly this behaviour.

use crate::config::PitchConfig;
use crate::fft::SpectrumFrame;

/// Estimates the fundamental frequency of a dB magnitude spectrum.
///
/// # Arguments
/// * `magnitudes_db` - One magnitude per bin, in dB (bin `i` is `i * sample_rate / fft_size` Hz)
/// * `sample_rate_hz` - Sample rate the spectrum was computed at
/// * `fft_size` - Analysis window length the spectrum was computed with
/// * `config` - Search range, harmonic count and silence threshold
///
/// # Returns
/// * `Some(frequency)` - Bin-quantized fundamental in Hz
/// * `None` - Silence, noise, or unusable input
pub fn estimate(
    magnitudes_db: &[f32],
    sample_rate_hz: f32,
    fft_size: usize,
    config: &PitchConfig,
) -> Option<f32> {
    if magnitudes_db.is_empty() || fft_size == 0 || !(sample_rate_hz > 0.0) {
        return None;
    }
    let len = magnitudes_db.len();
    let bin_hz = sample_rate_hz / fft_size as f32;

    // --- Harmonic Product Spectrum (summed in the log domain) ---
    let mut accumulator = magnitudes_db.to_vec();
    for h in 2..=config.harmonics {
        for (i, acc) in accumulator.iter_mut().take(len.div_ceil(h)).enumerate() {
            *acc += magnitudes_db[i * h];
        }
    }

    // --- Peak search inside the configured range ---
    let min_bin = (config.min_frequency_hz / bin_hz).floor() as usize;
    let max_bin = ((config.max_frequency_hz / bin_hz).floor() as usize).min(len);

    let mut best: Option<(usize, f32)> = None;
    for (i, &value) in accumulator.iter().enumerate().take(max_bin).skip(min_bin) {
        let better = match best {
            Some((_, best_value)) => value > best_value,
            None => value > f32::NEG_INFINITY,
        };
        if better {
            best = Some((i, value));
        }
    }

    match best {
        Some((bin, value)) if value >= config.silence_threshold_db => Some(bin as f32 * bin_hz),
        _ => None,
    }
}

/// [`estimate`] applied to an analyser frame.
pub fn estimate_frame(frame: &SpectrumFrame, config: &PitchConfig) -> Option<f32> {
    estimate(
        &frame.magnitudes_db,
        frame.sample_rate_hz,
        frame.fft_size,
        config,
    )
}
