//! # Configuration Module
//!
//! Tunable constants for pitch detection and capture. The defaults are
//! empirically tuned values; change them only together with re-validating
//! the detection thresholds against real input.
//!
//! Configurations are stored as pretty-printed JSON, the same way tuning
//! profiles are saved and loaded.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::CaptureError;

/// Analysis window length in samples.
pub const FFT_SIZE: usize = 4096;
/// Lowest frequency the estimator searches, in Hz.
pub const MIN_FREQUENCY_HZ: f32 = 80.0;
/// Exclusive upper bound of the estimator search, in Hz.
pub const MAX_FREQUENCY_HZ: f32 = 1320.0;
/// Number of harmonics combined by the Harmonic Product Spectrum, fundamental included.
pub const HPS_HARMONICS: usize = 5;
/// Accumulated dB level below which a frame is treated as silence.
pub const SILENCE_THRESHOLD_DB: f32 = -75.0;
/// Cutoff of the conditioning low-pass filter, in Hz.
pub const LOW_PASS_CUTOFF_HZ: f32 = 1500.0;
/// Averaging constant applied to successive magnitude spectra.
pub const SMOOTHING_TIME_CONSTANT: f32 = 0.8;
/// Upper limit on `PitchConfig::harmonics`.
pub const MAX_HPS_HARMONICS: usize = 16;

/// Parameters of the Harmonic Product Spectrum estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    pub min_frequency_hz: f32,
    pub max_frequency_hz: f32,
    pub harmonics: usize,
    pub silence_threshold_db: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            min_frequency_hz: MIN_FREQUENCY_HZ,
            max_frequency_hz: MAX_FREQUENCY_HZ,
            harmonics: HPS_HARMONICS,
            silence_threshold_db: SILENCE_THRESHOLD_DB,
        }
    }
}

impl PitchConfig {
    /// Checks the values the estimator cannot search with.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if !(self.min_frequency_hz.is_finite() && self.min_frequency_hz > 0.0) {
            return Err(CaptureError::Configuration(format!(
                "min_frequency_hz must be positive, got {}",
                self.min_frequency_hz
            )));
        }
        if !(self.max_frequency_hz.is_finite() && self.max_frequency_hz > self.min_frequency_hz) {
            return Err(CaptureError::Configuration(format!(
                "max_frequency_hz must exceed min_frequency_hz ({}), got {}",
                self.min_frequency_hz, self.max_frequency_hz
            )));
        }
        if !(1..=MAX_HPS_HARMONICS).contains(&self.harmonics) {
            return Err(CaptureError::Configuration(format!(
                "harmonics must be in 1..={MAX_HPS_HARMONICS}, got {}",
                self.harmonics
            )));
        }
        if self.silence_threshold_db.is_nan() {
            return Err(CaptureError::Configuration(
                "silence_threshold_db must be a number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters of the capture pipeline (filter and analyser).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub fft_size: usize,
    pub low_pass_cutoff_hz: f32,
    pub smoothing_time_constant: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fft_size: FFT_SIZE,
            low_pass_cutoff_hz: LOW_PASS_CUTOFF_HZ,
            smoothing_time_constant: SMOOTHING_TIME_CONSTANT,
        }
    }
}

impl CaptureConfig {
    /// Checks the values the analyser and filter cannot work with.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.fft_size < 32 || !self.fft_size.is_power_of_two() {
            return Err(CaptureError::Configuration(format!(
                "fft_size must be a power of two >= 32, got {}",
                self.fft_size
            )));
        }
        if !(self.low_pass_cutoff_hz.is_finite() && self.low_pass_cutoff_hz > 0.0) {
            return Err(CaptureError::Configuration(format!(
                "low_pass_cutoff_hz must be positive, got {}",
                self.low_pass_cutoff_hz
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing_time_constant) {
            return Err(CaptureError::Configuration(format!(
                "smoothing_time_constant must be in [0, 1), got {}",
                self.smoothing_time_constant
            )));
        }
        Ok(())
    }
}

/// Complete tuner configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub pitch: PitchConfig,
    pub capture: CaptureConfig,
}

impl TunerConfig {
    pub fn validate(&self) -> Result<(), CaptureError> {
        self.pitch.validate()?;
        self.capture.validate()
    }

    /// Loads a configuration from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)
            .with_context(|| format!("opening config {}", path.display()))?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        let config: TunerConfig = serde_json::from_str(&data)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validating config {}", path.display()))?;
        Ok(config)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json_string = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path.as_ref())?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }
}
