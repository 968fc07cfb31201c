//! Low-pass conditioning filter applied to the input before analysis.
//!
//! Sustained string and vocal tones carry strong upper harmonics that can
//! outweigh the fundamental in the Harmonic Product Spectrum. A gentle
//! second-order low-pass keeps them in check.

use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type, Q_BUTTERWORTH_F32};

use crate::error::CaptureError;

pub struct LowPassFilter {
    filter: DirectForm1<f32>,
    cutoff_hz: f32,
}

impl LowPassFilter {
    pub fn new(sample_rate_hz: f32, cutoff_hz: f32) -> Result<Self, CaptureError> {
        if !(cutoff_hz > 0.0 && cutoff_hz < sample_rate_hz / 2.0) {
            return Err(CaptureError::Configuration(format!(
                "low-pass cutoff {cutoff_hz} Hz must lie below Nyquist ({} Hz)",
                sample_rate_hz / 2.0
            )));
        }
        let coeffs = Coefficients::<f32>::from_params(
            Type::LowPass,
            sample_rate_hz.hz(),
            cutoff_hz.hz(),
            Q_BUTTERWORTH_F32,
        )
        .map_err(|e| CaptureError::Configuration(format!("low-pass coefficients: {e:?}")))?;

        Ok(Self {
            filter: DirectForm1::<f32>::new(coeffs),
            cutoff_hz,
        })
    }

    pub fn cutoff_hz(&self) -> f32 {
        self.cutoff_hz
    }

    /// Filters `samples` in place.
    pub fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.filter.run(*sample);
        }
    }
}
