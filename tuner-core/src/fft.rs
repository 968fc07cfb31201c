//! # Spectrum Analyser Module
//!
//! A pull-based analysis node: audio samples are pushed in as they arrive,
//! and a magnitude spectrum in dB is produced on request from the most
//! recent `fft_size` samples.
//!
//! ## Processing
//! - Blackman window over the latest window of samples
//! - Forward FFT using RustFFT
//! - Magnitudes normalised by the window length
//! - Exponential smoothing across successive frames
//! - Conversion to dB (silence maps to negative infinity)

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::config::CaptureConfig;
use crate::error::CaptureError;

/// One analysed spectrum. Produced per request and consumed immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    /// Magnitude per bin in dB, `bin_count` entries.
    pub magnitudes_db: Vec<f32>,
    pub bin_count: usize,
    pub sample_rate_hz: f32,
    pub fft_size: usize,
}

impl SpectrumFrame {
    /// Width of one frequency bin in Hz.
    pub fn bin_hz(&self) -> f32 {
        self.sample_rate_hz / self.fft_size as f32
    }
}

/// Blackman window coefficients for a window of `len` samples.
fn blackman_window(len: usize) -> Vec<f32> {
    const A0: f32 = 0.42;
    const A1: f32 = 0.5;
    const A2: f32 = 0.08;
    let n = len as f32;
    (0..len)
        .map(|i| {
            let x = std::f32::consts::TAU * i as f32 / n;
            A0 - A1 * x.cos() + A2 * (2.0 * x).cos()
        })
        .collect()
}

/// Frequency analyser over a sliding window of the input signal.
pub struct Analyser {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    sample_rate_hz: f32,
    smoothing: f32,
    window: Vec<f32>,
    /// Ring buffer of the latest `fft_size` samples; `write_pos` is the oldest.
    time_domain: Vec<f32>,
    write_pos: usize,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl Analyser {
    pub fn new(sample_rate_hz: f32, config: &CaptureConfig) -> Result<Self, CaptureError> {
        config.validate()?;
        let fft_size = config.fft_size;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Ok(Self {
            fft,
            fft_size,
            sample_rate_hz,
            smoothing: config.smoothing_time_constant,
            window: blackman_window(fft_size),
            time_domain: vec![0.0; fft_size],
            write_pos: 0,
            smoothed: vec![0.0; fft_size / 2],
            scratch: vec![Complex { re: 0.0, im: 0.0 }; fft_size],
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn sample_rate_hz(&self) -> f32 {
        self.sample_rate_hz
    }

    /// Appends samples to the analysis window, discarding the oldest ones.
    pub fn push_samples(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.time_domain[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.fft_size;
        }
    }

    /// Analyses the current window and returns its dB magnitude spectrum.
    pub fn frequency_data(&mut self) -> SpectrumFrame {
        let n = self.fft_size;
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let sample = self.time_domain[(self.write_pos + i) % n];
            *slot = Complex {
                re: sample * self.window[i],
                im: 0.0,
            };
        }

        self.fft.process(&mut self.scratch);

        let scale = 1.0 / n as f32;
        let tau = self.smoothing;
        let magnitudes_db = self
            .smoothed
            .iter_mut()
            .zip(self.scratch.iter())
            .map(|(previous, bin)| {
                let magnitude = bin.norm() * scale;
                *previous = tau * *previous + (1.0 - tau) * magnitude;
                20.0 * previous.log10()
            })
            .collect::<Vec<f32>>();

        SpectrumFrame {
            bin_count: magnitudes_db.len(),
            magnitudes_db,
            sample_rate_hz: self.sample_rate_hz,
            fft_size: n,
        }
    }
}
