// tuner-core/src/lib.rs

//! The core logic for the real-time instrument tuner.
//! This crate is responsible for audio capture, spectral analysis,
//! Harmonic Product Spectrum pitch detection and note matching.
//! It is completely headless and contains no GUI code.

pub mod audio;
pub mod chord;
pub mod config;
pub mod devices;
pub mod error;
pub mod fft;
pub mod filter;
pub mod pitch;
pub mod session;
pub mod synth;
pub mod tuner;
pub mod tuning;

pub use config::{CaptureConfig, PitchConfig, TunerConfig};
pub use error::{CaptureError, ChordError, NoteTableError};
pub use fft::SpectrumFrame;
pub use tuner::{Reading, TunerLoop, TunerState, TunerStatus};
pub use tuning::{NoteEntry, NoteTable, TuningResult};
