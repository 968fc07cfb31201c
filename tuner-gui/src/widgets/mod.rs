//! Canvas widgets drawn from the tuner's per-frame output.

pub mod offset_meter;
pub mod spectrogram;
