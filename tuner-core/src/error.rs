//! Error types shared across the tuner core.

use thiserror::Error;

/// Failures surfaced while acquiring or driving the audio input.
///
/// All of these are recoverable: the tuner returns to `Stopped` and the UI
/// offers a retry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Microphone access denied. Please check permissions.")]
    PermissionDenied,

    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Invalid capture configuration: {0}")]
    Configuration(String),

    #[error("Audio backend error: {0}")]
    Backend(String),
}

/// Rejected note table data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NoteTableError {
    #[error("note table is empty")]
    Empty,

    #[error("frequencies must be strictly increasing ({previous} Hz followed by {next} Hz)")]
    NotIncreasing { previous: f32, next: f32 },

    #[error("duplicate note name: {0}")]
    DuplicateName(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChordError {
    #[error("unrecognised chord symbol: {0}")]
    UnknownChord(String),

    #[error("unrecognised note name: {0}")]
    UnknownNote(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}
