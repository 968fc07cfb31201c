//! # Musical Tuning Module
//!
//! Note reference data and nearest-note matching for the tuner.
//!
//! ## Features
//! - Static note table spanning E2 to C6 (guitar and voice range)
//! - Nearest-note lookup with deterministic tie breaking
//! - Hz offset and cent deviation calculations

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::error::NoteTableError;

/// Represents a single musical note with its name and reference frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEntry {
    /// Note name (e.g., "A4", "C#3/Db3")
    pub name: String,
    /// Reference frequency in Hz
    pub frequency_hz: f32,
}

impl NoteEntry {
    pub fn new(name: impl Into<String>, frequency_hz: f32) -> Self {
        Self {
            name: name.into(),
            frequency_hz,
        }
    }
}

/// Reference pitches for the tuner, E2 through C6 in equal temperament (A4 = 440 Hz).
const STANDARD_NOTES: [(&str, f32); 45] = [
    ("E2", 82.4069),
    ("F2", 87.3071),
    ("F#2/Gb2", 92.4986),
    ("G2", 97.9989),
    ("G#2/Ab2", 103.826),
    ("A2", 110.000),
    ("A#2/Bb2", 116.541),
    ("B2", 123.471),
    ("C3", 130.813),
    ("C#3/Db3", 138.591),
    ("D3", 146.832),
    ("D#3/Eb3", 155.563),
    ("E3", 164.814),
    ("F3", 174.614),
    ("F#3/Gb3", 184.997),
    ("G3", 195.998),
    ("G#3/Ab3", 207.652),
    ("A3", 220.000),
    ("A#3/Bb3", 233.082),
    ("B3", 246.942),
    ("C4", 261.626),
    ("C#4/Db4", 277.183),
    ("D4", 293.665),
    ("D#4/Eb4", 311.127),
    ("E4", 329.628),
    ("F4", 349.228),
    ("F#4/Gb4", 369.994),
    ("G4", 391.995),
    ("G#4/Ab4", 415.305),
    ("A4", 440.000),
    ("A#4/Bb4", 466.164),
    ("B4", 493.883),
    ("C5", 523.251),
    ("C#5/Db5", 554.365),
    ("D5", 587.330),
    ("D#5/Eb5", 622.254),
    ("E5", 659.255),
    ("F5", 698.456),
    ("F#5/Gb5", 739.989),
    ("G5", 783.991),
    ("G#5/Ab5", 830.609),
    ("A5", 880.000),
    ("A#5/Bb5", 932.328),
    ("B5", 987.767),
    ("C6", 1046.502),
];

/// The standard table, built once at first use and kept for the process lifetime.
static STANDARD_TABLE: Lazy<NoteTable> = Lazy::new(|| NoteTable {
    entries: STANDARD_NOTES
        .iter()
        .map(|&(name, frequency_hz)| NoteEntry::new(name, frequency_hz))
        .collect(),
});

/// An immutable, ascending table of reference notes.
///
/// Frequencies are strictly increasing and names unique; a table is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteTable {
    entries: Vec<NoteEntry>,
}

impl NoteTable {
    /// Builds a table from arbitrary entries, sorting them by frequency.
    pub fn new(mut entries: Vec<NoteEntry>) -> Result<Self, NoteTableError> {
        if entries.is_empty() {
            return Err(NoteTableError::Empty);
        }
        entries.sort_by(|a, b| a.frequency_hz.total_cmp(&b.frequency_hz));

        for pair in entries.windows(2) {
            if !(pair[1].frequency_hz > pair[0].frequency_hz) {
                return Err(NoteTableError::NotIncreasing {
                    previous: pair[0].frequency_hz,
                    next: pair[1].frequency_hz,
                });
            }
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.name.as_str()) {
                return Err(NoteTableError::DuplicateName(entry.name.clone()));
            }
        }

        Ok(Self { entries })
    }

    /// The built-in E2–C6 table.
    pub fn standard() -> &'static NoteTable {
        &STANDARD_TABLE
    }

    pub fn entries(&self) -> &[NoteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up an entry by its exact name.
    pub fn find(&self, name: &str) -> Option<&NoteEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Nearest entry to `frequency_hz`.
    pub fn closest(&self, frequency_hz: f32) -> &NoteEntry {
        closest(frequency_hz, &self.entries)
    }

    /// Matches a frequency and computes its offset from the nearest note.
    pub fn match_frequency(&self, frequency_hz: f32) -> TuningResult {
        TuningResult::new(self.closest(frequency_hz).clone(), frequency_hz)
    }
}

/// Finds the entry whose reference frequency is closest to `frequency_hz`.
///
/// Linear scan in table order; on an exact tie the earlier (lower) entry wins.
///
/// # Panics
/// If `table` is empty.
pub fn closest(frequency_hz: f32, table: &[NoteEntry]) -> &NoteEntry {
    let mut best = &table[0];
    let mut best_diff = (best.frequency_hz - frequency_hz).abs();
    for entry in &table[1..] {
        let diff = (entry.frequency_hz - frequency_hz).abs();
        if diff < best_diff {
            best = entry;
            best_diff = diff;
        }
    }
    best
}

/// A detected frequency matched against its nearest note.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningResult {
    pub note: NoteEntry,
    pub frequency_hz: f32,
    /// `frequency_hz - note.frequency_hz`; positive means sharp.
    pub offset_hz: f32,
}

impl TuningResult {
    pub fn new(note: NoteEntry, frequency_hz: f32) -> Self {
        let offset_hz = frequency_hz - note.frequency_hz;
        Self {
            note,
            frequency_hz,
            offset_hz,
        }
    }

    /// Deviation from the matched note in cents.
    pub fn cents(&self) -> f32 {
        calculate_cents_deviation(self.frequency_hz, self.note.frequency_hz)
    }
}

/// Calculates the deviation from a target frequency in cents.
///
/// - 100 cents = 1 semitone
/// - Positive values indicate sharpness, negative values flatness
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}
