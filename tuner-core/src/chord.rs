//! Chord symbol resolution for the chord-playback helper.
//!
//! Chord suggestions arrive as free text ("Try Am - F - C - G7"). Symbols
//! are picked out of the text, resolved to a root pitch class and a coarse
//! quality, and spelled as note names in octave 4.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ChordError;

/// Octave the chord tones are voiced in.
pub const CHORD_OCTAVE: i32 = 4;

const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

static CHORD_SYMBOL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-G][b#]?(m|maj|min|dim|aug|sus|add)?[2-9]?)\b")
        .expect("chord symbol pattern is valid")
});

/// Note names with a MIDI-range octave, -1 through 9.
static NOTE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-G][b#]?)(-1|\d)$").expect("note name pattern is valid"));

/// Coarse chord quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChordQuality {
    Major,
    Minor,
    DominantSeventh,
}

impl ChordQuality {
    /// Semitone intervals above the root.
    pub fn intervals(self) -> &'static [usize] {
        match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::DominantSeventh => &[0, 4, 7, 10],
        }
    }

    /// Classifies the text following the root.
    fn from_suffix(suffix: &str) -> Self {
        if suffix.starts_with('m') && !suffix.starts_with("maj") {
            ChordQuality::Minor
        } else if suffix.contains('7') {
            ChordQuality::DominantSeventh
        } else {
            ChordQuality::Major
        }
    }
}

/// Pitch class (C = 0) of a root spelled with an optional sharp or flat.
pub fn pitch_class(root: &str) -> Option<usize> {
    let class = match root {
        "C" => 0,
        "C#" | "Db" => 1,
        "D" => 2,
        "D#" | "Eb" => 3,
        "E" => 4,
        "F" => 5,
        "F#" | "Gb" => 6,
        "G" => 7,
        "G#" | "Ab" => 8,
        "A" => 9,
        "A#" | "Bb" => 10,
        "B" => 11,
        _ => return None,
    };
    Some(class)
}

/// Splits a chord symbol into its root and quality.
pub fn parse_chord(symbol: &str) -> Result<(usize, ChordQuality), ChordError> {
    let symbol = symbol.trim();
    let unknown = || ChordError::UnknownChord(symbol.to_string());

    let mut chars = symbol.char_indices();
    let root_end = match (chars.next(), chars.next()) {
        (Some((_, 'A'..='G')), Some((i, 'b' | '#'))) => i + 1,
        (Some((_, 'A'..='G')), _) => 1,
        _ => return Err(unknown()),
    };
    let (root, suffix) = symbol.split_at(root_end);
    let class = pitch_class(root).ok_or_else(unknown)?;
    Ok((class, ChordQuality::from_suffix(suffix)))
}

/// Note names of a chord, voiced in octave 4 with sharp spelling.
///
/// ```
/// use tuner_core::chord::chord_notes;
/// assert_eq!(chord_notes("Am").unwrap(), ["A4", "C4", "E4"]);
/// ```
pub fn chord_notes(symbol: &str) -> Result<Vec<String>, ChordError> {
    let (root, quality) = parse_chord(symbol)?;
    Ok(quality
        .intervals()
        .iter()
        .map(|interval| format!("{}{}", SHARP_NAMES[(root + interval) % 12], CHORD_OCTAVE))
        .collect())
}

/// All chord symbols mentioned in `text`, in order of appearance.
pub fn find_chord_symbols(text: &str) -> Vec<&str> {
    CHORD_SYMBOL
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Equal-temperament frequency of a note name such as "A4" or "Eb3" (A4 = 440 Hz).
pub fn note_frequency(name: &str) -> Result<f32, ChordError> {
    let unknown = || ChordError::UnknownNote(name.to_string());
    let caps = NOTE_NAME.captures(name.trim()).ok_or_else(unknown)?;
    let class = pitch_class(&caps[1]).ok_or_else(unknown)? as i32;
    let octave: i32 = caps[2].parse().map_err(|_| unknown())?;
    let midi = (octave + 1) * 12 + class;
    Ok(440.0 * 2.0_f32.powf((midi - 69) as f32 / 12.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn major_minor_and_seventh_chords() {
        assert_eq!(chord_notes("C").unwrap(), ["C4", "E4", "G4"]);
        assert_eq!(chord_notes("Am").unwrap(), ["A4", "C4", "E4"]);
        assert_eq!(chord_notes("G7").unwrap(), ["G4", "B4", "D4", "F4"]);
        assert_eq!(chord_notes("Bbmin").unwrap(), ["A#4", "C#4", "F4"]);
    }

    #[test]
    fn maj_suffix_is_not_minor() {
        assert_eq!(chord_notes("Cmaj").unwrap(), ["C4", "E4", "G4"]);
        // Only the quality prefix is read: "maj7" resolves as a dominant seventh.
        assert_eq!(chord_notes("Fmaj7").unwrap(), ["F4", "A4", "C4", "D#4"]);
    }

    #[test]
    fn flats_resolve_to_sharp_spelling() {
        assert_eq!(chord_notes("Eb").unwrap(), ["D#4", "G4", "A#4"]);
        assert_eq!(chord_notes("F#m").unwrap(), ["F#4", "A4", "C#4"]);
    }

    #[test]
    fn rejects_non_chords() {
        assert_eq!(
            chord_notes("H7"),
            Err(ChordError::UnknownChord("H7".to_string()))
        );
        assert!(chord_notes("").is_err());
    }

    #[test]
    fn finds_symbols_in_free_text() {
        let text = "Try Am - F - C - G7 for the verse, then Dsus4 into Ebmaj.";
        assert_eq!(
            find_chord_symbols(text),
            ["Am", "F", "C", "G7", "Dsus4", "Ebmaj"]
        );
    }

    #[test]
    fn words_are_not_chords() {
        assert!(find_chord_symbols("Great chorus energy").is_empty());
    }

    #[test]
    fn note_frequencies() {
        assert_relative_eq!(note_frequency("A4").unwrap(), 440.0);
        assert_relative_eq!(note_frequency("A3").unwrap(), 220.0);
        assert_relative_eq!(note_frequency("C4").unwrap(), 261.6256, max_relative = 1e-5);
        assert_relative_eq!(note_frequency("Bb4").unwrap(), 466.1638, max_relative = 1e-5);
        assert!(note_frequency("Q4").is_err());
    }

    #[test]
    fn octave_must_be_in_midi_range() {
        assert_relative_eq!(note_frequency("C-1").unwrap(), 8.175_799, max_relative = 1e-5);
        assert_relative_eq!(note_frequency("G9").unwrap(), 12_543.854, max_relative = 1e-5);
        assert_eq!(
            note_frequency("A999999999"),
            Err(ChordError::UnknownNote("A999999999".to_string()))
        );
        assert!(note_frequency("A10").is_err());
        assert!(note_frequency("A-2").is_err());
    }
}
