//! # Chord Synth Module
//!
//! Sounds a chord on the default output device for a fixed duration.
//! Each note is a sine voice; the chord gets a short linear attack and
//! release so it starts and ends without clicks.

use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info};

use crate::chord::{chord_notes, note_frequency};
use crate::error::{CaptureError, ChordError};

/// How long a chord sounds.
pub const CHORD_DURATION: Duration = Duration::from_secs(1);
const ATTACK: Duration = Duration::from_millis(10);
const RELEASE: Duration = Duration::from_millis(200);
/// Peak level of the summed voices.
const CHORD_GAIN: f32 = 0.25;

/// Sample generator for one chord strike.
#[derive(Debug, Clone)]
pub struct ChordVoice {
    increments: Vec<f32>,
    phases: Vec<f32>,
    position: usize,
    attack: usize,
    release: usize,
    total: usize,
}

impl ChordVoice {
    pub fn new(frequencies: &[f32], sample_rate: u32, duration: Duration) -> Self {
        let sr = sample_rate as f32;
        let to_samples = |d: Duration| (d.as_secs_f32() * sr) as usize;
        let total = to_samples(duration);
        Self {
            increments: frequencies.iter().map(|f| f / sr).collect(),
            phases: vec![0.0; frequencies.len()],
            position: 0,
            attack: to_samples(ATTACK).min(total / 2).max(1),
            release: to_samples(RELEASE).min(total / 2).max(1),
            total,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.total
    }

    fn envelope(&self) -> f32 {
        let pos = self.position;
        if pos < self.attack {
            pos as f32 / self.attack as f32
        } else if pos + self.release > self.total {
            (self.total - pos) as f32 / self.release as f32
        } else {
            1.0
        }
    }

    /// Next mono sample; silence once the chord has finished.
    pub fn next_sample(&mut self) -> f32 {
        if self.is_finished() || self.increments.is_empty() {
            self.position = self.position.saturating_add(1);
            return 0.0;
        }
        let mut sum = 0.0;
        for (phase, inc) in self.phases.iter_mut().zip(&self.increments) {
            sum += (std::f32::consts::TAU * *phase).sin();
            *phase = (*phase + inc).fract();
        }
        let value = sum / self.increments.len() as f32 * CHORD_GAIN * self.envelope();
        self.position += 1;
        value
    }
}

/// Plays chords on the default output device.
#[derive(Default)]
pub struct ChordSynth {
    stream: Option<cpal::Stream>,
}

impl ChordSynth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `symbol` and sounds it. Returns the note names played.
    pub fn play_chord(&mut self, symbol: &str) -> Result<Vec<String>, ChordError> {
        let notes = chord_notes(symbol)?;
        let frequencies = notes
            .iter()
            .map(|name| note_frequency(name))
            .collect::<Result<Vec<_>, _>>()?;
        self.play_frequencies(&frequencies)?;
        info!("[SYNTH] Playing {} as {:?}", symbol, notes);
        Ok(notes)
    }

    /// Sounds the given frequencies together for [`CHORD_DURATION`],
    /// cutting off any chord still playing.
    pub fn play_frequencies(&mut self, frequencies: &[f32]) -> Result<(), CaptureError> {
        self.stop();

        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| CaptureError::DeviceUnavailable("default output".to_string()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let voice = ChordVoice::new(frequencies, config.sample_rate.0, CHORD_DURATION);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, voice),
            cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, voice),
            cpal::SampleFormat::U16 => build_output::<u16>(&device, &config, voice),
            other => Err(CaptureError::Backend(format!(
                "unsupported output sample format {other:?}"
            ))),
        }?;
        stream
            .play()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Silences and releases the output stream.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                error!("[SYNTH] Error pausing output stream: {}", e);
            }
        }
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut voice: ChordVoice,
) -> Result<cpal::Stream, CaptureError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let err_fn = |err| error!("[SYNTH] An error occurred on the output stream: {}", err);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels.max(1)) {
                    let value = <T as cpal::FromSample<f32>>::from_sample_(voice.next_sample());
                    for sample in frame.iter_mut() {
                        *sample = value;
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| CaptureError::Backend(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chord_lasts_exactly_one_second() {
        let mut voice = ChordVoice::new(&[261.63, 329.63, 392.0], 48_000, CHORD_DURATION);
        let rendered: Vec<f32> = (0..48_000).map(|_| voice.next_sample()).collect();
        assert!(voice.is_finished());
        assert!(rendered.iter().any(|s| s.abs() > 0.05));
        assert!((0..1000).all(|_| voice.next_sample() == 0.0));
    }

    #[test]
    fn level_stays_within_gain() {
        let mut voice = ChordVoice::new(&[220.0, 277.18, 329.63, 392.0], 44_100, CHORD_DURATION);
        let peak = (0..44_100)
            .map(|_| voice.next_sample().abs())
            .fold(0.0_f32, f32::max);
        assert!(peak <= CHORD_GAIN + 1e-6, "peak {peak}");
    }

    #[test]
    fn starts_and_ends_quietly() {
        let mut voice = ChordVoice::new(&[440.0], 48_000, CHORD_DURATION);
        let rendered: Vec<f32> = (0..48_000).map(|_| voice.next_sample()).collect();
        assert_eq!(rendered[0], 0.0);
        assert!(rendered[47_999].abs() < 0.01);
    }

    #[test]
    fn empty_chord_is_silent() {
        let mut voice = ChordVoice::new(&[], 48_000, CHORD_DURATION);
        assert_eq!(voice.next_sample(), 0.0);
    }
}
