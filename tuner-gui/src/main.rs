//! # Tuner - Real-time Instrument Tuning GUI
//!
//! Desktop front-end for `tuner-core`. It drives the tuner loop from the
//! window's redraw subscription, shows the matched note with its offset
//! in Hz, the live spectrum and the input device picker, and can sound
//! chords typed into a text box.
//!
//! ## Architecture
//! - **Main Thread**: Iced GUI application with dark theme; owns the tuner
//! - **Audio Callback**: CPAL pushes mono chunks into the capture session
//! - **Updates**: one tuner tick per window frame, only while listening

mod ui;
mod widgets;

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use iced::{Subscription, Task, Theme};
use log::{info, warn};
use tuner_core::audio::{CpalHost, DeviceInfo};
use tuner_core::chord::find_chord_symbols;
use tuner_core::devices::{DeviceRegistry, PermissionState};
use tuner_core::synth::ChordSynth;
use tuner_core::{Reading, TunerConfig, TunerLoop};
use ui::main_display::create_main_view;

/// Optional settings file read from the working directory.
const CONFIG_PATH: &str = "tuner_config.json";

pub fn main() -> iced::Result {
    env_logger::init();
    info!("[MAIN] Starting tuner application...");
    let result = iced::application("Tuner", TunerApp::update, TunerApp::view)
        .subscription(TunerApp::subscription)
        .theme(TunerApp::theme)
        .run();
    info!("[MAIN] Application finished with result: {:?}", result);
    result
}

#[derive(Debug, Clone)]
pub enum Message {
    // Microphone access
    Connect,
    Disconnect,

    // Tuner control
    Start,
    Stop,
    DeviceSelected(DeviceInfo),

    // Chord playback
    ChordTextChanged(String),
    PlayChord(String),

    Exit,

    /// The window is about to redraw.
    Frame(Instant),
}

/// Everything the view needs, detached from the tuner's borrow.
#[derive(Debug, Clone)]
pub struct AppDisplayData {
    pub status: String,
    pub permission: PermissionState,
    pub listening: bool,
    pub note_name: Option<String>,
    pub detected_hz: Option<f32>,
    pub offset_hz: Option<f32>,
    pub spectrum: Vec<f32>,
    pub devices: Vec<DeviceInfo>,
    pub selected_device: Option<DeviceInfo>,
    pub chord_text: String,
    pub chord_symbols: Vec<String>,
    pub chord_feedback: Option<String>,
}

struct TunerApp {
    tuner: TunerLoop<CpalHost>,
    synth: ChordSynth,
    /// Highest frequency shown in the spectrum panel.
    spectrum_limit_hz: f32,
    chord_text: String,
    chord_feedback: Option<String>,
}

impl Default for TunerApp {
    fn default() -> Self {
        let config = load_config().unwrap_or_else(|e| {
            warn!("[MAIN] Using default settings: {:#}", e);
            TunerConfig::default()
        });
        let spectrum_limit_hz = config.capture.low_pass_cutoff_hz;
        let registry = DeviceRegistry::new(CpalHost);

        Self {
            tuner: TunerLoop::new(registry, config),
            synth: ChordSynth::new(),
            spectrum_limit_hz,
            chord_text: String::new(),
            chord_feedback: None,
        }
    }
}

fn load_config() -> anyhow::Result<TunerConfig> {
    if !Path::new(CONFIG_PATH).exists() {
        return Ok(TunerConfig::default());
    }
    let config = TunerConfig::load(CONFIG_PATH)
        .with_context(|| format!("reading {CONFIG_PATH}"))?;
    info!("[MAIN] Loaded settings from {}", CONFIG_PATH);
    Ok(config)
}

impl TunerApp {
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Connect => {
                if let Err(e) = self.tuner.connect() {
                    warn!("[MAIN] Connect failed: {}", e);
                }
            }
            Message::Disconnect => self.tuner.disconnect(),
            Message::Start => {
                if let Err(e) = self.tuner.start_selected() {
                    warn!("[MAIN] Start failed: {}", e);
                }
            }
            Message::Stop => self.tuner.stop(),
            Message::DeviceSelected(device) => {
                info!("[MAIN] Device selected: {}", device);
                if let Err(e) = self.tuner.on_device_changed(&device.id) {
                    warn!("[MAIN] Switching to {} failed: {}", device, e);
                }
            }
            Message::ChordTextChanged(text) => self.chord_text = text,
            Message::PlayChord(symbol) => {
                self.chord_feedback = Some(match self.synth.play_chord(&symbol) {
                    Ok(notes) => format!("{}: {}", symbol, notes.join(" ")),
                    Err(e) => {
                        warn!("[MAIN] Chord playback failed: {}", e);
                        e.to_string()
                    }
                });
            }
            Message::Exit => {
                info!("[MAIN] Exit requested - releasing audio...");
                self.tuner.stop();
                self.synth.stop();
                return iced::exit();
            }
            Message::Frame(_) => {
                self.tuner.tick();
            }
        }
        Task::none()
    }

    fn display_data(&self) -> AppDisplayData {
        let reading = self.tuner.reading();
        let registry = self.tuner.registry();
        let spectrum = self
            .tuner
            .spectrum()
            .map(|frame| {
                let visible = (self.spectrum_limit_hz / frame.bin_hz()) as usize;
                frame.magnitudes_db.iter().take(visible).copied().collect()
            })
            .unwrap_or_default();

        let (note_name, detected_hz, offset_hz) = match reading {
            Reading::Note(result) => (
                Some(result.note.name.clone()),
                Some(result.frequency_hz),
                Some(result.offset_hz),
            ),
            Reading::NoNote => (None, None, None),
        };

        AppDisplayData {
            status: self.tuner.status().to_string(),
            permission: registry.permission(),
            listening: self.tuner.is_listening(),
            note_name,
            detected_hz,
            offset_hz,
            spectrum,
            devices: registry.devices().to_vec(),
            selected_device: registry.selected_device_info().cloned(),
            chord_text: self.chord_text.clone(),
            chord_symbols: find_chord_symbols(&self.chord_text)
                .into_iter()
                .map(str::to_string)
                .collect(),
            chord_feedback: self.chord_feedback.clone(),
        }
    }

    fn view(&self) -> iced::Element<'_, Message> {
        create_main_view(&self.display_data())
    }

    /// Redraw-driven ticks while listening; nothing otherwise.
    fn subscription(&self) -> Subscription<Message> {
        if self.tuner.is_listening() {
            iced::window::frames().map(Message::Frame)
        } else {
            Subscription::none()
        }
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}
