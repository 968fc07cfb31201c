//! # Tuner Loop Module
//!
//! Drives capture → pitch estimation → note matching once per display
//! frame and owns the start/stop/device-change transitions.
//!
//! ## Invariants
//! - At most one capture session is open. `start` always closes the
//!   current session before opening the next one.
//! - No frame runs against a closed session: the spectrum is reachable
//!   only while the session is open, and `stop` cancels the frame loop
//!   before closing.
//! - Dropping the tuner stops it, so the input is released when the
//!   owning view goes away.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, trace, warn};

use crate::audio::AudioHost;
use crate::config::{PitchConfig, TunerConfig};
use crate::devices::{DeviceRegistry, PermissionState};
use crate::error::CaptureError;
use crate::fft::SpectrumFrame;
use crate::pitch;
use crate::session::CaptureSession;
use crate::tuning::{NoteTable, TuningResult};

/// Whether the tuner is actively analysing input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunerState {
    Stopped,
    Listening,
}

/// The latest published tuning feedback.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// No confident pitch in the current frame (or not listening).
    NoNote,
    Note(TuningResult),
}

impl Reading {
    pub fn note_name(&self) -> Option<&str> {
        match self {
            Reading::Note(result) => Some(&result.note.name),
            Reading::NoNote => None,
        }
    }

    pub fn offset_hz(&self) -> f32 {
        match self {
            Reading::Note(result) => result.offset_hz,
            Reading::NoNote => 0.0,
        }
    }
}

/// Human-readable tuner status for the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum TunerStatus {
    /// Waiting for the microphone to be connected.
    Disconnected,
    /// Connected and stopped.
    Ready,
    Listening,
    /// The last start attempt failed; the UI should offer a retry.
    Failed(CaptureError),
}

impl fmt::Display for TunerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunerStatus::Disconnected => f.write_str("Connect your microphone to start tuning."),
            TunerStatus::Ready => f.write_str("Tuner stopped. Tap \"Start Tuner\" to begin!"),
            TunerStatus::Listening => f.write_str("Listening..."),
            TunerStatus::Failed(error) => write!(f, "{error}"),
        }
    }
}

/// Cancellation flag for a running frame loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The host's "run before the next repaint" primitive.
pub trait FrameScheduler {
    /// Blocks until the next frame is due.
    fn wait_for_frame(&mut self);
}

/// Real-time tuner pipeline and its lifecycle.
pub struct TunerLoop<H: AudioHost> {
    registry: DeviceRegistry<H>,
    session: CaptureSession<H>,
    pitch_config: PitchConfig,
    table: NoteTable,
    state: TunerState,
    reading: Reading,
    spectrum: Option<SpectrumFrame>,
    status: TunerStatus,
    cancel: Option<CancelToken>,
}

impl<H: AudioHost> TunerLoop<H> {
    pub fn new(registry: DeviceRegistry<H>, config: TunerConfig) -> Self {
        let session = CaptureSession::new(registry.host().clone(), config.capture);
        let status = match registry.permission() {
            PermissionState::Granted => TunerStatus::Ready,
            PermissionState::Prompt => TunerStatus::Disconnected,
            PermissionState::Denied => TunerStatus::Failed(CaptureError::PermissionDenied),
        };
        Self {
            registry,
            session,
            pitch_config: config.pitch,
            table: NoteTable::standard().clone(),
            state: TunerState::Stopped,
            reading: Reading::NoNote,
            spectrum: None,
            status,
            cancel: None,
        }
    }

    /// Replaces the built-in note table.
    pub fn with_note_table(mut self, table: NoteTable) -> Self {
        self.table = table;
        self
    }

    pub fn state(&self) -> TunerState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == TunerState::Listening
    }

    pub fn reading(&self) -> &Reading {
        &self.reading
    }

    /// Spectrum analysed by the most recent tick while listening.
    pub fn spectrum(&self) -> Option<&SpectrumFrame> {
        self.spectrum.as_ref()
    }

    pub fn status(&self) -> &TunerStatus {
        &self.status
    }

    pub fn registry(&self) -> &DeviceRegistry<H> {
        &self.registry
    }

    pub fn session(&self) -> &CaptureSession<H> {
        &self.session
    }

    /// Token of the current listening run; `None` while stopped.
    pub fn cancel_token(&self) -> Option<CancelToken> {
        self.cancel.clone()
    }

    /// Asks for microphone access and lists devices.
    pub fn connect(&mut self) -> Result<(), CaptureError> {
        match self.registry.connect() {
            Ok(_) => {
                if !self.is_listening() {
                    self.status = TunerStatus::Ready;
                }
                Ok(())
            }
            Err(e) => {
                self.status = TunerStatus::Failed(e.clone());
                Err(e)
            }
        }
    }

    /// Stops the tuner and forgets the device list and permission.
    pub fn disconnect(&mut self) {
        self.stop();
        self.registry.disconnect();
        self.status = TunerStatus::Disconnected;
    }

    /// Starts listening on `device_id` (default input when `None`).
    ///
    /// Any running session is fully released before the new one opens, so
    /// repeated starts leave exactly one session, bound to the last device.
    pub fn start(&mut self, device_id: Option<&str>) -> Result<(), CaptureError> {
        if self.registry.permission() == PermissionState::Denied {
            debug!("[TUNER] Start refused: microphone permission denied");
            self.halt();
            self.status = TunerStatus::Failed(CaptureError::PermissionDenied);
            return Err(CaptureError::PermissionDenied);
        }

        self.halt();

        if let Err(e) = self.pitch_config.validate() {
            warn!("[TUNER] Refusing to start: {}", e);
            self.fail(e.clone());
            return Err(e);
        }

        match self.session.open(device_id) {
            Ok(()) => {
                self.state = TunerState::Listening;
                self.status = TunerStatus::Listening;
                self.cancel = Some(CancelToken::new());
                info!(
                    "[TUNER] Listening on {}",
                    device_id.unwrap_or("default input")
                );
                Ok(())
            }
            Err(e) => {
                warn!("[TUNER] Error starting audio: {}", e);
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Starts on the device currently selected in the registry.
    pub fn start_selected(&mut self) -> Result<(), CaptureError> {
        let device_id = self.registry.selected_device().map(str::to_string);
        self.start(device_id.as_deref())
    }

    /// Cancels the frame loop, releases the input and clears the reading.
    pub fn stop(&mut self) {
        let was_listening = self.is_listening();
        self.halt();
        if was_listening {
            info!("[TUNER] Stopped");
        }
        self.status = match self.registry.permission() {
            PermissionState::Granted => TunerStatus::Ready,
            PermissionState::Prompt => TunerStatus::Disconnected,
            PermissionState::Denied => TunerStatus::Failed(CaptureError::PermissionDenied),
        };
    }

    /// Records a new device choice and, when listening, moves to it.
    pub fn on_device_changed(&mut self, device_id: &str) -> Result<(), CaptureError> {
        self.registry.select_device(device_id);
        if self.is_listening() {
            self.stop();
            self.start(Some(device_id))?;
        }
        Ok(())
    }

    /// Runs one frame of the pipeline and publishes the result.
    pub fn tick(&mut self) -> &Reading {
        if self.state != TunerState::Listening {
            return &self.reading;
        }
        let Some(active) = self.session.active() else {
            warn!("[TUNER] Listening without an open session; stopping");
            self.stop();
            return &self.reading;
        };

        let frame = match active.current_spectrum() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("[TUNER] Capture failed while listening: {}", e);
                self.fail(e);
                return &self.reading;
            }
        };
        self.reading = match pitch::estimate_frame(&frame, &self.pitch_config) {
            Some(frequency) => Reading::Note(self.table.match_frequency(frequency)),
            None => Reading::NoNote,
        };
        self.spectrum = Some(frame);
        trace!("[TUNER] {:?}", self.reading);
        &self.reading
    }

    /// Ticks once per frame of `scheduler` until the run is cancelled or
    /// the capture fails, then stops the tuner.
    ///
    /// Returns immediately when not listening.
    pub fn run<S, F>(&mut self, scheduler: &mut S, mut publish: F)
    where
        S: FrameScheduler,
        F: FnMut(&Reading),
    {
        let Some(token) = self.cancel.clone() else {
            return;
        };
        while !token.is_cancelled() && self.is_listening() {
            scheduler.wait_for_frame();
            if token.is_cancelled() {
                break;
            }
            publish(self.tick());
        }
        // A failed tick has already stopped and set the failure status.
        if self.is_listening() {
            self.stop();
        }
    }

    /// Releases everything and reports `error`, so the next start retries
    /// cleanly (default input after a lost device).
    fn fail(&mut self, error: CaptureError) {
        self.halt();
        match &error {
            CaptureError::PermissionDenied => self.registry.mark_denied(),
            CaptureError::DeviceUnavailable(_) => self.registry.clear_selection(),
            _ => {}
        }
        self.status = TunerStatus::Failed(error);
    }

    /// Stops the loop and session without touching the status message.
    fn halt(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.session.close();
        self.reading = Reading::NoNote;
        self.spectrum = None;
        self.state = TunerState::Stopped;
    }
}

impl<H: AudioHost> Drop for TunerLoop<H> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock::MockHost;
    use crate::session::CaptureSessionState;

    fn connected(host: &MockHost, config: TunerConfig) -> TunerLoop<MockHost> {
        let mut registry = DeviceRegistry::new(host.clone());
        registry.connect().unwrap();
        TunerLoop::new(registry, config)
    }

    /// Harmonic-rich tone whose fundamental sits exactly on an analysis bin.
    fn harmonic_tone(bin: usize, sample_rate: f32, len: usize) -> Vec<f32> {
        let f0 = bin as f32 * sample_rate / 4096.0;
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate;
                (1..=5)
                    .map(|h| 0.2 * (std::f32::consts::TAU * f0 * h as f32 * t).sin())
                    .sum::<f32>()
            })
            .collect()
    }

    fn sensitive() -> TunerConfig {
        let mut config = TunerConfig::default();
        config.pitch.silence_threshold_db = -300.0;
        config
    }

    #[test]
    fn start_then_stop() {
        let host = MockHost::with_devices(&["a"]);
        let mut tuner = connected(&host, TunerConfig::default());
        assert_eq!(*tuner.status(), TunerStatus::Ready);

        tuner.start_selected().unwrap();
        assert_eq!(tuner.state(), TunerState::Listening);
        assert_eq!(*tuner.status(), TunerStatus::Listening);
        assert_eq!(tuner.session().device_id(), Some("a"));
        assert!(tuner.cancel_token().is_some());

        tuner.stop();
        assert_eq!(tuner.state(), TunerState::Stopped);
        assert_eq!(*tuner.reading(), Reading::NoNote);
        assert_eq!(tuner.session().state(), CaptureSessionState::Closed);
        assert!(tuner.cancel_token().is_none());
        assert_eq!(host.open_streams(), 0);
    }

    #[test]
    fn back_to_back_starts_keep_one_session() {
        let host = MockHost::with_devices(&["a", "b"]);
        let mut tuner = connected(&host, TunerConfig::default());

        tuner.start(Some("a")).unwrap();
        tuner.start(Some("b")).unwrap();

        assert_eq!(host.max_open_streams(), 1);
        assert_eq!(host.open_streams(), 1);
        assert_eq!(tuner.session().device_id(), Some("b"));
        assert_eq!(tuner.state(), TunerState::Listening);
    }

    #[test]
    fn start_while_denied_never_touches_hardware() {
        let host = MockHost::with_devices(&["a"]);
        let mut registry = DeviceRegistry::new(host.clone());
        registry.mark_denied();
        let mut tuner = TunerLoop::new(registry, TunerConfig::default());

        assert_eq!(tuner.start(Some("a")), Err(CaptureError::PermissionDenied));
        assert!(host.open_calls().is_empty());
        assert_eq!(tuner.state(), TunerState::Stopped);
        assert_eq!(
            tuner.status().to_string(),
            "Microphone access denied. Please check permissions."
        );
    }

    #[test]
    fn permission_failure_during_start_marks_registry_denied() {
        let host = MockHost::with_devices(&["a"]);
        let mut tuner = connected(&host, TunerConfig::default());
        host.deny_access(true);

        assert_eq!(tuner.start(None), Err(CaptureError::PermissionDenied));
        assert_eq!(tuner.registry().permission(), PermissionState::Denied);
        assert_eq!(tuner.state(), TunerState::Stopped);
        assert!(matches!(tuner.status(), TunerStatus::Failed(_)));
    }

    #[test]
    fn invalid_pitch_settings_refuse_to_start() {
        let host = MockHost::with_devices(&["a"]);
        let mut config = TunerConfig::default();
        config.pitch.harmonics = 0;
        let mut tuner = connected(&host, config);

        assert!(matches!(
            tuner.start(None),
            Err(CaptureError::Configuration(_))
        ));
        assert!(host.open_calls().is_empty());
        assert_eq!(tuner.state(), TunerState::Stopped);
    }

    #[test]
    fn unplugged_device_falls_back_to_default_on_retry() {
        let host = MockHost::with_devices(&["a", "b"]);
        let mut tuner = connected(&host, TunerConfig::default());
        tuner.on_device_changed("b").unwrap();
        host.unplug("b");

        assert_eq!(
            tuner.start_selected(),
            Err(CaptureError::DeviceUnavailable("b".to_string()))
        );
        assert_eq!(tuner.state(), TunerState::Stopped);
        assert_eq!(tuner.registry().selected_device(), None);

        tuner.start_selected().unwrap();
        assert_eq!(host.open_calls().last(), Some(&None));
        assert_eq!(tuner.state(), TunerState::Listening);
    }

    #[test]
    fn device_change_while_listening_switches_sessions() {
        let host = MockHost::with_devices(&["a", "b"]);
        let mut tuner = connected(&host, TunerConfig::default());
        tuner.start(Some("a")).unwrap();

        tuner.on_device_changed("b").unwrap();

        assert_eq!(tuner.session().device_id(), Some("b"));
        assert_eq!(host.max_open_streams(), 1);
        assert_eq!(tuner.registry().selected_device(), Some("b"));
    }

    #[test]
    fn device_change_while_stopped_only_records_choice() {
        let host = MockHost::with_devices(&["a", "b"]);
        let mut tuner = connected(&host, TunerConfig::default());
        tuner.on_device_changed("b").unwrap();
        assert!(host.open_calls().is_empty());
        assert_eq!(tuner.registry().selected_device(), Some("b"));
    }

    #[test]
    fn tick_reports_note_for_harmonic_tone() {
        let host = MockHost::with_devices(&["a"]);
        let mut tuner = connected(&host, sensitive());
        tuner.start(None).unwrap();

        // Bin 38 at 48 kHz is ~445.3 Hz.
        host.feed(&harmonic_tone(38, 48_000.0, 8192));
        let reading = tuner.tick().clone();

        assert_eq!(reading.note_name(), Some("A4"));
        assert!(reading.offset_hz() > 0.0 && reading.offset_hz() < 6.0);
        assert_eq!(tuner.spectrum().map(|s| s.bin_count), Some(2048));

        tuner.stop();
        assert!(tuner.spectrum().is_none());
    }

    #[test]
    fn tick_reports_no_note_for_silence() {
        let host = MockHost::with_devices(&["a"]);
        let mut tuner = connected(&host, TunerConfig::default());
        tuner.start(None).unwrap();
        host.feed(&[0.0; 8192]);
        assert_eq!(*tuner.tick(), Reading::NoNote);
    }

    #[test]
    fn tick_is_inert_while_stopped() {
        let host = MockHost::with_devices(&["a"]);
        let mut tuner = connected(&host, sensitive());
        assert_eq!(*tuner.tick(), Reading::NoNote);
        assert!(host.open_calls().is_empty());
    }

    #[test]
    fn lost_device_while_listening_stops_with_failure() {
        let host = MockHost::with_devices(&["a"]);
        let mut tuner = connected(&host, sensitive());
        tuner.start_selected().unwrap();
        host.feed(&harmonic_tone(38, 48_000.0, 8192));
        assert_eq!(tuner.tick().note_name(), Some("A4"));

        host.fail_stream(CaptureError::DeviceUnavailable("a".to_string()));
        assert_eq!(*tuner.tick(), Reading::NoNote);

        assert_eq!(tuner.state(), TunerState::Stopped);
        assert_eq!(
            *tuner.status(),
            TunerStatus::Failed(CaptureError::DeviceUnavailable("a".to_string()))
        );
        assert!(tuner.spectrum().is_none());
        assert_eq!(tuner.registry().selected_device(), None);
        assert_eq!(host.open_streams(), 0);
    }

    #[test]
    fn torn_down_stream_stops_instead_of_repeating_last_note() {
        let host = MockHost::with_devices(&["a"]);
        let mut tuner = connected(&host, sensitive());
        tuner.start(None).unwrap();
        host.feed(&harmonic_tone(38, 48_000.0, 8192));
        assert_eq!(tuner.tick().note_name(), Some("A4"));

        host.drop_sample_sink();
        tuner.tick();
        assert_eq!(tuner.state(), TunerState::Stopped);
        assert!(matches!(
            tuner.status(),
            TunerStatus::Failed(CaptureError::DeviceUnavailable(_))
        ));
        assert_eq!(*tuner.tick(), Reading::NoNote);
    }

    #[test]
    fn run_ends_when_the_stream_fails() {
        let host = MockHost::with_devices(&["a"]);
        let mut tuner = connected(&host, TunerConfig::default());
        tuner.start(None).unwrap();
        host.fail_stream(CaptureError::Backend("xrun".to_string()));

        let mut scheduler = CountingScheduler {
            frames: 0,
            cancel_after: usize::MAX,
            token: None,
        };
        tuner.run(&mut scheduler, |_| {});

        assert_eq!(scheduler.frames, 1);
        assert_eq!(
            *tuner.status(),
            TunerStatus::Failed(CaptureError::Backend("xrun".to_string()))
        );
        assert_eq!(host.open_streams(), 0);
    }

    struct CountingScheduler {
        frames: usize,
        cancel_after: usize,
        token: Option<CancelToken>,
    }

    impl FrameScheduler for CountingScheduler {
        fn wait_for_frame(&mut self) {
            self.frames += 1;
            if self.frames > self.cancel_after {
                if let Some(token) = &self.token {
                    token.cancel();
                }
            }
        }
    }

    #[test]
    fn run_ticks_until_cancelled_then_releases_input() {
        let host = MockHost::with_devices(&["a"]);
        let mut tuner = connected(&host, TunerConfig::default());
        tuner.start(None).unwrap();

        let mut scheduler = CountingScheduler {
            frames: 0,
            cancel_after: 3,
            token: tuner.cancel_token(),
        };
        let mut published = 0;
        tuner.run(&mut scheduler, |_| published += 1);

        assert_eq!(published, 3);
        assert_eq!(tuner.state(), TunerState::Stopped);
        assert_eq!(host.open_streams(), 0);
    }

    #[test]
    fn run_without_start_returns_immediately() {
        let host = MockHost::with_devices(&["a"]);
        let mut tuner = connected(&host, TunerConfig::default());
        let mut scheduler = CountingScheduler {
            frames: 0,
            cancel_after: usize::MAX,
            token: None,
        };
        tuner.run(&mut scheduler, |_| {});
        assert_eq!(scheduler.frames, 0);
    }

    #[test]
    fn stop_cancels_outstanding_token() {
        let host = MockHost::with_devices(&["a"]);
        let mut tuner = connected(&host, TunerConfig::default());
        tuner.start(None).unwrap();
        let token = tuner.cancel_token().unwrap();
        tuner.stop();
        assert!(token.is_cancelled());
    }

    #[test]
    fn dropping_the_tuner_releases_input() {
        let host = MockHost::with_devices(&["a"]);
        {
            let mut tuner = connected(&host, TunerConfig::default());
            tuner.start(None).unwrap();
            assert_eq!(host.open_streams(), 1);
        }
        assert_eq!(host.open_streams(), 0);
    }

    #[test]
    fn disconnect_returns_to_prompt() {
        let host = MockHost::with_devices(&["a"]);
        let mut tuner = connected(&host, TunerConfig::default());
        tuner.start(None).unwrap();
        tuner.disconnect();
        assert_eq!(tuner.registry().permission(), PermissionState::Prompt);
        assert_eq!(*tuner.status(), TunerStatus::Disconnected);
        assert_eq!(host.open_streams(), 0);
    }
}
