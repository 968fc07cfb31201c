//! # Capture Session Module
//!
//! Owns one open audio pipeline: input stream, low-pass conditioning
//! filter and spectrum analyser. The hardware handles exist only inside
//! the `Open` state, so a half-connected pipeline cannot be represented.
//!
//! `open` and `close` take `&mut self`: a close can never interleave
//! with an open that is still acquiring the device.

use crossbeam_channel::{Receiver, TryRecvError};
use log::{debug, info, trace, warn};

use crate::audio::{AudioHost, InputStream};
use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::fft::{Analyser, SpectrumFrame};
use crate::filter::LowPassFilter;

/// Chunks buffered between the audio callback and the next frame pull.
const SAMPLE_QUEUE_CHUNKS: usize = 256;
/// Stream failures kept until the next frame pull; the first one is enough.
const ERROR_QUEUE_LEN: usize = 4;

/// Externally observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSessionState {
    Closed,
    Open,
}

/// The hardware pipeline of an open session.
pub struct ActiveCapture<S: InputStream> {
    stream: S,
    samples: Receiver<Vec<f32>>,
    errors: Receiver<CaptureError>,
    filter: LowPassFilter,
    analyser: Analyser,
    device_id: Option<String>,
}

impl<S: InputStream> ActiveCapture<S> {
    /// Pulls the latest magnitude spectrum.
    ///
    /// Everything the input delivered since the previous call goes through
    /// the filter into the analyser window before analysis.
    ///
    /// Fails once the stream has reported an error or stopped delivering
    /// for good; the window would otherwise be re-analysed unchanged.
    pub fn current_spectrum(&mut self) -> Result<SpectrumFrame, CaptureError> {
        if let Ok(error) = self.errors.try_recv() {
            warn!("[CAPTURE] Input stream failed: {}", error);
            return Err(error);
        }

        let mut drained = 0usize;
        loop {
            match self.samples.try_recv() {
                Ok(mut chunk) => {
                    self.filter.process(&mut chunk);
                    self.analyser.push_samples(&chunk);
                    drained += chunk.len();
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("[CAPTURE] Input channel disconnected");
                    return Err(CaptureError::DeviceUnavailable(
                        self.device_id.as_deref().unwrap_or("default input").to_string(),
                    ));
                }
            }
        }
        trace!("[CAPTURE] Drained {} samples", drained);
        Ok(self.analyser.frequency_data())
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn sample_rate(&self) -> u32 {
        self.stream.sample_rate()
    }

    fn shutdown(mut self) {
        if let Err(e) = self.stream.stop() {
            warn!("[CAPTURE] Error stopping input stream: {}", e);
        }
        // Stream, receiver, filter and analyser are released here.
        drop(self);
    }
}

enum Pipeline<S: InputStream> {
    Closed,
    Open(ActiveCapture<S>),
}

/// A single listening session against an [`AudioHost`].
pub struct CaptureSession<H: AudioHost> {
    host: H,
    config: CaptureConfig,
    pipeline: Pipeline<H::Stream>,
}

impl<H: AudioHost> CaptureSession<H> {
    pub fn new(host: H, config: CaptureConfig) -> Self {
        Self {
            host,
            config,
            pipeline: Pipeline::Closed,
        }
    }

    pub fn state(&self) -> CaptureSessionState {
        match self.pipeline {
            Pipeline::Closed => CaptureSessionState::Closed,
            Pipeline::Open(_) => CaptureSessionState::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.pipeline, Pipeline::Open(_))
    }

    /// Device the open pipeline is bound to (`None` when closed or on the default input).
    pub fn device_id(&self) -> Option<&str> {
        match &self.pipeline {
            Pipeline::Open(active) => active.device_id(),
            Pipeline::Closed => None,
        }
    }

    /// The open pipeline, if any.
    pub fn active(&mut self) -> Option<&mut ActiveCapture<H::Stream>> {
        match &mut self.pipeline {
            Pipeline::Open(active) => Some(active),
            Pipeline::Closed => None,
        }
    }

    /// Opens the input `device_id` (default input when `None`) and wires it
    /// through the filter into the analyser.
    ///
    /// Any pipeline that is already open is released first. On failure the
    /// session stays `Closed`.
    pub fn open(&mut self, device_id: Option<&str>) -> Result<(), CaptureError> {
        self.close();
        self.config.validate()?;

        let (sample_tx, sample_rx) = crossbeam_channel::bounded(SAMPLE_QUEUE_CHUNKS);
        let (error_tx, error_rx) = crossbeam_channel::bounded(ERROR_QUEUE_LEN);
        let stream = self.host.open_input(device_id, sample_tx, error_tx)?;
        let sample_rate = stream.sample_rate() as f32;

        // The stream is dropped (and released) if the rest of the wiring fails.
        let filter = LowPassFilter::new(sample_rate, self.config.low_pass_cutoff_hz)?;
        let analyser = Analyser::new(sample_rate, &self.config)?;

        info!(
            "[CAPTURE] Session open on {} at {} Hz (fft {}, low-pass {} Hz)",
            device_id.unwrap_or("default input"),
            sample_rate,
            analyser.fft_size(),
            filter.cutoff_hz()
        );

        self.pipeline = Pipeline::Open(ActiveCapture {
            stream,
            samples: sample_rx,
            errors: error_rx,
            filter,
            analyser,
            device_id: device_id.map(str::to_string),
        });
        Ok(())
    }

    /// Releases the pipeline. Safe to call in any state, any number of times.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.pipeline, Pipeline::Closed) {
            Pipeline::Open(active) => {
                info!(
                    "[CAPTURE] Closing session on {}",
                    active.device_id().unwrap_or("default input")
                );
                active.shutdown();
            }
            Pipeline::Closed => debug!("[CAPTURE] Close requested on a closed session"),
        }
    }
}

impl<H: AudioHost> Drop for CaptureSession<H> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock::MockHost;

    fn session(host: &MockHost) -> CaptureSession<MockHost> {
        CaptureSession::new(host.clone(), CaptureConfig::default())
    }

    #[test]
    fn close_is_idempotent() {
        let host = MockHost::with_devices(&["mic"]);
        let mut session = session(&host);

        session.close();
        session.close();
        assert_eq!(session.state(), CaptureSessionState::Closed);

        session.open(Some("mic")).unwrap();
        session.close();
        session.close();
        assert_eq!(session.state(), CaptureSessionState::Closed);
        assert_eq!(host.open_streams(), 0);
        assert_eq!(host.stop_calls(), 1);
    }

    #[test]
    fn open_binds_requested_device() {
        let host = MockHost::with_devices(&["a", "b"]);
        let mut session = session(&host);
        session.open(Some("b")).unwrap();
        assert_eq!(session.state(), CaptureSessionState::Open);
        assert_eq!(session.device_id(), Some("b"));
        assert_eq!(session.active().map(|a| a.sample_rate()), Some(48_000));
    }

    #[test]
    fn reopening_releases_previous_stream_first() {
        let host = MockHost::with_devices(&["a", "b"]);
        let mut session = session(&host);
        session.open(Some("a")).unwrap();
        session.open(Some("b")).unwrap();
        assert_eq!(host.max_open_streams(), 1);
        assert_eq!(host.open_streams(), 1);
        assert_eq!(session.device_id(), Some("b"));
    }

    #[test]
    fn failed_open_stays_closed() {
        let host = MockHost::with_devices(&["a"]);
        let mut session = session(&host);

        assert_eq!(
            session.open(Some("gone")),
            Err(CaptureError::DeviceUnavailable("gone".to_string()))
        );
        assert_eq!(session.state(), CaptureSessionState::Closed);

        host.deny_access(true);
        assert_eq!(session.open(None), Err(CaptureError::PermissionDenied));
        assert_eq!(session.state(), CaptureSessionState::Closed);
        assert_eq!(host.open_streams(), 0);
    }

    #[test]
    fn invalid_filter_releases_acquired_stream() {
        let host = MockHost::with_devices(&["a"]);
        let config = CaptureConfig {
            low_pass_cutoff_hz: 30_000.0,
            ..CaptureConfig::default()
        };
        let mut session = CaptureSession::new(host.clone(), config);
        assert!(matches!(
            session.open(Some("a")),
            Err(CaptureError::Configuration(_))
        ));
        assert_eq!(session.state(), CaptureSessionState::Closed);
        assert_eq!(host.open_streams(), 0);
    }

    #[test]
    fn spectrum_is_only_reachable_while_open() {
        let host = MockHost::with_devices(&["a"]);
        let mut session = session(&host);
        assert!(session.active().is_none());

        session.open(None).unwrap();
        host.feed(&[0.0; 4096]);
        let frame = session.active().unwrap().current_spectrum().unwrap();
        assert_eq!(frame.bin_count, 2048);
        assert_eq!(frame.fft_size, 4096);
        assert_eq!(frame.sample_rate_hz, 48_000.0);

        session.close();
        assert!(session.active().is_none());
    }

    #[test]
    fn stream_failure_surfaces_on_next_pull() {
        let host = MockHost::with_devices(&["a"]);
        let mut session = session(&host);
        session.open(Some("a")).unwrap();
        host.feed(&[0.0; 4096]);
        assert!(session.active().unwrap().current_spectrum().is_ok());

        host.fail_stream(CaptureError::DeviceUnavailable("a".to_string()));
        assert_eq!(
            session.active().unwrap().current_spectrum(),
            Err(CaptureError::DeviceUnavailable("a".to_string()))
        );
    }

    #[test]
    fn torn_down_stream_is_reported_after_draining() {
        let host = MockHost::with_devices(&["a"]);
        let mut session = session(&host);
        session.open(None).unwrap();
        host.feed(&[0.0; 1024]);
        host.drop_sample_sink();
        assert_eq!(
            session.active().unwrap().current_spectrum(),
            Err(CaptureError::DeviceUnavailable("default input".to_string()))
        );
    }

    #[test]
    fn dropping_the_session_releases_hardware() {
        let host = MockHost::with_devices(&["a"]);
        {
            let mut session = session(&host);
            session.open(None).unwrap();
            assert_eq!(host.open_streams(), 1);
        }
        assert_eq!(host.open_streams(), 0);
    }
}
