//! # Audio Capture Module
//!
//! The boundary between the tuner and the host's audio subsystem.
//!
//! [`AudioHost`] covers device enumeration, access checks and opening an
//! input stream; [`CpalHost`] implements it with CPAL (Cross-Platform
//! Audio Library). Captured audio is down-mixed to mono and forwarded in
//! chunks over a crossbeam channel to whoever owns the receiving end.
//!
//! ## Features
//! - Device selection by id with default-device fallback
//! - Any channel count, `f32`/`i16`/`u16` sample formats
//! - Non-blocking delivery from the audio callback (full channel drops data)
//! - Stream failures reported on a second channel so the owner can stop

use std::fmt;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use log::{debug, error, info, warn};

use crate::error::CaptureError;

/// An input device as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceInfo {
    /// Stable identifier used to reopen the device.
    pub id: String,
    /// Human-readable label.
    pub label: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.label.is_empty() {
            let short: String = self.id.chars().take(6).collect();
            write!(f, "Mic {short}")
        } else {
            f.write_str(&self.label)
        }
    }
}

/// A live hardware input stream. Dropping it releases the device.
pub trait InputStream {
    /// Sample rate the stream delivers, in Hz.
    fn sample_rate(&self) -> u32;

    /// Halts delivery from the hardware.
    fn stop(&mut self) -> Result<(), CaptureError>;
}

/// The host's device-enumeration and audio-input facilities.
pub trait AudioHost: Clone {
    type Stream: InputStream;

    /// Lists the input devices currently available.
    fn input_devices(&self) -> Result<Vec<DeviceInfo>, CaptureError>;

    /// Checks (or asks for) access to audio input.
    fn request_access(&self) -> Result<(), CaptureError>;

    /// Opens `device_id`, or the default input when `None`, and starts
    /// forwarding mono sample chunks to `sink`.
    ///
    /// Failures after the stream is running (device unplugged, backend
    /// fault) are sent to `errors`.
    fn open_input(
        &self,
        device_id: Option<&str>,
        sink: Sender<Vec<f32>>,
        errors: Sender<CaptureError>,
    ) -> Result<Self::Stream, CaptureError>;
}

/// [`AudioHost`] backed by the platform's default CPAL host.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalHost;

/// A running CPAL input stream.
pub struct CpalStream {
    stream: cpal::Stream,
    sample_rate: u32,
}

impl InputStream for CpalStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.stream
            .pause()
            .map_err(|e| CaptureError::Backend(e.to_string()))
    }
}

impl CpalHost {
    fn find_device(&self, device_id: Option<&str>) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();
        match device_id {
            Some(id) => host
                .input_devices()
                .map_err(|e| CaptureError::Backend(e.to_string()))?
                .find(|device| device.name().map(|name| name == id).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceUnavailable(id.to_string())),
            None => host
                .default_input_device()
                .ok_or_else(|| CaptureError::DeviceUnavailable("default input".to_string())),
        }
    }
}

impl AudioHost for CpalHost {
    type Stream = CpalStream;

    fn input_devices(&self) -> Result<Vec<DeviceInfo>, CaptureError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| CaptureError::Backend(e.to_string()))?
            .filter_map(|device| match device.name() {
                Ok(name) => Some(DeviceInfo {
                    id: name.clone(),
                    label: name,
                }),
                Err(e) => {
                    warn!("[AUDIO] Skipping input device without a name: {}", e);
                    None
                }
            })
            .collect::<Vec<_>>();
        debug!("[AUDIO] Found {} input device(s)", devices.len());
        Ok(devices)
    }

    fn request_access(&self) -> Result<(), CaptureError> {
        // Desktop hosts have no explicit prompt; reading the default input
        // configuration fails when the OS withholds the microphone.
        let device = self.find_device(None)?;
        match device.default_input_config() {
            Ok(_) => Ok(()),
            Err(cpal::DefaultStreamConfigError::DeviceNotAvailable) => Err(
                CaptureError::DeviceUnavailable("default input".to_string()),
            ),
            Err(e) => {
                warn!("[AUDIO] Input configuration refused: {}", e);
                Err(CaptureError::PermissionDenied)
            }
        }
    }

    fn open_input(
        &self,
        device_id: Option<&str>,
        sink: Sender<Vec<f32>>,
        errors: Sender<CaptureError>,
    ) -> Result<CpalStream, CaptureError> {
        let device = self.find_device(device_id)?;
        info!(
            "[AUDIO] Using audio input device: {}",
            device.name().unwrap_or_else(|_| "<unnamed>".to_string())
        );

        let supported = device.default_input_config().map_err(|e| match e {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => {
                CaptureError::DeviceUnavailable(device_id.unwrap_or("default input").to_string())
            }
            other => {
                warn!("[AUDIO] Input configuration refused: {}", other);
                CaptureError::PermissionDenied
            }
        })?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels as usize;
        info!(
            "[AUDIO] Selected {} Hz, {} channel(s), {:?}",
            sample_rate, channels, sample_format
        );

        let sinks = (sink, errors);
        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_mono_stream::<f32>(&device, &config, channels, sinks),
            cpal::SampleFormat::I16 => build_mono_stream::<i16>(&device, &config, channels, sinks),
            cpal::SampleFormat::U16 => build_mono_stream::<u16>(&device, &config, channels, sinks),
            other => Err(CaptureError::Backend(format!(
                "unsupported sample format {other:?}"
            ))),
        }?;

        stream
            .play()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;

        Ok(CpalStream {
            stream,
            sample_rate,
        })
    }
}

/// Maps a runtime stream error onto the capture error the tuner reports.
fn stream_error(err: cpal::StreamError, device_name: &str) -> CaptureError {
    match err {
        cpal::StreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable(device_name.to_string())
        }
        other => CaptureError::Backend(other.to_string()),
    }
}

/// Builds an input stream that averages interleaved channels into mono chunks.
fn build_mono_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    (sink, errors): (Sender<Vec<f32>>, Sender<CaptureError>),
) -> Result<cpal::Stream, CaptureError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let device_name = device.name().unwrap_or_else(|_| "input".to_string());
    let err_fn = move |err: cpal::StreamError| {
        error!("[AUDIO] An error occurred on the audio stream: {}", err);
        let _ = errors.try_send(stream_error(err, &device_name));
    };
    let channels = channels.max(1);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let chunk: Vec<f32> = data
                    .chunks(channels)
                    .map(|frame| {
                        frame
                            .iter()
                            .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                            .sum::<f32>()
                            / frame.len() as f32
                    })
                    .collect();
                // Send the chunk, ignoring errors if the channel is full.
                let _ = sink.try_send(chunk);
            },
            err_fn,
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => CaptureError::DeviceUnavailable(
                device.name().unwrap_or_else(|_| "input".to_string()),
            ),
            other => CaptureError::Backend(other.to_string()),
        })
}
