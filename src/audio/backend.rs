use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AudioConfig, BackendKind};

/// Fixed capture rate for the microphone
pub const INPUT_SAMPLE_RATE: u32 = 16000;

/// Playback rate used until a session negotiates another one
pub const DEFAULT_PLAYBACK_RATE: u32 = 16000;

/// Samples per captured frame
pub const FRAME_SIZE: usize = 1024;

/// Both directions are mono
pub const CHANNELS: u16 = 1;

/// One frame of 16-bit signed mono PCM
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, mono)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0; len], sample_rate)
    }

    /// Decode little-endian PCM bytes. A trailing odd byte is ignored.
    pub fn from_pcm_bytes(bytes: &[u8], sample_rate: u32) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Self::new(samples, sample_rate)
    }

    /// Encode as little-endian PCM bytes
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Wall-clock length of the frame
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// An input device as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub id: u32,
    pub name: String,
}

/// Parameters for opening a capture stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureParams {
    /// Backend device id, `None` for the backend default
    pub device_id: Option<u32>,
    pub sample_rate: u32,
    pub frame_size: usize,
}

impl CaptureParams {
    pub fn with_default_device(self) -> Self {
        Self {
            device_id: None,
            ..self
        }
    }
}

/// Microphone side of a device
#[async_trait::async_trait]
pub trait CaptureStream: Send {
    /// Block until `frame_size` samples are available
    async fn read(&mut self, frame_size: usize) -> Result<AudioFrame>;

    async fn stop(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    fn is_active(&self) -> bool;
}

/// Speaker side of a device
#[async_trait::async_trait]
pub trait PlaybackStream: Send {
    async fn write(&mut self, frame: &AudioFrame) -> Result<()>;

    async fn stop(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    fn is_active(&self) -> bool;

    /// Rate the stream actually runs at
    fn sample_rate(&self) -> u32;
}

/// Audio device backend
///
/// Implementations:
/// - WAV: capture from a file paced in real time, playback into files
/// - cpal (feature `microphone`): live microphone and speaker
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Get backend name for logging
    fn name(&self) -> &str;

    /// Enumerate devices that can capture audio
    fn input_devices(&self) -> Result<Vec<InputDevice>>;

    async fn open_capture(&self, params: CaptureParams) -> Result<Box<dyn CaptureStream>>;

    async fn open_playback(&self, sample_rate: u32) -> Result<Box<dyn PlaybackStream>>;

    /// Release backend-wide resources once every stream is closed
    async fn terminate(&self) -> Result<()> {
        Ok(())
    }
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create the backend selected in the configuration
    pub fn create(config: &AudioConfig) -> Result<Arc<dyn AudioBackend>> {
        match config.backend {
            BackendKind::File => {
                let backend = super::wav::WavBackend::new(
                    config.input_wav.clone(),
                    config.output_dir.clone(),
                )?;
                Ok(Arc::new(backend))
            }

            BackendKind::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    Ok(Arc::new(super::cpal_backend::CpalBackend::new()))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    anyhow::bail!(
                        "Microphone backend not compiled in; rebuild with --features microphone"
                    )
                }
            }
        }
    }
}
