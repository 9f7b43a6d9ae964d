use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::backend::{
    AudioBackend, AudioFrame, CaptureParams, CaptureStream, PlaybackStream,
    DEFAULT_PLAYBACK_RATE,
};
use crate::error::ClientError;

/// Settings for opening an `AudioDevice`
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Selected input device, `None` for the backend default
    pub device_id: Option<u32>,
    pub input_rate: u32,
    pub frame_size: usize,
    pub default_playback_rate: u32,
    pub reset_pause: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            input_rate: super::backend::INPUT_SAMPLE_RATE,
            frame_size: super::backend::FRAME_SIZE,
            default_playback_rate: DEFAULT_PLAYBACK_RATE,
            reset_pause: Duration::from_millis(100),
        }
    }
}

/// Pick the speaker rate for a reset: explicit target, then the session's
/// negotiated rate, then the default.
pub fn select_playback_rate(target: Option<u32>, session_rate: Option<u32>, default: u32) -> u32 {
    target.or(session_rate).unwrap_or(default)
}

/// Capture and playback streams of one device pair
///
/// Created once at startup and reopened in place. Reads and writes each take
/// their own stream lock; `reset`, `adapt_playback_rate` and `close` also
/// hold the lifecycle lock so they never overlap.
pub struct AudioDevice {
    backend: Arc<dyn AudioBackend>,
    params: CaptureParams,
    default_playback_rate: u32,
    reset_pause: Duration,
    capture: Mutex<Box<dyn CaptureStream>>,
    playback: Mutex<Box<dyn PlaybackStream>>,
    playback_rate: AtomicU32,
    capture_open: AtomicBool,
    playback_open: AtomicBool,
    closed: Mutex<bool>,
}

impl AudioDevice {
    /// Open the selected microphone (falling back to the default one) and the
    /// speaker at the default rate.
    pub async fn open(backend: Arc<dyn AudioBackend>, config: DeviceConfig) -> Result<Self> {
        let params = CaptureParams {
            device_id: config.device_id,
            sample_rate: config.input_rate,
            frame_size: config.frame_size,
        };

        let capture = match backend.open_capture(params).await {
            Ok(stream) => {
                info!(
                    "Successfully connected to selected microphone (Device ID: {:?})",
                    config.device_id
                );
                stream
            }
            Err(e) => {
                error!("Error connecting to selected microphone: {:#}", e);
                info!("Falling back to default microphone...");
                let stream = backend
                    .open_capture(params.with_default_device())
                    .await
                    .map_err(|e| ClientError::MicrophoneUnavailable(format!("{:#}", e)))?;
                info!("Connected to default microphone");
                stream
            }
        };

        let playback = backend
            .open_playback(config.default_playback_rate)
            .await
            .map_err(|e| ClientError::PlaybackUnavailable(format!("{:#}", e)))?;
        let playback_rate = playback.sample_rate();
        info!("Speaker stream opened at {}Hz", playback_rate);

        Ok(Self {
            backend,
            params,
            default_playback_rate: config.default_playback_rate,
            reset_pause: config.reset_pause,
            capture: Mutex::new(capture),
            playback: Mutex::new(playback),
            playback_rate: AtomicU32::new(playback_rate),
            capture_open: AtomicBool::new(true),
            playback_open: AtomicBool::new(true),
            closed: Mutex::new(false),
        })
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Rate the speaker stream reports it is open at, which may differ from
    /// the rate that was asked for
    pub fn playback_rate(&self) -> u32 {
        self.playback_rate.load(Ordering::SeqCst)
    }

    pub async fn read_frame(&self) -> Result<AudioFrame> {
        let mut capture = self.capture.lock().await;
        capture.read(self.params.frame_size).await
    }

    pub async fn write_frame(&self, frame: &AudioFrame) -> Result<()> {
        let mut playback = self.playback.lock().await;
        playback.write(frame).await
    }

    /// Capture activity as reported by the stream. While a read holds the
    /// stream, falls back to whether it is open.
    pub fn capture_active(&self) -> bool {
        match self.capture.try_lock() {
            Ok(stream) => stream.is_active(),
            Err(_) => self.capture_open.load(Ordering::SeqCst),
        }
    }

    /// Playback counterpart of `capture_active`
    pub fn playback_active(&self) -> bool {
        match self.playback.try_lock() {
            Ok(stream) => stream.is_active(),
            Err(_) => self.playback_open.load(Ordering::SeqCst),
        }
    }

    /// Close and reopen both streams.
    ///
    /// Tries a gentle reset (microphone, then speaker) first. If either phase
    /// fails, force-closes both and reopens them from defaults. Only a failure
    /// of that fallback is returned.
    pub async fn reset(
        &self,
        target_rate: Option<u32>,
        session_rate: Option<u32>,
    ) -> Result<(), ClientError> {
        let closed = self.closed.lock().await;
        if *closed {
            warn!("Skipping audio reset: device already closed");
            return Ok(());
        }

        info!("Performing gentle audio stream reset...");
        let rate = select_playback_rate(target_rate, session_rate, self.default_playback_rate);

        if let Err(e) = self.gentle_reset(rate).await {
            error!("Error during gentle audio reset: {:#}", e);
            let rate = select_playback_rate(None, session_rate, self.default_playback_rate);
            self.aggressive_reset(rate).await?;
            info!("Audio reset completed via fallback method");
        }

        drop(closed);
        Ok(())
    }

    async fn gentle_reset(&self, rate: u32) -> Result<()> {
        {
            let mut capture = self.capture.lock().await;
            capture.stop().await.context("Failed to stop microphone stream")?;
            capture.close().await.context("Failed to close microphone stream")?;
            self.capture_open.store(false, Ordering::SeqCst);
            info!("Microphone stream closed");

            tokio::time::sleep(self.reset_pause).await;

            *capture = self
                .backend
                .open_capture(self.params)
                .await
                .context("Failed to reopen microphone stream")?;
            self.capture_open.store(true, Ordering::SeqCst);
            info!("Microphone stream reset successfully");
        }

        let mut playback = self.playback.lock().await;
        playback.stop().await.context("Failed to stop speaker stream")?;
        playback.close().await.context("Failed to close speaker stream")?;
        self.playback_open.store(false, Ordering::SeqCst);
        info!("Speaker stream closed");

        tokio::time::sleep(self.reset_pause).await;

        info!("Using sample rate for speaker: {}", rate);
        *playback = self
            .backend
            .open_playback(rate)
            .await
            .context("Failed to reopen speaker stream")?;
        self.playback_open.store(true, Ordering::SeqCst);
        self.playback_rate.store(playback.sample_rate(), Ordering::SeqCst);
        info!("Speaker stream reset successfully");

        Ok(())
    }

    async fn aggressive_reset(&self, rate: u32) -> Result<(), ClientError> {
        let mut capture = self.capture.lock().await;
        let mut playback = self.playback.lock().await;

        if let Err(e) = capture.close().await {
            debug!("Ignoring microphone close error: {:#}", e);
        }
        if let Err(e) = playback.close().await {
            debug!("Ignoring speaker close error: {:#}", e);
        }
        self.capture_open.store(false, Ordering::SeqCst);
        self.playback_open.store(false, Ordering::SeqCst);

        *capture = self
            .backend
            .open_capture(self.params)
            .await
            .map_err(|e| ClientError::DeviceResetFailed(format!("microphone: {:#}", e)))?;
        self.capture_open.store(true, Ordering::SeqCst);

        *playback = self
            .backend
            .open_playback(rate)
            .await
            .map_err(|e| ClientError::DeviceResetFailed(format!("speaker: {:#}", e)))?;
        self.playback_open.store(true, Ordering::SeqCst);
        self.playback_rate.store(playback.sample_rate(), Ordering::SeqCst);

        Ok(())
    }

    /// Reopen only the speaker at `rate`
    pub async fn adapt_playback_rate(&self, rate: u32) -> Result<()> {
        let closed = self.closed.lock().await;
        if *closed {
            anyhow::bail!("Audio device already closed");
        }

        let mut playback = self.playback.lock().await;
        if let Err(e) = playback.close().await {
            debug!("Ignoring speaker close error: {:#}", e);
        }
        self.playback_open.store(false, Ordering::SeqCst);

        *playback = self
            .backend
            .open_playback(rate)
            .await
            .with_context(|| format!("Failed to reopen speaker at {}Hz", rate))?;
        self.playback_open.store(true, Ordering::SeqCst);
        self.playback_rate.store(playback.sample_rate(), Ordering::SeqCst);

        drop(closed);
        Ok(())
    }

    /// Stop and close both streams and release the backend. Idempotent.
    pub async fn close(&self) {
        let mut closed = self.closed.lock().await;
        if *closed {
            return;
        }
        *closed = true;
        self.capture_open.store(false, Ordering::SeqCst);
        self.playback_open.store(false, Ordering::SeqCst);

        {
            let mut capture = self.capture.lock().await;
            let result: Result<()> = async {
                capture.stop().await?;
                capture.close().await
            }
            .await;
            match result {
                Ok(()) => info!("Microphone stream closed"),
                Err(e) => error!("Error closing microphone stream: {:#}", e),
            }
        }

        {
            let mut playback = self.playback.lock().await;
            let result: Result<()> = async {
                playback.stop().await?;
                playback.close().await
            }
            .await;
            match result {
                Ok(()) => info!("Speaker stream closed"),
                Err(e) => error!("Error closing speaker stream: {:#}", e),
            }
        }

        match self.backend.terminate().await {
            Ok(()) => info!("Audio backend {} released", self.backend.name()),
            Err(e) => error!("Error releasing audio backend: {:#}", e),
        }
    }
}
