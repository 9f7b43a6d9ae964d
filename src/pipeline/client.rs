use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use super::capture::CaptureWorker;
use super::health::{self, HealthReporter};
use super::playback::PlaybackWorker;
use super::Shutdown;
use crate::audio::{AudioBackend, AudioDevice, DeviceConfig};
use crate::config::Config;
use crate::error::ClientError;
use crate::session::{
    ConnectionSupervisor, Counters, HealthSnapshot, SessionFactory, SessionSlot, SupervisorConfig,
};

/// The running duplex client: one device, one supervisor, four workers
pub struct VoiceClient {
    device: Arc<AudioDevice>,
    slot: SessionSlot,
    counters: Arc<Counters>,
    shutdown: Shutdown,
    capture: Option<JoinHandle<Result<(), ClientError>>>,
    workers: Vec<(&'static str, JoinHandle<()>)>,
    stopped: bool,
}

impl VoiceClient {
    /// Open the audio device, make the initial connection, and spawn the
    /// capture, playback, connection-monitor and health workers.
    ///
    /// Fails only when the device cannot be opened. A failed initial
    /// connection is left to the connection monitor.
    pub async fn start(
        config: &Config,
        device_id: Option<u32>,
        backend: Arc<dyn AudioBackend>,
        factory: Arc<dyn SessionFactory>,
    ) -> Result<Self> {
        let device_config = DeviceConfig {
            device_id,
            input_rate: config.audio.input_rate,
            frame_size: config.audio.frame_size,
            default_playback_rate: config.audio.default_playback_rate,
            reset_pause: config.audio.reset_pause(),
        };

        info!("Opening audio device on backend {}", backend.name());
        let device = Arc::new(
            AudioDevice::open(backend, device_config)
                .await
                .context("Failed to open audio device")?,
        );

        let slot = SessionSlot::new();
        let counters = Arc::new(Counters::new());
        let shutdown = Shutdown::new();

        let supervisor = Arc::new(ConnectionSupervisor::new(
            factory,
            slot.clone(),
            Arc::clone(&device),
            Arc::clone(&counters),
            SupervisorConfig {
                character: config.session.character,
                settle_delay: config.session.settle_delay(),
                poll_interval: config.session.poll_interval(),
            },
        ));

        info!("Establishing initial connection...");
        if supervisor.establish_or_recover().await.is_none() {
            warn!("Initial connection failed; the connection monitor will keep retrying");
        }

        info!("Starting worker tasks...");

        let capture = CaptureWorker::new(
            Arc::clone(&device),
            slot.clone(),
            Arc::clone(&counters),
            config.capture.clone(),
            config.audio.reset_interval(),
            config.audio.show_meter,
        );
        let capture = tokio::spawn(capture.run(shutdown.clone()));

        let playback = PlaybackWorker::new(
            Arc::clone(&device),
            slot.clone(),
            Arc::clone(&counters),
            config.playback.clone(),
            config.session.character,
        );

        let reporter = HealthReporter::new(
            Arc::clone(&device),
            slot.clone(),
            Arc::clone(&counters),
            config.health.clone(),
        );

        let health_shutdown = shutdown.clone();
        let workers = vec![
            ("playback", tokio::spawn(playback.run(shutdown.clone()))),
            ("connection monitor", tokio::spawn(supervisor.run(shutdown.clone()))),
            (
                "health reporter",
                tokio::spawn(async move {
                    reporter.run(health_shutdown).await;
                }),
            ),
        ];

        info!("All systems initialized");

        Ok(Self {
            device,
            slot,
            counters,
            shutdown,
            capture: Some(capture),
            workers,
            stopped: false,
        })
    }

    /// Handle that stops every worker when triggered
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn device(&self) -> &Arc<AudioDevice> {
        &self.device
    }

    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }

    pub async fn stats(&self) -> HealthSnapshot {
        health::snapshot(&self.device, &self.slot, &self.counters).await
    }

    /// Run until `signal` resolves, the shutdown flag is set, or the capture
    /// worker hits an unrecoverable device failure; then tear everything down.
    pub async fn run_until<F>(mut self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Some(mut capture) = self.capture.take() else {
            return self.shutdown().await;
        };

        let finished = tokio::select! {
            _ = signal => {
                info!("Shutdown initiated");
                None
            }
            _ = self.shutdown.wait() => None,
            joined = &mut capture => Some(joined),
        };

        let outcome = match finished {
            None => {
                self.capture = Some(capture);
                Ok(())
            }
            Some(joined) => capture_outcome(joined),
        };

        self.shutdown().await?;
        outcome
    }

    /// Stop all workers, disconnect the current session and close the device.
    /// Safe to call more than once.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        self.shutdown.trigger();
        info!("Cleaning up resources...");

        if let Some(capture) = self.capture.take() {
            if let Err(e) = capture_outcome(capture.await) {
                error!("Capture worker ended with error: {:#}", e);
            }
        }

        for (name, handle) in self.workers.drain(..) {
            if let Err(e) = handle.await {
                error!("{} worker panicked: {}", name, e);
            }
        }

        if let Some(session) = self.slot.take().await {
            match session.disconnect().await {
                Ok(()) => info!("Session disconnected"),
                Err(e) => error!("Error disconnecting session: {:#}", e),
            }
        }

        self.device.close().await;

        info!("All resources cleaned up. Session ended.");
        Ok(())
    }
}

fn capture_outcome(joined: Result<Result<(), ClientError>, JoinError>) -> Result<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => {
            error!("Capture worker panicked: {}", e);
            Ok(())
        }
    }
}
