use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::Shutdown;
use crate::audio::{frame_energy, level_meter, Activity, ActivityState, AudioDevice};
use crate::config::CaptureConfig;
use crate::error::ClientError;
use crate::session::{Counters, SessionSlot};

/// Microphone → session worker
///
/// Also runs the device watchdog: every `reset_interval` it recycles both
/// audio streams. A failed fallback reset is the only error it returns.
pub struct CaptureWorker {
    device: Arc<AudioDevice>,
    slot: SessionSlot,
    counters: Arc<Counters>,
    config: CaptureConfig,
    reset_interval: Duration,
    show_meter: bool,
}

impl CaptureWorker {
    pub fn new(
        device: Arc<AudioDevice>,
        slot: SessionSlot,
        counters: Arc<Counters>,
        config: CaptureConfig,
        reset_interval: Duration,
        show_meter: bool,
    ) -> Self {
        Self {
            device,
            slot,
            counters,
            config,
            reset_interval,
            show_meter,
        }
    }

    pub async fn run(self, shutdown: Shutdown) -> Result<(), ClientError> {
        info!("Microphone capture worker started");

        let mut activity = ActivityState::new(self.config.energy_threshold, self.config.level_history);
        let mut last_reset = Instant::now();
        let mut last_heartbeat = Instant::now();

        while !shutdown.is_triggered() {
            let Some(session) = self.slot.live().await else {
                warn!("Not connected in capture worker. Waiting...");
                shutdown.sleep(self.config.idle_wait()).await;
                continue;
            };

            let frame = match self.device.read_frame().await {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Error reading from microphone: {:#}", e);
                    shutdown.sleep(self.config.read_retry()).await;
                    continue;
                }
            };

            let energy = frame_energy(&frame.samples);
            match activity.observe(energy, Instant::now()) {
                Activity::Speaking => {
                    if activity.speaking_frames() % 10 == 0 {
                        debug!("Speaking detected. Energy level: {:.1}", energy);
                    }
                    if self.show_meter {
                        print!("\r{}", level_meter(activity.average_level(), energy));
                        std::io::stdout().flush().ok();
                    }
                }
                Activity::Silent => {
                    if activity.silent_frames() % 100 == 0 {
                        debug!("Silence continues. Frames: {}", activity.silent_frames());
                    }
                }
            }

            // The session may have dropped while the read was blocked
            if !session.is_connected() {
                debug!("Session dropped during capture; discarding frame");
                continue;
            }

            if let Err(e) = session.send_audio(&frame).await {
                error!("Error sending audio data: {:#}", e);
                shutdown.sleep(self.config.send_backoff()).await;
                continue;
            }

            let now = Instant::now();
            if now.duration_since(last_reset) > self.reset_interval {
                info!(
                    "Performing scheduled audio stream reset after {} seconds",
                    self.reset_interval.as_secs()
                );
                let resets = self.counters.record_device_reset();
                if let Err(e) = self.device.reset(None, session.playback_rate()).await {
                    error!("{}", e);
                    return Err(e);
                }
                info!("Audio reset completed. Total resets: {}", resets);
                last_reset = now;
            }

            if now.duration_since(last_heartbeat) > self.config.heartbeat_interval() {
                debug!("Capture heartbeat");
                last_heartbeat = now;

                if activity.idle_for(now) > self.config.idle_after() {
                    info!(
                        "No audio activity detected for {}+ seconds",
                        self.config.idle_after().as_secs()
                    );
                }
            }
        }

        info!("Microphone capture worker stopped");
        Ok(())
    }
}
