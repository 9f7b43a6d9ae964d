use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

use super::Shutdown;
use crate::audio::AudioDevice;
use crate::config::HealthConfig;
use crate::session::{Counters, HealthSnapshot, SessionSlot};

/// Periodic statistics logger. Read-only over shared state.
pub struct HealthReporter {
    device: Arc<AudioDevice>,
    slot: SessionSlot,
    counters: Arc<Counters>,
    config: HealthConfig,
}

impl HealthReporter {
    pub fn new(
        device: Arc<AudioDevice>,
        slot: SessionSlot,
        counters: Arc<Counters>,
        config: HealthConfig,
    ) -> Self {
        Self {
            device,
            slot,
            counters,
            config,
        }
    }

    pub async fn snapshot(&self) -> HealthSnapshot {
        snapshot(&self.device, &self.slot, &self.counters).await
    }

    /// Log a report whenever a full report interval has passed, checking
    /// every check interval. Returns how many reports were logged.
    pub async fn run(self, shutdown: Shutdown) -> u64 {
        info!("System monitor started");

        let mut last_report = Instant::now();
        let mut reports = 0;

        while !shutdown.is_triggered() {
            if last_report.elapsed() >= self.config.report_interval() {
                self.report().await;
                reports += 1;
                last_report = Instant::now();
            }

            if !shutdown.sleep(self.config.check_interval()).await {
                break;
            }
        }

        info!("System monitor stopped after {} reports", reports);
        reports
    }

    async fn report(&self) {
        let snap = self.snapshot().await;

        info!(
            uptime_secs = snap.uptime_secs,
            reconnects = snap.reconnects,
            device_resets = snap.device_resets,
            speech_turns = snap.speech_turns,
            "System statistics - Uptime: {:.1}s, Reconnects: {}, Audio resets: {}",
            snap.uptime_secs,
            snap.reconnects,
            snap.device_resets
        );

        match snap.session_connected {
            Some(connected) => info!("Session connected: {}", connected),
            None => warn!("Session not initialized ({})", snap.session_state),
        }

        info!(
            "Audio streams - Mic active: {}, Speaker active: {} ({}Hz)",
            snap.capture_active, snap.playback_active, snap.playback_rate
        );
    }
}

/// Gather a `HealthSnapshot` without mutating anything
pub async fn snapshot(
    device: &AudioDevice,
    slot: &SessionSlot,
    counters: &Counters,
) -> HealthSnapshot {
    let (session_state, session) = slot.view().await;

    HealthSnapshot {
        started_at: counters.started_at(),
        uptime_secs: counters.uptime_secs(),
        reconnects: counters.reconnects(),
        device_resets: counters.device_resets(),
        speech_turns: counters.speech_turns(),
        session_state,
        session_connected: session.map(|s| s.is_connected()),
        capture_active: device.capture_active(),
        playback_active: device.playback_active(),
        playback_rate: device.playback_rate(),
    }
}
