use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::client::{SessionFactory, SessionHooks, VoiceSession};
use super::config::Character;
use super::slot::SessionSlot;
use super::stats::Counters;
use crate::audio::AudioDevice;
use crate::pipeline::Shutdown;

/// Timing for the connection monitor
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub character: Character,
    /// Wait between `connect()` and the liveness check
    pub settle_delay: Duration,
    /// Monitor cadence
    pub poll_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            character: Character::Maya,
            settle_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(10),
        }
    }
}

/// Owns the lifecycle of the current session
///
/// Sole writer of the `SessionSlot`. Polls liveness on a fixed cadence and
/// replaces dead sessions; a new session is published only after it has
/// connected, passed the liveness check, and had the speaker adapted to its
/// playback rate.
pub struct ConnectionSupervisor {
    factory: Arc<dyn SessionFactory>,
    slot: SessionSlot,
    device: Arc<AudioDevice>,
    counters: Arc<Counters>,
    config: SupervisorConfig,
    /// Consecutive recovery attempts. Held for a whole poll so concurrent
    /// polls never race two reconnects for the same stale session.
    attempts: Mutex<u32>,
}

impl ConnectionSupervisor {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        slot: SessionSlot,
        device: Arc<AudioDevice>,
        counters: Arc<Counters>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            factory,
            slot,
            device,
            counters,
            config,
            attempts: Mutex::new(0),
        }
    }

    pub fn slot(&self) -> &SessionSlot {
        &self.slot
    }

    /// Keep the current session if it is live, otherwise replace it.
    ///
    /// Returns the live session, or `None` when this attempt failed; the next
    /// poll retries.
    pub async fn establish_or_recover(&self) -> Option<Arc<dyn VoiceSession>> {
        let mut attempts = self.attempts.lock().await;

        if let Some(session) = self.slot.live().await {
            if *attempts > 0 {
                info!("Connection stable after {} reconnection attempts", *attempts);
                *attempts = 0;
            }
            return Some(session);
        }

        *attempts += 1;
        warn!(
            "Connection lost or not established. Reconnection attempt {}...",
            *attempts
        );

        if let Some(stale) = self.slot.take().await {
            match stale.disconnect().await {
                Ok(()) => info!("Successfully disconnected old connection"),
                Err(e) => warn!("Error disconnecting: {:#}", e),
            }
        }

        self.connect_new().await
    }

    async fn connect_new(&self) -> Option<Arc<dyn VoiceSession>> {
        let character = self.config.character;
        info!("Setting up new session connection");
        self.slot.mark_connecting().await;

        let mut session = match self.factory.create().await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to create session: {:#}", e);
                self.slot.mark_disconnected().await;
                return None;
            }
        };

        session.set_hooks(
            SessionHooks::new()
                .on_connect(move || info!("Connected to {}! Start speaking...", character))
                .on_disconnect(move || info!("Disconnected from {}", character)),
        );

        info!("Connecting to {}...", character);
        if let Err(e) = session.connect().await {
            error!("Connection error: {:#}", e);
            self.slot.mark_disconnected().await;
            return None;
        }

        tokio::time::sleep(self.config.settle_delay).await;

        if !session.is_connected() {
            error!("Failed to connect. Will retry...");
            if let Err(e) = session.disconnect().await {
                warn!("Error disconnecting failed session: {:#}", e);
            }
            self.slot.mark_disconnected().await;
            return None;
        }

        info!("Successfully connected to {}", character);
        let session: Arc<dyn VoiceSession> = Arc::from(session);

        self.adapt_playback_rate(session.as_ref()).await;

        if let Some(replaced) = self.slot.install(Arc::clone(&session)).await {
            // Only reachable if teardown raced us; never leave it dangling
            if let Err(e) = replaced.disconnect().await {
                warn!("Error disconnecting replaced session: {:#}", e);
            }
        }

        let reconnects = self.counters.record_reconnect();
        info!("Connection established. Reconnect count: {}", reconnects);

        Some(session)
    }

    async fn adapt_playback_rate(&self, session: &dyn VoiceSession) {
        let Some(rate) = session.playback_rate() else {
            return;
        };

        if rate == self.device.playback_rate() {
            return;
        }

        info!("Adjusting speaker to server sample rate: {}Hz", rate);
        if let Err(e) = self.device.adapt_playback_rate(rate).await {
            error!("Error adjusting speaker rate: {:#}", e);
        }
    }

    /// Connection monitor loop; runs until shutdown
    pub async fn run(self: Arc<Self>, shutdown: Shutdown) {
        info!("Connection monitor started");

        while !shutdown.is_triggered() {
            self.establish_or_recover().await;

            if !shutdown.sleep(self.config.poll_interval).await {
                break;
            }
        }

        info!("Connection monitor stopped");
    }
}
