use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

use super::config::SessionState;

/// Process-wide counters, monotonically increasing
#[derive(Debug)]
pub struct Counters {
    started_at: DateTime<Utc>,
    started: Instant,
    reconnects: AtomicU64,
    device_resets: AtomicU64,
    speech_turns: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            reconnects: AtomicU64::new(0),
            device_resets: AtomicU64::new(0),
            speech_turns: AtomicU64::new(0),
        }
    }

    /// Count a successful (re)connection, returning the new total
    pub fn record_reconnect(&self) -> u64 {
        self.reconnects.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn record_device_reset(&self) -> u64 {
        self.device_resets.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn record_speech_turn(&self) -> u64 {
        self.speech_turns.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub fn device_resets(&self) -> u64 {
        self.device_resets.load(Ordering::SeqCst)
    }

    pub fn speech_turns(&self) -> u64 {
        self.speech_turns.load(Ordering::SeqCst)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the client's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// When the client started
    pub started_at: DateTime<Utc>,

    /// Seconds since start
    pub uptime_secs: f64,

    /// Successful connections, the initial one included
    pub reconnects: u64,

    /// Scheduled audio device resets
    pub device_resets: u64,

    /// Completed character speaking turns
    pub speech_turns: u64,

    pub session_state: SessionState,

    /// Liveness of the current session, if one is installed
    pub session_connected: Option<bool>,

    /// Best-effort stream activity
    pub capture_active: bool,
    pub playback_active: bool,

    /// Rate the speaker stream is currently open at
    pub playback_rate: u32,
}
