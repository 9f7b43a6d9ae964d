// Voice activity heuristic for captured microphone frames
//
// Energy is the RMS amplitude of a frame. The speaking/silence hysteresis
// lives in `ActivityState`, owned by the capture worker.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// RMS amplitude of a frame. Empty or all-zero frames yield exactly 0.0.
pub fn frame_energy(samples: &[i16]) -> f64 {
    if samples.is_empty() || samples.iter().all(|&s| s == 0) {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let s = s as f64;
            s * s
        })
        .sum();
    let rms = (sum_squares / samples.len() as f64).sqrt();

    if !rms.is_finite() {
        warn!("Error calculating audio energy: non-finite result");
        return 0.0;
    }

    rms
}

/// Classification of a single frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Speaking,
    Silent,
}

/// Rolling activity state for the capture side
#[derive(Debug)]
pub struct ActivityState {
    threshold: f64,
    history_len: usize,
    levels: VecDeque<f64>,
    speaking_frames: u64,
    silent_frames: u64,
    last_activity: Instant,
}

impl ActivityState {
    pub fn new(threshold: f64, history_len: usize) -> Self {
        Self {
            threshold,
            history_len: history_len.max(1),
            levels: VecDeque::with_capacity(history_len.max(1)),
            speaking_frames: 0,
            silent_frames: 0,
            last_activity: Instant::now(),
        }
    }

    /// Record a frame energy and classify it.
    ///
    /// Strictly above the threshold is speech.
    pub fn observe(&mut self, energy: f64, now: Instant) -> Activity {
        self.levels.push_back(energy);
        while self.levels.len() > self.history_len {
            self.levels.pop_front();
        }

        if energy > self.threshold {
            self.last_activity = now;
            self.speaking_frames += 1;
            self.silent_frames = 0;
            Activity::Speaking
        } else {
            self.silent_frames += 1;
            self.speaking_frames = 0;
            Activity::Silent
        }
    }

    /// Mean of the recent energy history
    pub fn average_level(&self) -> f64 {
        if self.levels.is_empty() {
            return 0.0;
        }
        self.levels.iter().sum::<f64>() / self.levels.len() as f64
    }

    pub fn speaking_frames(&self) -> u64 {
        self.speaking_frames
    }

    pub fn silent_frames(&self) -> u64 {
        self.silent_frames
    }

    pub fn history(&self) -> impl Iterator<Item = &f64> {
        self.levels.iter()
    }

    /// Time since the last frame classified as speech
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }
}

/// Console level meter, e.g. `Mic: |||||               Level: 612`
pub fn level_meter(average_level: f64, energy: f64) -> String {
    let bars = (average_level / 100.0).clamp(0.0, 20.0) as usize;
    format!(
        "Mic: {}{} Level: {:.0}",
        "|".repeat(bars),
        " ".repeat(20 - bars),
        energy
    )
}
