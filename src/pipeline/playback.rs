use std::sync::Arc;
use tracing::{error, info, warn};

use super::Shutdown;
use crate::audio::AudioDevice;
use crate::config::PlaybackConfig;
use crate::session::{Character, Counters, SessionSlot};

/// Speaking transition of the remote character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechTransition {
    Started,
    Finished,
}

/// Tracks whether the character is currently speaking
///
/// Any received frame starts (or continues) a turn; more than
/// `silence_polls` consecutive empty polls end it.
#[derive(Debug)]
pub struct PlaybackTracker {
    silence_polls: u32,
    receiving: bool,
    silent_polls: u32,
}

impl PlaybackTracker {
    pub fn new(silence_polls: u32) -> Self {
        Self {
            silence_polls,
            receiving: false,
            silent_polls: 0,
        }
    }

    pub fn on_frame(&mut self) -> Option<SpeechTransition> {
        self.silent_polls = 0;
        if self.receiving {
            return None;
        }
        self.receiving = true;
        Some(SpeechTransition::Started)
    }

    pub fn on_empty(&mut self) -> Option<SpeechTransition> {
        self.silent_polls = self.silent_polls.saturating_add(1);
        if self.receiving && self.silent_polls > self.silence_polls {
            self.receiving = false;
            return Some(SpeechTransition::Finished);
        }
        None
    }

    pub fn is_receiving(&self) -> bool {
        self.receiving
    }
}

/// Session → speaker worker
pub struct PlaybackWorker {
    device: Arc<AudioDevice>,
    slot: SessionSlot,
    counters: Arc<Counters>,
    config: PlaybackConfig,
    character: Character,
}

impl PlaybackWorker {
    pub fn new(
        device: Arc<AudioDevice>,
        slot: SessionSlot,
        counters: Arc<Counters>,
        config: PlaybackConfig,
        character: Character,
    ) -> Self {
        Self {
            device,
            slot,
            counters,
            config,
            character,
        }
    }

    pub async fn run(self, shutdown: Shutdown) {
        info!("Audio playback worker started");

        let mut tracker = PlaybackTracker::new(self.config.silence_polls);

        while !shutdown.is_triggered() {
            let Some(session) = self.slot.live().await else {
                warn!("Not connected in playback worker. Waiting...");
                shutdown.sleep(self.config.idle_wait()).await;
                continue;
            };

            match session.receive_audio(self.config.receive_timeout()).await {
                Ok(Some(frame)) => {
                    if tracker.on_frame() == Some(SpeechTransition::Started) {
                        info!("{} started speaking", self.character);
                        println!("\n→ Receiving audio from {}...", self.character);
                    }

                    if let Err(e) = self.device.write_frame(&frame).await {
                        error!("Error playing audio: {:#}", e);
                    }
                }
                Ok(None) => {
                    if tracker.on_empty() == Some(SpeechTransition::Finished) {
                        let turns = self.counters.record_speech_turn();
                        info!("{} finished speaking (turn {})", self.character, turns);
                        println!("← {} finished speaking", self.character);
                    }
                }
                Err(e) => {
                    warn!("Error getting audio frame: {:#}", e);
                    shutdown.sleep(self.config.receive_timeout()).await;
                }
            }
        }

        info!("Audio playback worker stopped");
    }
}
