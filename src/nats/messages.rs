use anyhow::{Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::audio::AudioFrame;

/// Audio frame exchanged with the voice service, both directions
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub session_id: String,
    pub sequence: u64,
    pub pcm: String, // Base64-encoded PCM bytes
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String, // RFC3339 timestamp
}

impl AudioFrameMessage {
    pub fn encode(session_id: &str, sequence: u64, frame: &AudioFrame) -> Self {
        Self {
            session_id: session_id.to_string(),
            sequence,
            pcm: base64::engine::general_purpose::STANDARD.encode(frame.to_pcm_bytes()),
            sample_rate: frame.sample_rate,
            channels: crate::audio::CHANNELS,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn decode(&self) -> Result<AudioFrame> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.pcm)
            .context("Invalid base64 PCM payload")?;
        Ok(AudioFrame::from_pcm_bytes(&bytes, self.sample_rate))
    }
}

/// Request to open a session, sent on `<prefix>.session.open`
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionOpenRequest {
    pub client_id: String,
    pub token: String,
    pub character: String,
    /// Capture rate of the audio the client will send
    pub input_sample_rate: u32,
}

/// Reply to `SessionOpenRequest`
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionOpenReply {
    pub session_id: String,
    /// Playback rate of the audio the service will send
    pub sample_rate: u32,
    #[serde(default)]
    pub error: Option<String>,
}

/// Sent on `<prefix>.session.<id>.close` when the client leaves
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCloseMessage {
    pub session_id: String,
    pub client_id: String,
    pub timestamp: String,
}
