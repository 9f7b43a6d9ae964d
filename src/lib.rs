pub mod audio;
pub mod auth;
pub mod config;
pub mod error;
pub mod nats;
pub mod pipeline;
pub mod session;

pub use audio::{
    AudioBackend, AudioBackendFactory, AudioDevice, AudioFrame, CaptureStream, DeviceConfig,
    InputDevice, PlaybackStream,
};
pub use auth::{FileTokenProvider, Token, TokenProvider};
pub use config::Config;
pub use error::ClientError;
pub use nats::{NatsSessionConfig, NatsSessionFactory, NatsVoiceSession};
pub use pipeline::{Shutdown, VoiceClient};
pub use session::{
    Character, ConnectionSupervisor, Counters, HealthSnapshot, SessionFactory, SessionHooks,
    SessionSlot, SessionState, VoiceSession,
};
