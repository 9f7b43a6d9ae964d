pub mod client;
pub mod messages;

pub use client::{NatsSessionConfig, NatsSessionFactory, NatsVoiceSession};
pub use messages::{AudioFrameMessage, SessionCloseMessage, SessionOpenReply, SessionOpenRequest};
