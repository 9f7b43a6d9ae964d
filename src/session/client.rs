use anyhow::Result;
use std::time::Duration;

use crate::audio::AudioFrame;

/// Notification callback fired on a session transition
pub type SessionHook = Box<dyn Fn() + Send + Sync>;

/// Connect/disconnect notifications registered before `connect()`
#[derive(Default)]
pub struct SessionHooks {
    on_connect: Option<SessionHook>,
    on_disconnect: Option<SessionHook>,
}

impl SessionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Box::new(hook));
        self
    }

    pub fn on_disconnect(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Box::new(hook));
        self
    }

    pub fn fire_connect(&self) {
        if let Some(hook) = &self.on_connect {
            hook();
        }
    }

    pub fn fire_disconnect(&self) {
        if let Some(hook) = &self.on_disconnect {
            hook();
        }
    }
}

/// One connection to the remote voice service
///
/// A handle is connected at most once; after `disconnect()` or loss it is
/// discarded and replaced by a fresh one.
#[async_trait::async_trait]
pub trait VoiceSession: Send + Sync {
    /// Register notification hooks. Called once, before `connect()`.
    fn set_hooks(&mut self, hooks: SessionHooks);

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    async fn send_audio(&self, frame: &AudioFrame) -> Result<()>;

    /// Next inbound frame, or `Ok(None)` when nothing arrived within `timeout`
    async fn receive_audio(&self, timeout: Duration) -> Result<Option<AudioFrame>>;

    /// Playback rate negotiated with the service, once connected
    fn playback_rate(&self) -> Option<u32>;
}

/// Builds fresh, unconnected sessions
#[async_trait::async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn VoiceSession>>;
}
