use std::sync::Arc;
use tokio::sync::RwLock;

use super::client::VoiceSession;
use super::config::SessionState;

struct Slot {
    state: SessionState,
    session: Option<Arc<dyn VoiceSession>>,
}

/// The current session, shared between the supervisor and the audio workers
///
/// Only the `ConnectionSupervisor` (and teardown) writes it. Readers clone
/// the `Arc` out and never hold the lock across I/O, so a reader sees either
/// the old handle or the fully connected new one.
#[derive(Clone)]
pub struct SessionSlot {
    inner: Arc<RwLock<Slot>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Slot {
                state: SessionState::Disconnected,
                session: None,
            })),
        }
    }

    /// Current session, live or not
    pub async fn current(&self) -> Option<Arc<dyn VoiceSession>> {
        self.inner.read().await.session.clone()
    }

    /// Current session if it reports connected
    pub async fn live(&self) -> Option<Arc<dyn VoiceSession>> {
        self.current().await.filter(|session| session.is_connected())
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state
    }

    /// State and session read under a single guard, so the pair is consistent
    pub async fn view(&self) -> (SessionState, Option<Arc<dyn VoiceSession>>) {
        let slot = self.inner.read().await;
        (slot.state, slot.session.clone())
    }

    pub(crate) async fn mark_connecting(&self) {
        let mut slot = self.inner.write().await;
        if slot.session.is_none() {
            slot.state = SessionState::Connecting;
        }
    }

    pub(crate) async fn mark_disconnected(&self) {
        let mut slot = self.inner.write().await;
        if slot.session.is_none() {
            slot.state = SessionState::Disconnected;
        }
    }

    /// Publish a connected session, returning whatever it replaced
    pub(crate) async fn install(
        &self,
        session: Arc<dyn VoiceSession>,
    ) -> Option<Arc<dyn VoiceSession>> {
        let mut slot = self.inner.write().await;
        slot.state = SessionState::Connected;
        slot.session.replace(session)
    }

    /// Remove the current session so no reader can pick it up again
    pub(crate) async fn take(&self) -> Option<Arc<dyn VoiceSession>> {
        let mut slot = self.inner.write().await;
        slot.state = SessionState::Disconnected;
        slot.session.take()
    }
}

impl Default for SessionSlot {
    fn default() -> Self {
        Self::new()
    }
}
