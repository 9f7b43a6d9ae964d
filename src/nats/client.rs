use anyhow::{bail, Context, Result};
use futures::stream::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::{AudioFrameMessage, SessionCloseMessage, SessionOpenReply, SessionOpenRequest};
use crate::audio::{AudioFrame, INPUT_SAMPLE_RATE};
use crate::auth::Token;
use crate::session::{Character, SessionFactory, SessionHooks, VoiceSession};

/// Inbound frames buffered between the subscription and the playback worker
const INBOUND_QUEUE: usize = 512;

/// Where and how to reach the voice service
#[derive(Debug, Clone)]
pub struct NatsSessionConfig {
    pub url: String,
    pub subject_prefix: String,
    pub character: Character,
    pub open_timeout: Duration,
}

/// Live state of a connected session
struct Connection {
    client: async_nats::Client,
    session_id: String,
    forwarder: JoinHandle<()>,
}

/// A voice session carried over NATS
///
/// `connect` opens a NATS connection and negotiates the session with a
/// request on `<prefix>.session.open`; audio then flows on
/// `<prefix>.session.<id>.in` (to the service) and `.out` (from it).
pub struct NatsVoiceSession {
    config: NatsSessionConfig,
    token: Token,
    client_id: String,
    hooks: Arc<SessionHooks>,
    connection: StdMutex<Option<Connection>>,
    connected: Arc<AtomicBool>,
    playback_rate: AtomicU32,
    sequence: AtomicU64,
    inbound_tx: mpsc::Sender<AudioFrame>,
    inbound_rx: Mutex<mpsc::Receiver<AudioFrame>>,
}

impl NatsVoiceSession {
    pub fn new(config: NatsSessionConfig, token: Token) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);

        Self {
            config,
            token,
            client_id: uuid::Uuid::new_v4().to_string(),
            hooks: Arc::new(SessionHooks::new()),
            connection: StdMutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            playback_rate: AtomicU32::new(0),
            sequence: AtomicU64::new(0),
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
        }
    }

    fn subject(&self, session_id: &str, leaf: &str) -> String {
        format!("{}.session.{}.{}", self.config.subject_prefix, session_id, leaf)
    }

    /// Client and session id of the live connection
    fn link(&self) -> Option<(async_nats::Client, String)> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| (c.client.clone(), c.session_id.clone()))
    }

    async fn open(&self, client: &async_nats::Client) -> Result<SessionOpenReply> {
        let request = SessionOpenRequest {
            client_id: self.client_id.clone(),
            token: self.token.id_token.clone(),
            character: self.config.character.name().to_string(),
            input_sample_rate: INPUT_SAMPLE_RATE,
        };
        let payload = serde_json::to_vec(&request)?;
        let subject = format!("{}.session.open", self.config.subject_prefix);

        let response = tokio::time::timeout(
            self.config.open_timeout,
            client.request(subject, payload.into()),
        )
        .await
        .context("Timed out opening voice session")?
        .context("Voice session open request failed")?;

        let reply: SessionOpenReply =
            serde_json::from_slice(&response.payload).context("Malformed session open reply")?;

        if let Some(error) = reply.error {
            bail!("Voice service refused session: {}", error);
        }

        Ok(reply)
    }
}

#[async_trait::async_trait]
impl VoiceSession for NatsVoiceSession {
    fn set_hooks(&mut self, hooks: SessionHooks) {
        self.hooks = Arc::new(hooks);
    }

    async fn connect(&self) -> Result<()> {
        if self.link().is_some() {
            bail!("Session already connected");
        }

        info!("Connecting to NATS at {}", self.config.url);
        let client = async_nats::connect(&self.config.url)
            .await
            .context("Failed to connect to NATS")?;

        let reply = self.open(&client).await?;
        info!(
            "Voice session {} opened ({}Hz playback)",
            reply.session_id, reply.sample_rate
        );

        let out_subject = self.subject(&reply.session_id, "out");
        let mut subscriber = client
            .subscribe(out_subject.clone())
            .await
            .context("Failed to subscribe to session audio")?;
        debug!("Subscribed to {}", out_subject);

        let tx = self.inbound_tx.clone();
        let connected = Arc::clone(&self.connected);
        let hooks = Arc::clone(&self.hooks);
        let forwarder = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                let frame = match serde_json::from_slice::<AudioFrameMessage>(&msg.payload) {
                    Ok(message) => message.decode(),
                    Err(e) => Err(e.into()),
                };

                match frame {
                    Ok(frame) => {
                        if tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to parse session audio message: {:#}", e),
                }
            }

            // Subscription ended underneath us: the session is gone
            if connected.swap(false, Ordering::SeqCst) {
                hooks.fire_disconnect();
            }
        });

        self.playback_rate.store(reply.sample_rate, Ordering::SeqCst);
        *self.connection.lock().unwrap_or_else(PoisonError::into_inner) = Some(Connection {
            client,
            session_id: reply.session_id,
            forwarder,
        });
        self.connected.store(true, Ordering::SeqCst);
        self.hooks.fire_connect();

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let connection = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(connection) = connection else {
            return Ok(());
        };

        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        connection.forwarder.abort();

        let close = SessionCloseMessage {
            session_id: connection.session_id.clone(),
            client_id: self.client_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let payload = serde_json::to_vec(&close)?;
        let result: Result<()> = async {
            connection
                .client
                .publish(self.subject(&connection.session_id, "close"), payload.into())
                .await
                .context("Failed to publish session close")?;
            connection
                .client
                .flush()
                .await
                .context("Failed to flush NATS connection")
        }
        .await;

        if was_connected {
            self.hooks.fire_disconnect();
        }

        result
    }

    fn is_connected(&self) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }

        match self.link() {
            Some((client, _)) => matches!(
                client.connection_state(),
                async_nats::connection::State::Connected
            ),
            None => false,
        }
    }

    async fn send_audio(&self, frame: &AudioFrame) -> Result<()> {
        let Some((client, session_id)) = self.link() else {
            bail!("Session not connected");
        };

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let message = AudioFrameMessage::encode(&session_id, sequence, frame);
        let payload = serde_json::to_vec(&message)?;

        client
            .publish(self.subject(&session_id, "in"), payload.into())
            .await
            .context("Failed to publish audio frame")?;

        Ok(())
    }

    async fn receive_audio(&self, timeout: Duration) -> Result<Option<AudioFrame>> {
        let mut rx = self.inbound_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => bail!("Inbound audio channel closed"),
            Err(_) => Ok(None),
        }
    }

    fn playback_rate(&self) -> Option<u32> {
        match self.playback_rate.load(Ordering::SeqCst) {
            0 => None,
            rate => Some(rate),
        }
    }
}

/// Builds a fresh `NatsVoiceSession` per connection attempt
pub struct NatsSessionFactory {
    config: NatsSessionConfig,
    token: Token,
}

impl NatsSessionFactory {
    pub fn new(config: NatsSessionConfig, token: Token) -> Self {
        Self { config, token }
    }
}

#[async_trait::async_trait]
impl SessionFactory for NatsSessionFactory {
    async fn create(&self) -> Result<Box<dyn VoiceSession>> {
        Ok(Box::new(NatsVoiceSession::new(
            self.config.clone(),
            self.token.clone(),
        )))
    }
}
