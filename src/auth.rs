use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use crate::error::ClientError;

/// Credential presented when opening a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id_token: String,

    /// Expiry, if the issuer provided one
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|expiry| expiry <= now).unwrap_or(false)
    }
}

/// Source of a valid session token
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    async fn valid_token(&self) -> Result<Token, ClientError>;
}

/// Reads a token previously stored as JSON on disk
pub struct FileTokenProvider {
    path: PathBuf,
}

impl FileTokenProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl TokenProvider for FileTokenProvider {
    async fn valid_token(&self) -> Result<Token, ClientError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ClientError::Auth(format!("cannot read {}: {}", self.path.display(), e))
        })?;

        let token: Token = serde_json::from_str(&raw).map_err(|e| {
            ClientError::Auth(format!("malformed token file {}: {}", self.path.display(), e))
        })?;

        if token.id_token.trim().is_empty() {
            return Err(ClientError::Auth("token file contains an empty token".to_string()));
        }

        if token.is_expired(Utc::now()) {
            return Err(ClientError::Auth(format!(
                "token expired at {}",
                token.expires_at.map(|t| t.to_rfc3339()).unwrap_or_default()
            )));
        }

        info!("Successfully obtained authentication token");
        Ok(token)
    }
}
