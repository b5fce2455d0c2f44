//! NATS control-plane client
//!
//! Connection lifecycle is `Disconnected -> Connecting -> Connected`.
//! Callers bracket each unit of work with [`ClusterControl::ensure_connected`]
//! and [`ClusterControl::disconnect`]; every request fails fast with
//! [`NauthError::NotConnected`] outside that bracket.
//!
//! Connect attempts are serialized. The state itself is only locked for
//! transitions, so [`NatsClusterClient::state`] reports `Connecting` while
//! an attempt is in flight.

use std::time::Duration;

use async_nats::{Client, ConnectOptions};
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::messages::{
    claims_lookup_subject, ServerApiResponse, CLAIMS_DELETE_SUBJECT, CLAIMS_UPDATE_SUBJECT,
};
use crate::keys;
use crate::types::{NauthError, Result};
use crate::vault::KeyVault;

/// Default request timeout for control-plane calls
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Default number of reconnect attempts after a dropped connection
pub const DEFAULT_RECONNECT_ATTEMPTS: usize = 10;

/// Default fixed delay between reconnect attempts
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Connection settings for the cluster's control plane
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub url: String,
    pub request_timeout: Duration,
    pub reconnect_attempts: usize,
    pub reconnect_backoff: Duration,
    /// Client name reported to the server
    pub name: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            name: "nauth".to_string(),
        }
    }
}

/// Observable connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Administrative operations against the messaging cluster
#[async_trait::async_trait]
pub trait ClusterControl: Send + Sync {
    /// Connect using the system credentials stored in `namespace`; no-op when connected
    async fn ensure_connected(&self, namespace: &str) -> Result<()>;

    /// Flush and close; always safe to call
    async fn disconnect(&self);

    /// Publish a signed account JWT
    async fn upload_claims(&self, jwt: &str) -> Result<()>;

    /// Submit a signed account deletion claim
    async fn delete_claims(&self, jwt: &str) -> Result<()>;

    /// Currently published JWT for `account_id`; empty when the cluster has none
    async fn lookup_claims(&self, account_id: &str) -> Result<String>;
}

enum Slot {
    Disconnected,
    Connecting,
    Connected(Client),
}

/// [`ClusterControl`] over an `async-nats` connection
pub struct NatsClusterClient {
    config: ClusterConfig,
    vault: KeyVault,
    slot: Mutex<Slot>,
    /// Held for the duration of one connect attempt
    connect_gate: Mutex<()>,
}

impl NatsClusterClient {
    pub fn new(config: ClusterConfig, vault: KeyVault) -> Self {
        Self {
            config,
            vault,
            slot: Mutex::new(Slot::Disconnected),
            connect_gate: Mutex::new(()),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        match &*self.slot.lock().await {
            Slot::Disconnected => ConnectionState::Disconnected,
            Slot::Connecting => ConnectionState::Connecting,
            Slot::Connected(_) => ConnectionState::Connected,
        }
    }

    async fn connect(&self, namespace: &str) -> Result<Client> {
        let creds = self.vault.system_credentials(namespace).await?;
        let backoff = self.config.reconnect_backoff;
        let options = ConnectOptions::with_credentials(&keys::format_credentials(
            &creds.jwt,
            &creds.seed,
        ))
        .map_err(|e| NauthError::Nats(format!("Invalid system credentials: {e}")))?
        .name(&self.config.name)
        .connection_timeout(self.config.request_timeout)
        .max_reconnects(self.config.reconnect_attempts)
        .reconnect_delay_callback(move |_attempt| backoff);

        options
            .connect(&self.config.url)
            .await
            .map_err(|e| NauthError::Nats(format!("Failed to connect to {}: {e}", self.config.url)))
    }

    async fn client(&self) -> Result<Client> {
        match &*self.slot.lock().await {
            Slot::Connected(client) => Ok(client.clone()),
            _ => Err(NauthError::NotConnected),
        }
    }

    /// Request/response with the configured timeout
    async fn request(&self, subject: String, payload: Bytes) -> Result<async_nats::Message> {
        let client = self.client().await?;
        tokio::time::timeout(
            self.config.request_timeout,
            client.request(subject.clone(), payload),
        )
        .await
        .map_err(|_| NauthError::Timeout(format!("request to {subject}")))?
        .map_err(|e| NauthError::Nats(format!("Request to {subject} failed: {e}")))
    }

    async fn submit(&self, subject: &str, jwt: &str) -> Result<()> {
        let reply = self
            .request(subject.to_string(), Bytes::from(jwt.to_string()))
            .await?;
        let data = ServerApiResponse::parse(&reply.payload)?.into_result()?;
        debug!(subject = %subject, message = %data.message, "Control-plane request accepted");
        Ok(())
    }
}

#[async_trait::async_trait]
impl ClusterControl for NatsClusterClient {
    async fn ensure_connected(&self, namespace: &str) -> Result<()> {
        let _attempt = self.connect_gate.lock().await;
        {
            let mut slot = self.slot.lock().await;
            if matches!(*slot, Slot::Connected(_)) {
                return Ok(());
            }
            *slot = Slot::Connecting;
        }

        debug!(url = %self.config.url, "Connecting to NATS control plane");
        let connected = self.connect(namespace).await;

        let mut slot = self.slot.lock().await;
        match connected {
            Ok(client) if matches!(*slot, Slot::Connecting) => {
                info!(url = %self.config.url, "Connected to NATS control plane");
                *slot = Slot::Connected(client);
                Ok(())
            }
            Ok(_) => {
                debug!("Disconnect requested while connecting, dropping new connection");
                Err(NauthError::NotConnected)
            }
            Err(e) => {
                *slot = Slot::Disconnected;
                Err(e)
            }
        }
    }

    async fn disconnect(&self) {
        let previous = std::mem::replace(&mut *self.slot.lock().await, Slot::Disconnected);
        if let Slot::Connected(client) = previous {
            if let Err(e) = client.flush().await {
                warn!(error = %e, "Failed to flush NATS connection before close");
            }
            debug!("Disconnected from NATS control plane");
        }
    }

    async fn upload_claims(&self, jwt: &str) -> Result<()> {
        self.submit(CLAIMS_UPDATE_SUBJECT, jwt).await
    }

    async fn delete_claims(&self, jwt: &str) -> Result<()> {
        self.submit(CLAIMS_DELETE_SUBJECT, jwt).await
    }

    async fn lookup_claims(&self, account_id: &str) -> Result<String> {
        let reply = self
            .request(claims_lookup_subject(account_id), Bytes::new())
            .await?;
        String::from_utf8(reply.payload.to_vec())
            .map_err(|e| NauthError::Nats(format!("Lookup reply is not UTF-8: {e}")))
    }
}
