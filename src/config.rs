//! Configuration for nauth
//!
//! CLI arguments and environment variable handling using clap. Only the
//! composition root reads these; the engine receives explicit values.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::nats::ClusterConfig;

/// nauth - credential lifecycle engine for multi-tenant NATS clusters
#[derive(Parser, Debug, Clone)]
#[command(name = "nauth")]
#[command(about = "Issues, rotates and revokes NATS account and user credentials")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// Namespace holding the operator signing key and system credentials;
    /// also the default for manifests without a namespace
    #[arg(long, env = "NAUTH_NAMESPACE", default_value = "nauth-system")]
    pub namespace: String,

    /// Root directory of the file-backed secret store
    #[arg(long, env = "SECRETS_DIR", default_value = "./secrets")]
    pub secrets_dir: PathBuf,

    /// Deadline for a single reconcile operation in seconds
    #[arg(long, env = "OPERATION_TIMEOUT_SECS", default_value = "30")]
    pub operation_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Reconcile every Account and User manifest in a directory
    Reconcile {
        /// Directory of Account/User manifests (YAML or JSON)
        #[arg(long, env = "MANIFESTS_DIR", default_value = "./manifests")]
        manifests_dir: PathBuf,
    },
    /// Print the claims currently published for an account
    Lookup {
        /// Account public id
        account_id: String,
    },
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// Control-plane request timeout in milliseconds
    #[arg(long, env = "NATS_REQUEST_TIMEOUT_MS", default_value = "3000")]
    pub nats_request_timeout_ms: u64,

    /// Reconnect attempts after a dropped connection
    #[arg(long, env = "NATS_RECONNECT_ATTEMPTS", default_value = "10")]
    pub nats_reconnect_attempts: usize,

    /// Delay between reconnect attempts in milliseconds
    #[arg(long, env = "NATS_RECONNECT_BACKOFF_MS", default_value = "2000")]
    pub nats_reconnect_backoff_ms: u64,
}

impl NatsArgs {
    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            url: self.nats_url.clone(),
            request_timeout: Duration::from_millis(self.nats_request_timeout_ms),
            reconnect_attempts: self.nats_reconnect_attempts,
            reconnect_backoff: Duration::from_millis(self.nats_reconnect_backoff_ms),
            name: "nauth".to_string(),
        }
    }
}

impl Args {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.namespace.trim().is_empty() {
            return Err("NAUTH_NAMESPACE must not be empty".to_string());
        }

        if !self.nats.nats_url.starts_with("nats://")
            && !self.nats.nats_url.starts_with("tls://")
            && !self.nats.nats_url.starts_with("ws://")
            && !self.nats.nats_url.starts_with("wss://")
        {
            return Err(format!("Unsupported NATS_URL scheme: {}", self.nats.nats_url));
        }

        if self.nats.nats_request_timeout_ms == 0 {
            return Err("NATS_REQUEST_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.operation_timeout_secs == 0 {
            return Err("OPERATION_TIMEOUT_SECS must be greater than zero".to_string());
        }

        Ok(())
    }
}
