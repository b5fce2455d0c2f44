//! nauth - credential lifecycle engine for multi-tenant NATS clusters
//!
//! Issues, rotates and revokes the signed identities (accounts and users)
//! a NATS cluster trusts. Invoked by an orchestration loop whenever an
//! Account or User resource is created, changed or deleted.
//!
//! ## Components
//!
//! - **Claims**: declarative spec to signed NATS JWT, validated as a whole
//! - **Vault**: key seeds and `.creds` bundles in a label-queryable secret store
//! - **NATS**: publish, revoke and look up claims on the cluster control plane
//! - **Account / User**: per-resource credential state machines
//! - **Orchestrator**: create/update/import/delete decisions, deletion guard

pub mod account;
pub mod claims;
pub mod config;
pub mod keys;
pub mod logging;
pub mod nats;
pub mod orchestrator;
pub mod spec;
pub mod types;
pub mod user;
pub mod vault;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Args;
pub use types::{NauthError, Result};
