//! Lifecycle orchestration
//!
//! Wires the credential managers to desired-state resources:
//!
//! - `directory`: desired-state lookup, deletion guard input, import resolution
//! - `provider`: backend capability interface and cluster-ref routing
//! - `reconcile`: create / update / import / delete decisions and status write-back
//! - `manifest`: resources loaded from and written back to disk

pub mod directory;
pub mod manifest;
pub mod provider;
pub mod reconcile;

pub use directory::{AccountDirectory, InMemoryDirectory};
pub use manifest::{Manifest, Resource};
pub use provider::{AccountProvider, LocalNatsProvider, ProviderRegistry};
pub use reconcile::{plan_account, plan_user, AccountAction, Reconciler, UserAction};
