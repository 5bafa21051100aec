//! Reconciliation of the local store with the backend.
//!
//! The coordinator pushes and pulls whole documents over three endpoints:
//!
//! - `POST /global-state/sync` with `{ "state": <document> }`
//! - `GET /global-state`
//! - `POST /global-state/knowledge` with `{ "key": .., "value": .. }`
//!
//! Conflicts are resolved by comparing `system.lastSyncTime`; whichever
//! side is newer wins the whole document.

mod config;
mod coordinator;
mod transport;

pub use config::{SyncConfig, DEFAULT_FALLBACK_URLS, DEFAULT_PRIMARY_URL};
pub use coordinator::{
    BackendState, Reconciliation, SyncCoordinator, SyncOutcome, KNOWLEDGE_PATH, STATE_PATH,
    SYNC_PATH,
};
pub use transport::{ApiMethod, ApiRequest, HttpTransport, Transport};
