//! # Mentor State
//!
//! Client-side application state for the career mentor app: a single
//! document holding user identity, agent knowledge, session scratch data
//! and system status, persisted on device and reconciled with the backend.
//!
//! ## Core Concepts
//!
//! - **Store**: In-memory document with typed section keys, synchronous
//!   listeners and whole-document persistence
//! - **Merge**: Persisted or remote JSON is deep-merged onto the defaults,
//!   with invalid sections reset rather than failing the load
//! - **Session**: Process-lifetime values that are never persisted or synced
//! - **Sync**: Last-writer-wins reconciliation over HTTP with fallback URLs
//!
//! ## Example
//!
//! ```ignore
//! use mentor_state::{FileStorage, StateStore, StoreConfig, SyncConfig, SyncCoordinator};
//! use mentor_state::keys::Profile;
//!
//! let storage = FileStorage::open("./state")?;
//! let store = StateStore::open(StoreConfig::default(), Arc::new(storage));
//!
//! store.update_nested::<Profile, _, _>(|profile| profile.name = "Ada".into(), true);
//! store.add_search_query("rust engineer", 42);
//!
//! let sync = SyncCoordinator::new(Arc::clone(&store), SyncConfig::from_env()?)?;
//! sync.initialize().await;
//! ```

pub mod error;
mod knowledge;
pub mod state;
pub mod storage;
pub mod store;
pub mod subscriptions;
pub mod sync;
pub mod types;

// Re-exports
pub use error::{Result, StateError};
pub use state::{deep_merge, keys, merge_validated, MergeReport, NestedSection, Section};
pub use storage::{FileStorage, MemoryStorage, StateStorage};
pub use store::{StateStore, StoreConfig, DEFAULT_STORAGE_KEY};
pub use subscriptions::{
    DropReason, EventHandle, Listener, StateEvent, SubscriptionId, SubscriptionManager,
};
pub use sync::{
    ApiMethod, ApiRequest, BackendState, HttpTransport, Reconciliation, SyncConfig,
    SyncCoordinator, SyncOutcome, Transport,
};
pub use types::*;
