//! Subscription system for live state updates.
//!
//! Two delivery modes share one id space:
//! - listeners: callbacks invoked synchronously with the new document, in
//!   subscription order
//! - event channels: bounded queues of [`StateEvent`]s; a subscriber whose
//!   buffer fills up is dropped
//!
//! # Example
//!
//! ```ignore
//! let manager = SubscriptionManager::new();
//!
//! let id = manager.subscribe(Arc::new(|doc: &StateDocument| {
//!     println!("user is now {}", doc.user.id);
//! }));
//!
//! let events = manager.open_channel(16);
//! while let Ok(event) = events.recv() {
//!     println!("{:?}", event);
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{DropReason, EventHandle, Listener, StateEvent, SubscriptionId};
