//! Main StateStore struct tying storage, merge and subscriptions together.

use crate::error::Result;
use crate::state::keys::{self, Knowledge};
use crate::state::{merge_validated, MergeReport, NestedSection, Section};
use crate::storage::StateStorage;
use crate::subscriptions::{EventHandle, StateEvent, SubscriptionId, SubscriptionManager};
use crate::types::{StateDocument, DEFAULT_RECENT_SEARCH_LIMIT};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, warn};

/// Storage key holding the serialized document.
pub const DEFAULT_STORAGE_KEY: &str = "career_mentor_global_state";

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Key the document is persisted under.
    pub storage_key: String,

    /// Maximum number of entries in `recentSearches`.
    pub recent_search_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            recent_search_limit: DEFAULT_RECENT_SEARCH_LIMIT,
        }
    }
}

/// The application state store.
///
/// Holds the in-memory [`StateDocument`], notifies subscribers of every
/// change and writes the whole document to storage after persisting
/// updates. Share it between tasks with an `Arc`.
///
/// Mutations apply synchronously and in call order. Storage failures are
/// logged and never roll back the in-memory change, so memory stays
/// authoritative until the next successful write.
pub struct StateStore {
    /// Store configuration.
    config: StoreConfig,

    /// Persistence backend.
    storage: Arc<dyn StateStorage>,

    /// Current document.
    state: RwLock<StateDocument>,

    /// Listeners and event channels.
    subscriptions: SubscriptionManager,

    /// Flipped to true once the persisted snapshot has been merged.
    initialized: watch::Sender<bool>,

    /// Serializes mutate, persist and notify. Reentrant so listeners can
    /// update the store from inside a notification.
    write_lock: ReentrantMutex<()>,
}

impl StateStore {
    /// Create a store holding the default document.
    ///
    /// The store is not initialized until [`load_persisted`](Self::load_persisted)
    /// has run.
    pub fn new(config: StoreConfig, storage: Arc<dyn StateStorage>) -> Self {
        let (initialized, _) = watch::channel(false);

        Self {
            config,
            storage,
            state: RwLock::new(StateDocument::default()),
            subscriptions: SubscriptionManager::new(),
            initialized,
            write_lock: ReentrantMutex::new(()),
        }
    }

    /// Create a store and load the persisted snapshot before returning.
    pub fn open(config: StoreConfig, storage: Arc<dyn StateStorage>) -> Arc<Self> {
        let store = Arc::new(Self::new(config, storage));
        store.load_persisted();
        store
    }

    /// Load the persisted snapshot on the blocking pool and mark the store
    /// initialized when done.
    pub fn spawn_load(self: &Arc<Self>) -> tokio::task::JoinHandle<MergeReport> {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || store.load_persisted())
    }

    /// Overlay the persisted snapshot onto the defaults.
    ///
    /// Always marks the store initialized, even when the snapshot is
    /// missing or unreadable; the defaults are used in that case.
    pub fn load_persisted(&self) -> MergeReport {
        let report = {
            let _guard = self.write_lock.lock();
            self.load_locked()
        };

        self.initialized.send_replace(true);
        report
    }

    fn load_locked(&self) -> MergeReport {
        let key = &self.config.storage_key;

        let raw = match self.storage.load(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %key, "No persisted state, using defaults");
                return MergeReport::default();
            }
            Err(e) => {
                error!(key = %key, error = %e, "Failed to read persisted state");
                return MergeReport::default();
            }
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Persisted state is not valid JSON, using defaults");
                return MergeReport {
                    quarantined: vec![String::new()],
                };
            }
        };

        let defaults = StateDocument {
            session: self.state.read().session.clone(),
            ..StateDocument::default()
        };
        let (doc, report) = merge_validated(&defaults, &value);

        let snapshot = {
            let mut state = self.state.write();
            *state = doc;
            state.clone()
        };

        self.subscriptions.notify(
            &snapshot,
            StateEvent::Loaded {
                quarantined: report.quarantined.clone(),
            },
        );
        report
    }

    /// Whether the persisted snapshot has been loaded.
    pub fn is_initialized(&self) -> bool {
        *self.initialized.borrow()
    }

    /// Resolve once the persisted snapshot has been loaded and merged.
    pub async fn wait_for_initialization(&self) {
        let mut ready = self.initialized.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = ready.wait_for(|initialized| *initialized).await;
    }

    /// Store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // --- Reads ---

    /// Snapshot of the current document.
    pub fn get_state(&self) -> StateDocument {
        self.state.read().clone()
    }

    /// Snapshot of one top-level section.
    pub fn select<K: Section>(&self) -> K::Value {
        K::get(&self.state.read()).clone()
    }

    /// Snapshot of one nested field.
    pub fn select_nested<N: NestedSection>(&self) -> N::Value {
        N::get(<N::Parent as Section>::get(&self.state.read())).clone()
    }

    // --- Subscriptions ---

    /// Register a listener.
    ///
    /// The listener is called once right away with the current document,
    /// then synchronously after every change until unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&StateDocument) + Send + Sync + 'static,
    {
        let _guard = self.write_lock.lock();
        let listener = Arc::new(listener);
        let id = self.subscriptions.subscribe(listener.clone());
        listener(&self.get_state());
        id
    }

    /// Register a listener on one top-level section.
    ///
    /// Called once right away with the section's value, then only when a
    /// change leaves the section different from what it last delivered.
    pub fn subscribe_to_key<K, F>(&self, listener: F) -> SubscriptionId
    where
        K: Section,
        F: Fn(&K::Value) + Send + Sync + 'static,
    {
        let last: Mutex<Option<K::Value>> = Mutex::new(None);

        self.subscribe(move |doc| {
            let value = K::get(doc);
            {
                let mut last = last.lock();
                if last.as_ref() == Some(value) {
                    return;
                }
                *last = Some(value.clone());
            }
            // Not holding `last`, the listener may update the store
            listener(value);
        })
    }

    /// Remove a listener or event channel.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions.unsubscribe(id)
    }

    /// Open a bounded channel of change events.
    pub fn events(&self, buffer_size: usize) -> EventHandle {
        self.subscriptions.open_channel(buffer_size)
    }

    // --- Updates ---

    /// Mutate one top-level section.
    ///
    /// Writes the whole document to storage when `persist` is set and the
    /// section is persistent. Returns whatever `updater` returns.
    pub fn update<K, F, R>(&self, updater: F, persist: bool) -> R
    where
        K: Section,
        F: FnOnce(&mut K::Value) -> R,
    {
        let persist = persist && K::PERSISTENT;
        let event = StateEvent::Changed {
            section: K::NAME.to_string(),
            field: None,
            persisted: persist,
        };

        self.mutate(event, persist, |doc| updater(K::get_mut(doc)))
    }

    /// Mutate a field one level below a top-level section.
    pub fn update_nested<N, F, R>(&self, updater: F, persist: bool) -> R
    where
        N: NestedSection,
        F: FnOnce(&mut N::Value) -> R,
    {
        let persist = persist && <N::Parent as Section>::PERSISTENT;
        let event = StateEvent::Changed {
            section: <N::Parent as Section>::NAME.to_string(),
            field: Some(N::NAME.to_string()),
            persisted: persist,
        };

        self.mutate(event, persist, |doc| {
            updater(N::get_mut(<N::Parent as Section>::get_mut(doc)))
        })
    }

    /// Replace one sub-tree of the agent knowledge and persist.
    pub fn set_knowledge<N>(&self, value: N::Value)
    where
        N: NestedSection<Parent = Knowledge>,
    {
        self.update_nested::<N, _, _>(|slot| *slot = value, true);
    }

    /// Snapshot of one sub-tree of the agent knowledge.
    pub fn get_knowledge<N>(&self) -> N::Value
    where
        N: NestedSection<Parent = Knowledge>,
    {
        self.select_nested::<N>()
    }

    /// Set a session value. Never persisted.
    pub fn set_session_value(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.update::<keys::Session, _, _>(
            |session| {
                session.insert(key, value);
            },
            false,
        );
    }

    /// Get a session value.
    pub fn get_session_value(&self, key: &str) -> Option<Value> {
        self.state.read().session.get(key).cloned()
    }

    /// Remove a session value, returning it.
    pub fn remove_session_value(&self, key: &str) -> Option<Value> {
        self.update::<keys::Session, _, _>(|session| session.remove(key), false)
    }

    /// Set the active user id and persist.
    pub fn set_user_id(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        self.update_nested::<keys::UserId, _, _>(|id| *id = user_id, true);
    }

    /// The active user id.
    pub fn user_id(&self) -> String {
        self.state.read().user.id.clone()
    }

    /// Replace the whole document without persisting.
    ///
    /// Reserved for backend reconciliation. Subscribers are notified; the
    /// local session bag is kept, since it never travels over the wire.
    pub fn update_entire_state(&self, mut doc: StateDocument) {
        self.mutate(StateEvent::Replaced, false, move |state| {
            doc.session = std::mem::take(&mut state.session);
            *state = doc;
        });
    }

    /// Reset to the default document and delete the persisted snapshot.
    pub fn reset_state(&self) {
        let _guard = self.write_lock.lock();

        let snapshot = {
            let mut state = self.state.write();
            *state = StateDocument::default();
            state.clone()
        };

        if let Err(e) = self.storage.remove(&self.config.storage_key) {
            warn!(key = %self.config.storage_key, error = %e, "Failed to remove persisted state");
        }

        self.subscriptions.notify(&snapshot, StateEvent::Reset);
    }

    /// Write the current document to storage now.
    pub fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        let snapshot = self.get_state();
        self.write_snapshot(&snapshot)
    }

    fn mutate<F, R>(&self, event: StateEvent, persist: bool, f: F) -> R
    where
        F: FnOnce(&mut StateDocument) -> R,
    {
        let _guard = self.write_lock.lock();

        let (result, snapshot) = {
            let mut state = self.state.write();
            let result = f(&mut state);
            (result, state.clone())
        };

        if persist {
            if let Err(e) = self.write_snapshot(&snapshot) {
                warn!(key = %self.config.storage_key, error = %e, "Failed to persist state");
            }
        }

        self.subscriptions.notify(&snapshot, event);
        result
    }

    fn write_snapshot(&self, doc: &StateDocument) -> Result<()> {
        let json = serde_json::to_string(doc)?;
        self.storage.save(&self.config.storage_key, &json)
    }
}
