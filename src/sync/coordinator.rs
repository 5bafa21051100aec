//! Reconciliation client between the local store and the backend.

use super::config::SyncConfig;
use super::transport::{ApiMethod, ApiRequest, HttpTransport, Transport};
use crate::error::{Result, StateError};
use crate::state::keys::{Knowledge, NestedSection, Online, System};
use crate::state::merge_validated;
use crate::store::StateStore;
use crate::types::{StateDocument, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Full-document reconciliation endpoint.
pub const SYNC_PATH: &str = "/global-state/sync";

/// Backend state endpoint.
pub const STATE_PATH: &str = "/global-state";

/// Single knowledge key endpoint.
pub const KNOWLEDGE_PATH: &str = "/global-state/knowledge";

/// Result of a push to the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
}

impl SyncOutcome {
    fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Result of fetching the backend's copy of the document.
#[derive(Clone, Debug, PartialEq)]
pub struct BackendState {
    pub success: bool,
    pub state: Option<StateDocument>,
    pub message: Option<String>,
}

impl BackendState {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            state: None,
            message: Some(message.into()),
        }
    }
}

/// What `initialize` did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reconciliation {
    /// The backend copy was newer and replaced local state.
    PulledRemote,
    /// Local state was pushed to the backend.
    PushedLocal(SyncOutcome),
}

/// Response body shared by the three endpoints.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    state: Option<Value>,
}

impl ApiResponse {
    fn decode(raw: Value) -> Result<Self> {
        serde_json::from_value(raw).map_err(|e| StateError::InvalidResponse(e.to_string()))
    }
}

/// Reconciles the local [`StateStore`] with the backend over HTTP.
///
/// Every request tries the primary base URL, then each fallback in order,
/// and stops at the first success. Public methods never return errors:
/// failures are folded into the `success: false` results.
pub struct SyncCoordinator {
    store: Arc<StateStore>,
    transport: Arc<dyn Transport>,
    config: SyncConfig,
}

impl SyncCoordinator {
    /// Create a coordinator using the `reqwest` transport.
    pub fn new(store: Arc<StateStore>, config: SyncConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.request_timeout)?;
        Self::with_transport(store, config, Arc::new(transport))
    }

    /// Create a coordinator with a custom transport.
    pub fn with_transport(
        store: Arc<StateStore>,
        config: SyncConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            transport,
            config,
        })
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Push the local document and adopt the backend's copy if it sends one.
    ///
    /// The payload carries `system.lastSyncTime = now`. When the backend
    /// answers without a state, the local `lastSyncTime` is advanced to the
    /// same value.
    pub async fn sync_with_backend(&self) -> SyncOutcome {
        match self.try_sync().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Error syncing with backend");
                SyncOutcome::failure(format!("Sync failed: {e}"))
            }
        }
    }

    async fn try_sync(&self) -> Result<SyncOutcome> {
        self.store.wait_for_initialization().await;

        let now = Timestamp::now();
        let mut snapshot = self.store.get_state();
        snapshot.system.last_sync_time = Some(now);

        let raw = self
            .request(ApiMethod::Post, SYNC_PATH, Some(json!({ "state": snapshot })))
            .await?;
        let response = ApiResponse::decode(raw)?;
        debug!(success = ?response.success, "Sync response");

        match response.success {
            None => {
                return Ok(SyncOutcome::failure(
                    "Sync failed: response is missing `success`",
                ))
            }
            Some(false) => {
                return Ok(SyncOutcome::failure(
                    response
                        .message
                        .unwrap_or_else(|| "Sync rejected by backend".to_string()),
                ))
            }
            Some(true) => {}
        }

        match response.state {
            Some(remote) => {
                let (doc, report) = merge_validated(&StateDocument::default(), &remote);
                if !report.is_clean() {
                    warn!(quarantined = ?report.quarantined, "Backend state had invalid sections");
                }
                self.adopt(doc);
            }
            None => {
                self.store
                    .update::<System, _, _>(|system| system.last_sync_time = Some(now), true);
            }
        }

        Ok(SyncOutcome::success(
            response
                .message
                .unwrap_or_else(|| "Sync successful".to_string()),
        ))
    }

    /// Fetch the backend's copy of the document without touching local state.
    pub async fn get_backend_state(&self) -> BackendState {
        match self.try_get_backend_state().await {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "Error getting backend state");
                BackendState::failure(format!("Failed to get backend state: {e}"))
            }
        }
    }

    async fn try_get_backend_state(&self) -> Result<BackendState> {
        let raw = self.request(ApiMethod::Get, STATE_PATH, None).await?;
        let response = ApiResponse::decode(raw)?;

        match (response.success, response.state) {
            (Some(true), Some(remote)) => {
                let (doc, report) = merge_validated(&StateDocument::default(), &remote);
                if !report.is_clean() {
                    warn!(quarantined = ?report.quarantined, "Backend state had invalid sections");
                }
                Ok(BackendState {
                    success: true,
                    state: Some(doc),
                    message: response.message,
                })
            }
            _ => Ok(BackendState::failure(
                response
                    .message
                    .unwrap_or_else(|| "Failed to get backend state".to_string()),
            )),
        }
    }

    /// Push a single knowledge key, independent of full-document sync.
    pub async fn update_knowledge(&self, key: &str, value: Value) -> SyncOutcome {
        let body = json!({ "key": key, "value": value });

        let result = async {
            let raw = self.request(ApiMethod::Post, KNOWLEDGE_PATH, Some(body)).await?;
            ApiResponse::decode(raw)
        }
        .await;

        match result {
            Ok(response) => SyncOutcome {
                success: response.success.unwrap_or(false),
                message: response
                    .message
                    .unwrap_or_else(|| "Update successful".to_string()),
            },
            Err(e) => {
                error!(key = %key, error = %e, "Error updating knowledge");
                SyncOutcome::failure(format!("Update failed: {e}"))
            }
        }
    }

    /// Push the local value of one knowledge sub-tree under its field name.
    pub async fn push_knowledge<N>(&self) -> SyncOutcome
    where
        N: NestedSection<Parent = Knowledge>,
    {
        let value = match serde_json::to_value(self.store.get_knowledge::<N>()) {
            Ok(value) => value,
            Err(e) => return SyncOutcome::failure(format!("Update failed: {e}")),
        };
        self.update_knowledge(N::NAME, value).await
    }

    /// Startup reconciliation.
    ///
    /// Waits for the store, then compares `system.lastSyncTime` on both
    /// sides. The backend copy replaces local state when it is strictly
    /// newer, or when the local copy has never synced; otherwise local state
    /// is pushed. Whole documents win or lose, nothing is merged per field.
    pub async fn initialize(&self) -> Reconciliation {
        info!("Initializing state sync");
        self.store.wait_for_initialization().await;

        let backend = self.get_backend_state().await;
        let remote = match backend.state {
            Some(remote) if backend.success => remote,
            _ => {
                let outcome = self.sync_with_backend().await;
                info!(success = outcome.success, "Backend state unavailable, pushed local state");
                return Reconciliation::PushedLocal(outcome);
            }
        };

        let local_time = self.store.get_state().system.last_sync_time;
        let remote_time = remote.system.last_sync_time;

        if remote_is_newer(local_time, remote_time) {
            self.adopt(remote);
            info!(local = ?local_time, remote = ?remote_time, "Replaced local state with backend state");
            Reconciliation::PulledRemote
        } else {
            let outcome = self.sync_with_backend().await;
            info!(local = ?local_time, remote = ?remote_time, success = outcome.success, "Pushed local state to backend");
            Reconciliation::PushedLocal(outcome)
        }
    }

    /// Send one request, trying each candidate base URL in turn.
    ///
    /// Returns the first success, or the primary's error when every
    /// candidate failed.
    async fn request(&self, method: ApiMethod, path: &str, body: Option<Value>) -> Result<Value> {
        let mut primary_error = None;

        for (attempt, base) in self.config.candidates().into_iter().enumerate() {
            let request = ApiRequest {
                method,
                url: format!("{base}{path}"),
                body: body.clone(),
            };
            debug!(url = %request.url, attempt, "Sending state request");

            match self.transport.send(request).await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(url = %base, "Succeeded with fallback URL");
                    }
                    self.set_online(true);
                    return Ok(value);
                }
                Err(e) => {
                    warn!(url = %base, error = %e, "Request failed");
                    primary_error.get_or_insert(e);
                }
            }
        }

        self.set_online(false);
        Err(primary_error
            .unwrap_or_else(|| StateError::InvalidConfig("No candidate URLs".to_string())))
    }

    /// Replace local state with a document the backend just sent.
    ///
    /// `isOnline` is local status, so a remote or echoed value never
    /// overrides the fact that the backend was reached.
    fn adopt(&self, mut doc: StateDocument) {
        doc.system.is_online = true;
        self.store.update_entire_state(doc);
    }

    fn set_online(&self, online: bool) {
        if self.store.select_nested::<Online>() != online {
            self.store
                .update_nested::<Online, _, _>(|is_online| *is_online = online, false);
        }
    }
}

/// Last-writer-wins on the scalar sync timestamp. A local copy that never
/// synced loses to any backend copy.
fn remote_is_newer(local: Option<Timestamp>, remote: Option<Timestamp>) -> bool {
    match (local, remote) {
        (None, _) => true,
        (Some(local), Some(remote)) => remote > local,
        (Some(_), None) => false,
    }
}
