//! Backend reconciliation tests against a scripted transport.

use async_trait::async_trait;
use mentor_state::keys::{JobSearch, Online, System};
use mentor_state::{
    ApiMethod, ApiRequest, MemoryStorage, Reconciliation, Result, StateDocument, StateError,
    StateStore, StoreConfig, SyncConfig, SyncCoordinator, Timestamp, Transport,
    DEFAULT_STORAGE_KEY,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PRIMARY: &str = "http://primary.test";
const FALLBACKS: &[&str] = &["http://fallback-1.test", "http://fallback-2.test"];

/// Records every request and answers from a per-URL script. URLs without
/// an entry fail as unreachable.
#[derive(Default)]
struct MockTransport {
    calls: Mutex<Vec<ApiRequest>>,
    responses: Mutex<HashMap<String, Value>>,
}

impl MockTransport {
    fn respond(&self, url: &str, body: Value) {
        self.responses.lock().insert(url.to_string(), body);
    }

    fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().clone()
    }

    fn urls(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.url).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value> {
        self.calls.lock().push(request.clone());
        self.responses
            .lock()
            .get(&request.url)
            .cloned()
            .ok_or_else(|| StateError::Transport(format!("connection refused: {}", request.url)))
    }
}

/// Backend that answers a sync by echoing the pushed state back, and
/// refuses every request while switched offline.
#[derive(Default)]
struct EchoTransport {
    offline: AtomicBool,
}

#[async_trait]
impl Transport for EchoTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StateError::Transport(format!(
                "connection refused: {}",
                request.url
            )));
        }
        let state = request
            .body
            .and_then(|body| body.get("state").cloned())
            .unwrap_or(Value::Null);
        Ok(json!({"success": true, "state": state}))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn config() -> SyncConfig {
    SyncConfig {
        primary_url: PRIMARY.into(),
        fallback_urls: FALLBACKS.iter().map(|s| s.to_string()).collect(),
        request_timeout: Duration::from_secs(1),
    }
}

fn setup() -> (SyncCoordinator, Arc<MockTransport>, MemoryStorage) {
    init_tracing();
    let storage = MemoryStorage::new();
    let store = StateStore::open(StoreConfig::default(), Arc::new(storage.clone()));
    let transport = Arc::new(MockTransport::default());
    let sync = SyncCoordinator::with_transport(store, config(), transport.clone()).unwrap();
    (sync, transport, storage)
}

fn remote_doc(user_id: &str, last_sync: Option<i64>) -> StateDocument {
    let mut doc = StateDocument::default();
    doc.user.id = user_id.into();
    doc.agent_knowledge.job_search.recent_searches = vec!["remote query".into()];
    doc.system.last_sync_time = last_sync.map(Timestamp);
    doc
}

// --- Fallback ---

#[tokio::test]
async fn test_all_candidates_fail() {
    let (sync, transport, _) = setup();

    let outcome = sync.sync_with_backend().await;
    assert!(!outcome.success);
    assert!(outcome.message.starts_with("Sync failed"));
    // The primary's error is the one surfaced
    assert!(outcome.message.contains("primary.test"));

    assert_eq!(
        transport.urls(),
        vec![
            "http://primary.test/global-state/sync",
            "http://fallback-1.test/global-state/sync",
            "http://fallback-2.test/global-state/sync",
        ]
    );
    assert!(!sync.store().select_nested::<Online>());
}

#[tokio::test]
async fn test_fallback_success_stops_loop() {
    let (sync, transport, _) = setup();
    transport.respond(
        "http://fallback-1.test/global-state/sync",
        json!({"success": true}),
    );

    let outcome = sync.sync_with_backend().await;
    assert!(outcome.success);
    assert_eq!(transport.calls().len(), 2);
    assert!(sync.store().select_nested::<Online>());
}

#[tokio::test]
async fn test_online_flag_recovers() {
    let (sync, transport, _) = setup();

    sync.sync_with_backend().await;
    assert!(!sync.store().select_nested::<Online>());

    transport.respond(
        "http://primary.test/global-state/sync",
        json!({"success": true}),
    );
    sync.sync_with_backend().await;
    assert!(sync.store().select_nested::<Online>());
}

// --- Push ---

#[tokio::test]
async fn test_push_sends_state_and_stamps_sync_time() {
    let (sync, transport, storage) = setup();
    sync.store().set_user_id("u-local");
    sync.store().set_session_value("secret", json!("never sent"));
    transport.respond(
        "http://primary.test/global-state/sync",
        json!({"success": true, "message": "stored"}),
    );

    let outcome = sync.sync_with_backend().await;
    assert!(outcome.success);
    assert_eq!(outcome.message, "stored");

    let calls = transport.calls();
    assert_eq!(calls[0].method, ApiMethod::Post);
    let body = calls[0].body.as_ref().unwrap();
    assert_eq!(body["state"]["user"]["id"], json!("u-local"));
    assert!(body["state"].get("session").is_none());

    let sent_time = body["state"]["system"]["lastSyncTime"].as_i64().unwrap();
    assert_eq!(
        sync.store().select::<System>().last_sync_time,
        Some(Timestamp(sent_time))
    );
    assert!(storage.raw(DEFAULT_STORAGE_KEY).unwrap().contains(&sent_time.to_string()));
    assert_eq!(sync.store().get_session_value("secret"), Some(json!("never sent")));
}

#[tokio::test]
async fn test_push_adopts_returned_state() {
    let (sync, transport, _) = setup();
    let remote = remote_doc("u-remote", Some(5_000));
    transport.respond(
        "http://primary.test/global-state/sync",
        json!({"success": true, "state": remote}),
    );

    assert!(sync.sync_with_backend().await.success);
    assert_eq!(sync.store().get_state(), remote);
}

#[tokio::test]
async fn test_malformed_sync_response() {
    let (sync, transport, _) = setup();
    sync.store().set_user_id("u-keep");

    transport.respond("http://primary.test/global-state/sync", json!({"state": {}}));
    let outcome = sync.sync_with_backend().await;
    assert!(!outcome.success);
    assert_eq!(sync.store().user_id(), "u-keep");
    assert_eq!(sync.store().select::<System>().last_sync_time, None);

    transport.respond("http://primary.test/global-state/sync", json!("ok"));
    assert!(!sync.sync_with_backend().await.success);

    transport.respond(
        "http://primary.test/global-state/sync",
        json!({"success": false, "message": "quota exceeded"}),
    );
    let outcome = sync.sync_with_backend().await;
    assert!(!outcome.success);
    assert_eq!(outcome.message, "quota exceeded");
}

#[tokio::test]
async fn test_invalid_remote_section_is_reset() {
    let (sync, transport, _) = setup();
    transport.respond(
        "http://primary.test/global-state/sync",
        json!({
            "success": true,
            "state": {
                "user": {"id": "u-remote"},
                "agentKnowledge": {"applications": ["not", "a", "map"]}
            }
        }),
    );

    assert!(sync.sync_with_backend().await.success);
    let state = sync.store().get_state();
    assert_eq!(state.user.id, "u-remote");
    assert!(state.agent_knowledge.applications.is_empty());
}

#[tokio::test]
async fn test_echoed_state_keeps_online_flag() {
    init_tracing();
    let store = StateStore::open(StoreConfig::default(), Arc::new(MemoryStorage::new()));
    let transport = Arc::new(EchoTransport::default());
    let sync = SyncCoordinator::with_transport(Arc::clone(&store), config(), transport.clone())
        .unwrap();
    store.set_user_id("u-echo");

    transport.offline.store(true, Ordering::SeqCst);
    assert!(!sync.sync_with_backend().await.success);
    assert!(!store.select_nested::<Online>());

    // The pushed snapshot still says offline; the backend echoes it back
    transport.offline.store(false, Ordering::SeqCst);
    let outcome = sync.sync_with_backend().await;
    assert!(outcome.success);
    assert!(store.select_nested::<Online>());
    assert_eq!(store.user_id(), "u-echo");
    assert!(store.select::<System>().last_sync_time.is_some());
}

// --- Pull ---

#[tokio::test]
async fn test_get_backend_state() {
    let (sync, transport, _) = setup();
    let remote = remote_doc("u-remote", Some(10));
    transport.respond(
        "http://primary.test/global-state",
        json!({"success": true, "state": remote}),
    );

    let backend = sync.get_backend_state().await;
    assert!(backend.success);
    assert_eq!(backend.state, Some(remote));
    assert_eq!(transport.calls()[0].method, ApiMethod::Get);
    assert_eq!(transport.calls()[0].body, None);
    // Fetching never touches local state
    assert_eq!(sync.store().user_id(), mentor_state::DEFAULT_USER_ID);
}

#[tokio::test]
async fn test_get_backend_state_without_state() {
    let (sync, transport, _) = setup();
    transport.respond(
        "http://primary.test/global-state",
        json!({"success": true}),
    );

    let backend = sync.get_backend_state().await;
    assert!(!backend.success);
    assert_eq!(backend.state, None);
}

// --- Knowledge push ---

#[tokio::test]
async fn test_update_knowledge() {
    let (sync, transport, _) = setup();
    transport.respond(
        "http://primary.test/global-state/knowledge",
        json!({"success": true}),
    );

    sync.store().add_search_query("rust", 3);
    let outcome = sync.push_knowledge::<JobSearch>().await;
    assert!(outcome.success);

    let body = transport.calls()[0].body.clone().unwrap();
    assert_eq!(body["key"], json!("jobSearch"));
    assert_eq!(body["value"]["recentSearches"], json!(["rust"]));
}

#[tokio::test]
async fn test_update_knowledge_failure() {
    let (sync, transport, _) = setup();

    let outcome = sync.update_knowledge("userProfile", json!({"name": "Ada"})).await;
    assert!(!outcome.success);
    assert!(outcome.message.starts_with("Update failed"));
    assert_eq!(transport.calls().len(), 1 + FALLBACKS.len());
}

// --- Startup reconciliation ---

#[tokio::test]
async fn test_initialize_pulls_newer_remote() {
    let (sync, transport, _) = setup();
    sync.store()
        .update::<System, _, _>(|system| system.last_sync_time = Some(Timestamp(1_000)), true);
    sync.store().set_session_value("tab", json!("jobs"));

    let remote = remote_doc("u-remote", Some(2_000));
    transport.respond(
        "http://primary.test/global-state",
        json!({"success": true, "state": remote}),
    );

    assert_eq!(sync.initialize().await, Reconciliation::PulledRemote);
    assert_eq!(sync.store().get_state(), StateDocument {
        session: sync.store().get_state().session,
        ..remote
    });
    assert_eq!(sync.store().get_session_value("tab"), Some(json!("jobs")));
    // No push after a pull
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test]
async fn test_initialize_pushes_when_local_is_newer() {
    let (sync, transport, _) = setup();
    sync.store().set_user_id("u-local");
    sync.store()
        .update::<System, _, _>(|system| system.last_sync_time = Some(Timestamp(2_000)), true);
    let before = sync.store().get_state();

    transport.respond(
        "http://primary.test/global-state",
        json!({"success": true, "state": remote_doc("u-remote", Some(2_000))}),
    );
    transport.respond(
        "http://primary.test/global-state/sync",
        json!({"success": true}),
    );

    match sync.initialize().await {
        Reconciliation::PushedLocal(outcome) => assert!(outcome.success),
        other => panic!("expected push, got {other:?}"),
    }

    let after = sync.store().get_state();
    assert_eq!(after.user, before.user);
    assert_eq!(after.agent_knowledge, before.agent_knowledge);
    assert!(after.system.last_sync_time > before.system.last_sync_time);

    let urls = transport.urls();
    assert_eq!(
        urls,
        vec![
            "http://primary.test/global-state",
            "http://primary.test/global-state/sync",
        ]
    );
}

#[tokio::test]
async fn test_pulled_state_keeps_online_flag() {
    let (sync, transport, _) = setup();
    let mut remote = remote_doc("u-remote", Some(2_000));
    remote.system.is_online = false;
    transport.respond(
        "http://primary.test/global-state",
        json!({"success": true, "state": remote}),
    );

    assert_eq!(sync.initialize().await, Reconciliation::PulledRemote);
    assert_eq!(sync.store().user_id(), "u-remote");
    assert!(sync.store().select_nested::<Online>());
}

#[tokio::test]
async fn test_initialize_never_synced_pulls() {
    let (sync, transport, _) = setup();
    transport.respond(
        "http://primary.test/global-state",
        json!({"success": true, "state": remote_doc("u-remote", None)}),
    );

    assert_eq!(sync.initialize().await, Reconciliation::PulledRemote);
    assert_eq!(sync.store().user_id(), "u-remote");
}

#[tokio::test]
async fn test_initialize_offline_pushes() {
    let (sync, transport, _) = setup();
    sync.store().set_user_id("u-local");

    match sync.initialize().await {
        Reconciliation::PushedLocal(outcome) => assert!(!outcome.success),
        other => panic!("expected push, got {other:?}"),
    }

    assert_eq!(transport.calls().len(), 2 * (1 + FALLBACKS.len()));
    assert_eq!(sync.store().user_id(), "u-local");
}

#[tokio::test]
async fn test_initialize_waits_for_store() {
    init_tracing();
    let storage = MemoryStorage::new();
    storage.insert_raw(
        DEFAULT_STORAGE_KEY,
        r#"{"user":{"id":"u-disk"},"system":{"lastSyncTime":9000}}"#,
    );
    let store = Arc::new(StateStore::new(
        StoreConfig::default(),
        Arc::new(storage),
    ));
    let transport = Arc::new(MockTransport::default());
    transport.respond(
        "http://primary.test/global-state",
        json!({"success": true, "state": remote_doc("u-remote", Some(100))}),
    );
    transport.respond(
        "http://primary.test/global-state/sync",
        json!({"success": true}),
    );
    let sync = SyncCoordinator::with_transport(Arc::clone(&store), config(), transport.clone())
        .unwrap();

    let load = store.spawn_load();
    let result = sync.initialize().await;
    load.await.unwrap();

    assert!(matches!(result, Reconciliation::PushedLocal(ref o) if o.success));
    assert_eq!(store.user_id(), "u-disk");
    let pushed = transport.calls()[1].body.clone().unwrap();
    assert_eq!(pushed["state"]["user"]["id"], json!("u-disk"));
}

#[test]
fn test_invalid_config_rejected() {
    let store = StateStore::open(StoreConfig::default(), Arc::new(MemoryStorage::new()));
    let config = SyncConfig {
        primary_url: "ftp://primary.test".into(),
        ..config()
    };

    let result = SyncCoordinator::with_transport(store, config, Arc::new(MockTransport::default()));
    assert!(matches!(result, Err(StateError::InvalidConfig(_))));
}
