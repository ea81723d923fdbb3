//! In-process fake of the remote sync service.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value as JsonValue};
use tokio::task::JoinHandle;

use xuanji_core::{
    CacheConfig, CacheLayer, Hexagram, RemoteClient, Row, Store, SyncEngine, SyncSettings,
    SyncTables,
};

#[derive(Debug)]
pub struct RemoteState {
    pub healthy: bool,
    pub health_delay: Option<Duration>,
    pub versions: BTreeMap<String, String>,
    pub snapshots: BTreeMap<String, Vec<JsonValue>>,
    /// `GET /data/{table}` answers 500 for these.
    pub failing_tables: BTreeSet<String>,
    /// `GET /data/{table}` answers 304 for these.
    pub unchanged_tables: BTreeSet<String>,
    pub data_requests: Vec<(String, Option<String>)>,
    pub pushed_records: BTreeMap<String, Vec<JsonValue>>,

    /// Served by `GET /sync/changes`.
    pub changes: Vec<JsonValue>,
    pub changes_requests: Vec<Option<String>>,
    pub fail_changes_download: bool,

    /// Accepted changes, upserted by `(table, record_id)`.
    pub accepted: BTreeMap<(String, String), JsonValue>,
    /// `(table, batch size)` per upload request.
    pub upload_requests: Vec<(String, usize)>,
    /// Persist the next upload, then answer 500 anyway.
    pub drop_next_upload_response: bool,
    /// Reject every upload without persisting it.
    pub reject_uploads: bool,
}

impl Default for RemoteState {
    fn default() -> Self {
        Self {
            healthy: true,
            health_delay: None,
            versions: BTreeMap::new(),
            snapshots: BTreeMap::new(),
            failing_tables: BTreeSet::new(),
            unchanged_tables: BTreeSet::new(),
            data_requests: Vec::new(),
            pushed_records: BTreeMap::new(),
            changes: Vec::new(),
            changes_requests: Vec::new(),
            fail_changes_download: false,
            accepted: BTreeMap::new(),
            upload_requests: Vec::new(),
            drop_next_upload_response: false,
            reject_uploads: false,
        }
    }
}

impl RemoteState {
    pub fn with_table(mut self, table: &str, version: &str, records: Vec<JsonValue>) -> Self {
        self.versions.insert(table.to_string(), version.to_string());
        self.snapshots.insert(table.to_string(), records);
        self
    }
}

type Shared = Arc<Mutex<RemoteState>>;

pub struct FakeRemote {
    pub url: String,
    pub state: Shared,
    handle: JoinHandle<()>,
}

impl FakeRemote {
    pub async fn spawn(state: RemoteState) -> Self {
        let state = Arc::new(Mutex::new(state));
        let app = Router::new()
            .route("/health", get(health))
            .route("/versions", get(versions))
            .route("/data/{table}", get(download_table).post(push_records))
            .route("/sync/changes", get(download_changes))
            .route("/sync/changes/{table}", axum::routing::post(upload_changes))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { url, state, handle }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut RemoteState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

impl Drop for FakeRemote {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn if_modified_since(headers: &HeaderMap) -> Option<String> {
    headers
        .get("if-modified-since")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

async fn health(State(state): State<Shared>) -> StatusCode {
    let (healthy, delay) = {
        let s = state.lock().unwrap();
        (s.healthy, s.health_delay)
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn versions(State(state): State<Shared>) -> Json<JsonValue> {
    let s = state.lock().unwrap();
    Json(json!({ "versions": s.versions }))
}

async fn download_table(
    State(state): State<Shared>,
    Path(table): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut s = state.lock().unwrap();
    s.data_requests.push((table.clone(), if_modified_since(&headers)));

    if s.failing_tables.contains(&table) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if s.unchanged_tables.contains(&table) {
        return StatusCode::NOT_MODIFIED.into_response();
    }
    let records = s.snapshots.get(&table).cloned().unwrap_or_default();
    let version = s.versions.get(&table).cloned().unwrap_or_else(|| "0.0.0".into());
    Json(json!({ "records": records, "version": version })).into_response()
}

async fn push_records(
    State(state): State<Shared>,
    Path(table): Path<String>,
    Json(body): Json<JsonValue>,
) -> StatusCode {
    let mut s = state.lock().unwrap();
    let records = body["records"].as_array().cloned().unwrap_or_default();
    s.pushed_records.entry(table).or_default().extend(records);
    StatusCode::OK
}

async fn download_changes(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut s = state.lock().unwrap();
    s.changes_requests.push(if_modified_since(&headers));
    if s.fail_changes_download {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!({ "changes": s.changes })).into_response()
}

async fn upload_changes(
    State(state): State<Shared>,
    Path(table): Path<String>,
    Json(body): Json<JsonValue>,
) -> StatusCode {
    let mut s = state.lock().unwrap();
    let changes = body["changes"].as_array().cloned().unwrap_or_default();
    s.upload_requests.push((table.clone(), changes.len()));

    if s.reject_uploads {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    for change in changes {
        let record_id = change["record_id"].as_str().unwrap_or_default().to_string();
        s.accepted.insert((table.clone(), record_id), change);
    }
    if s.drop_next_upload_response {
        s.drop_next_upload_response = false;
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

pub async fn local() -> (Store, CacheLayer) {
    let store = Store::open_in_memory().await.unwrap();
    let cache = CacheLayer::new(&CacheConfig::default());
    (store, cache)
}

pub fn engine(store: &Store, cache: &CacheLayer, url: &str) -> SyncEngine {
    engine_with(store, cache, url, SyncSettings::default())
}

pub fn engine_with(
    store: &Store,
    cache: &CacheLayer,
    url: &str,
    settings: SyncSettings,
) -> SyncEngine {
    let client = RemoteClient::new(url, Some("test-key".into()), &settings).unwrap();
    SyncEngine::new(
        store.clone(),
        cache.clone(),
        client,
        SyncTables::standard(),
        settings,
    )
}

pub fn hexagram_json(id: i64, name: &str) -> JsonValue {
    serde_json::to_value(Hexagram::new(id, name, format!("{:06b}", id), 1, 1)).unwrap()
}

pub fn trigram_json(id: i64, name: &str) -> JsonValue {
    json!({
        "id": id,
        "name": name,
        "binary_code": format!("{:03b}", id),
        "element": "",
        "nature": ""
    })
}

/// Seeds a table's local version directly.
pub async fn set_local_version(store: &Store, table: &str, version: &str) {
    store
        .insert(
            "sync_status",
            &Row::new()
                .with("table_name", table)
                .with("sync_version", version)
                .with("pending_changes", 0i64)
                .with("sync_errors", 0i64),
        )
        .await
        .unwrap();
}

pub async fn all_rows(store: &Store, table: &str) -> Vec<Row> {
    store
        .query(&xuanji_core::Select::from(table).order_by("id"))
        .await
        .unwrap()
}
