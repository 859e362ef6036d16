//! In-process stand-in for the VAST management API.
//!
//! Collections are kept as plain JSON objects. The server understands name
//! filters, assigns numeric ids, resolves `policy_id` into the `policy` name
//! on views, and records every request so tests can count mutations.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch};
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use vast_rest::{RestClient, RestConfig};
use vast_share::{CommandRunner, Config, Reconciler, Resolver, ShareError};

pub const GIB: u64 = 1 << 30;

#[derive(Default)]
pub struct MockState {
    pub collections: BTreeMap<String, Vec<Map<String, Value>>>,
    pub next_id: u64,
    /// Every request as "VERB collection[/id]".
    pub log: Vec<String>,
    /// When set, every request fails with 503 and this body.
    pub unavailable: Option<String>,
    pub capacity: Value,
}

impl MockState {
    fn insert(&mut self, collection: &str, mut record: Map<String, Value>) -> Map<String, Value> {
        self.next_id += 1;
        record.insert("id".to_string(), json!(self.next_id));
        if collection == "views" {
            self.resolve_policy_name(&mut record);
        }
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());
        record
    }

    fn resolve_policy_name(&self, view: &mut Map<String, Value>) {
        let Some(policy_id) = view.get("policy_id").cloned() else {
            return;
        };
        let name = self
            .collections
            .get("viewpolicies")
            .and_then(|policies| policies.iter().find(|p| p.get("id") == Some(&policy_id)))
            .and_then(|p| p.get("name").cloned())
            .unwrap_or(Value::Null);
        view.insert("policy".to_string(), name);
    }
}

type Shared = Arc<Mutex<MockState>>;

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn matches(record: &Map<String, Value>, filters: &[(String, String)]) -> bool {
    filters.iter().all(|(key, expected)| {
        if let Some(field) = key.strip_suffix("__contains") {
            record
                .get(field)
                .and_then(as_text)
                .is_some_and(|v| v.contains(expected.as_str()))
        } else {
            record.get(key).and_then(as_text).as_deref() == Some(expected.as_str())
        }
    })
}

fn unavailable(state: &Shared, entry: String) -> Option<Response> {
    let mut state = state.lock().unwrap();
    state.log.push(entry);
    state
        .unavailable
        .clone()
        .map(|body| (StatusCode::SERVICE_UNAVAILABLE, body).into_response())
}

async fn list(
    State(state): State<Shared>,
    Path(collection): Path<String>,
    Query(filters): Query<Vec<(String, String)>>,
) -> Response {
    if let Some(resp) = unavailable(&state, format!("GET {collection}")) {
        return resp;
    }
    let state = state.lock().unwrap();
    let found: Vec<Value> = state
        .collections
        .get(&collection)
        .map(|records| {
            records
                .iter()
                .filter(|r| matches(r, &filters))
                .cloned()
                .map(Value::Object)
                .collect()
        })
        .unwrap_or_default();
    Json(Value::Array(found)).into_response()
}

async fn create(
    State(state): State<Shared>,
    Path(collection): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if let Some(resp) = unavailable(&state, format!("POST {collection}")) {
        return resp;
    }
    let Value::Object(record) = body else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let created = state.lock().unwrap().insert(&collection, record);
    (StatusCode::CREATED, Json(Value::Object(created))).into_response()
}

async fn update(
    State(state): State<Shared>,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    if let Some(resp) = unavailable(&state, format!("PATCH {collection}/{id}")) {
        return resp;
    }
    let mut state = state.lock().unwrap();
    let Value::Object(changes) = body else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let mut updated = None;
    if let Some(records) = state.collections.get_mut(&collection) {
        for record in records.iter_mut() {
            if record.get("id").and_then(as_text).as_deref() == Some(id.as_str()) {
                record.extend(changes.clone());
                updated = Some(record.clone());
            }
        }
    }
    let Some(mut record) = updated else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };
    if collection == "views" {
        state.resolve_policy_name(&mut record);
        if let Some(stored) = state
            .collections
            .get_mut("views")
            .and_then(|views| views.iter_mut().find(|v| v.get("id") == record.get("id")))
        {
            *stored = record.clone();
        }
    }
    Json(Value::Object(record)).into_response()
}

async fn remove(
    State(state): State<Shared>,
    Path((collection, id)): Path<(String, String)>,
) -> Response {
    if let Some(resp) = unavailable(&state, format!("DELETE {collection}/{id}")) {
        return resp;
    }
    let mut state = state.lock().unwrap();
    let Some(records) = state.collections.get_mut(&collection) else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };
    let before = records.len();
    records.retain(|r| r.get("id").and_then(as_text).as_deref() != Some(id.as_str()));
    if records.len() == before {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn ad_hoc_query(State(state): State<Shared>) -> Response {
    if let Some(resp) = unavailable(&state, "GET monitors/ad_hoc_query".to_string()) {
        return resp;
    }
    let capacity = state.lock().unwrap().capacity.clone();
    Json(capacity).into_response()
}

/// Resolver with a fixed host table.
pub struct StaticResolver(HashMap<String, Vec<Ipv4Addr>>);

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<Ipv4Addr>> {
        self.0.get(host).cloned().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("unknown host {host}"))
        })
    }
}

/// Records commands instead of running them.
#[derive(Default)]
pub struct RecordingRunner {
    pub commands: Mutex<Vec<String>>,
    pub fail_on: Mutex<Option<String>>,
}

impl RecordingRunner {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn fail_on(&self, program: &str) {
        *self.fail_on.lock().unwrap() = Some(program.to_string());
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, program: &str, args: &[String], _as_root: bool) -> vast_share::Result<()> {
        let command = format!("{} {}", program, args.join(" "));
        self.commands.lock().unwrap().push(command.clone());
        if self.fail_on.lock().unwrap().as_deref() == Some(program) {
            return Err(ShareError::Command {
                command,
                stderr: "permission denied".to_string(),
            });
        }
        Ok(())
    }
}

pub struct MockVast {
    pub addr: SocketAddr,
    pub state: Shared,
    pub runner: Arc<RecordingRunner>,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl MockVast {
    /// Start a server seeded with a VIP pool, a default policy and capacity
    /// metrics.
    pub async fn spawn() -> Self {
        let state: Shared = Arc::default();
        {
            let mut s = state.lock().unwrap();
            for (ip, pool) in [
                ("172.16.0.1", "manila"),
                ("172.16.0.2", "manila"),
                ("172.16.9.9", "other"),
            ] {
                s.insert("vips", object(json!({"ip": ip, "vippool": pool})));
            }
            s.insert("viewpolicies", object(json!({"name": "default"})));
            s.insert("metrics", object(json!({"fqn": "Capacity,drr"})));
            s.insert("metrics", object(json!({"fqn": "Capacity,logical_space"})));
            s.capacity = json!({
                "prop_list": [
                    "Capacity,drr",
                    "Capacity,logical_space",
                    "Capacity,logical_space_in_use",
                    "Capacity,physical_space",
                    "Capacity,physical_space_in_use"
                ],
                "data": [
                    [1.0, 1.0, 1.0, 1.0, 1.0],
                    [3.0, 100.0 * GIB as f64, 25.0 * GIB as f64, 50.0 * GIB as f64, 5.0 * GIB as f64]
                ]
            });
            s.log.clear();
        }

        let router = Router::new()
            .route("/api/monitors/ad_hoc_query/", get(ad_hoc_query))
            .route("/api/{collection}/", get(list).post(create))
            .route("/api/{collection}/{id}/", patch(update).delete(remove))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        Self {
            addr,
            state,
            runner: Arc::new(RecordingRunner::default()),
            shutdown_tx,
        }
    }

    pub fn config(&self) -> Config {
        let mut config = Config::new(self.addr.to_string());
        config.root_export = "/manila".to_string();
        config.vippool_name = "manila".to_string();
        config.backend_name = Some("vast-test".to_string());
        config
    }

    pub fn reconciler(&self) -> Reconciler {
        self.reconciler_with(&self.config())
    }

    pub fn reconciler_with(&self, config: &Config) -> Reconciler {
        let client = RestClient::new(&RestConfig {
            base_url: format!("http://{}/api", self.addr),
            username: "admin".to_string(),
            password: "secret".to_string(),
            ssl_verify: false,
            connect_timeout: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
        })
        .expect("Failed to build client");

        let hosts = HashMap::from([(
            "client.lan".to_string(),
            vec![Ipv4Addr::new(192, 168, 1, 10), Ipv4Addr::new(192, 168, 1, 11)],
        )]);

        Reconciler::new(config, Arc::new(client))
            .with_resolver(Arc::new(StaticResolver(hosts)))
            .with_runner(self.runner.clone())
    }

    /// Insert a record directly, bypassing the request log.
    pub fn insert(&self, collection: &str, record: Value) -> u64 {
        let created = self.state.lock().unwrap().insert(collection, object(record));
        created["id"].as_u64().unwrap()
    }

    /// Remove a record directly, bypassing the request log.
    pub fn remove(&self, collection: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(records) = state.collections.get_mut(collection) {
            records.retain(|r| r.get("name").and_then(Value::as_str) != Some(name));
        }
    }

    pub fn find(&self, collection: &str, name: &str) -> Vec<Map<String, Value>> {
        let state = self.state.lock().unwrap();
        state
            .collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.get("name").and_then(Value::as_str) == Some(name))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The single record named `name`.
    pub fn one(&self, collection: &str, name: &str) -> Map<String, Value> {
        let mut found = self.find(collection, name);
        assert_eq!(found.len(), 1, "expected one {} named {}", collection, name);
        found.pop().unwrap()
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// Requests other than GET.
    pub fn mutations(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| !r.starts_with("GET "))
            .collect()
    }

    pub fn clear_log(&self) {
        self.state.lock().unwrap().log.clear();
    }

    pub fn set_unavailable(&self, body: Option<&str>) {
        self.state.lock().unwrap().unavailable = body.map(str::to_string);
    }

    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {}", other),
    }
}
