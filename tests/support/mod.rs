//! Fake record-table API served over HTTP for integration tests.
#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

pub const API_KEY: &str = "test-key";
pub const BASE_ID: &str = "appTEST";

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: Method,
    pub table: String,
    pub query: HashMap<String, String>,
    pub batch_len: Option<usize>,
}

#[derive(Default)]
pub struct ApiState {
    pub tables: HashMap<String, Vec<Value>>,
    pub seen: Vec<SeenRequest>,
    pub page_size: usize,
    next_id: u64,
}

impl ApiState {
    fn new_id(&mut self) -> String {
        self.next_id += 1;
        format!("rec{:014}", self.next_id)
    }
}

type Shared = Arc<Mutex<ApiState>>;

pub struct FakeApi {
    pub addr: SocketAddr,
    pub state: Shared,
}

impl FakeApi {
    pub fn api_url(&self) -> String {
        format!("http://{}/v0", self.addr)
    }

    pub fn seed(&self, table: &str, fields: Value) -> String {
        let mut st = self.state.lock().expect("state");
        let id = st.new_id();
        st.tables
            .entry(table.to_string())
            .or_default()
            .push(json!({ "id": id, "fields": fields, "createdTime": "2025-12-01T00:00:00.000Z" }));
        id
    }

    pub fn records(&self, table: &str) -> Vec<Value> {
        self.state
            .lock()
            .expect("state")
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.state.lock().expect("state").seen.clone()
    }

    pub fn set_page_size(&self, n: usize) {
        self.state.lock().expect("state").page_size = n;
    }
}

fn api_error(status: StatusCode, kind: &str) -> Response {
    (status, Json(json!({ "error": { "type": kind, "message": kind } }))).into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some(&format!("Bearer {}", API_KEY)[..])
}

fn matches_formula(record: &Value, formula: &str) -> bool {
    let Some((lhs, rhs)) = formula.split_once('=') else {
        return false;
    };
    let field = lhs.trim().trim_start_matches('{').trim_end_matches('}');
    let value = rhs.trim().trim_matches('\'');
    record["fields"][field].as_str() == Some(value)
}

async fn list_records(
    State(state): State<Shared>,
    Path((_base, table)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return api_error(StatusCode::UNAUTHORIZED, "AUTHENTICATION_REQUIRED");
    }
    let mut st = state.lock().expect("state");
    st.seen.push(SeenRequest {
        method: Method::GET,
        table: table.clone(),
        query: query.clone(),
        batch_len: None,
    });
    let rows: Vec<Value> = st
        .tables
        .get(&table)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter(|r| {
            query
                .get("filterByFormula")
                .map(|f| matches_formula(r, f))
                .unwrap_or(true)
        })
        .collect();
    let page_size = if st.page_size == 0 { 100 } else { st.page_size };
    let start: usize = query
        .get("offset")
        .and_then(|o| o.strip_prefix("itr"))
        .and_then(|o| o.parse().ok())
        .unwrap_or(0);
    let end = (start + page_size).min(rows.len());
    let page = rows.get(start..end).map(|s| s.to_vec()).unwrap_or_default();
    let mut body = json!({ "records": page });
    if end < rows.len() {
        body["offset"] = json!(format!("itr{}", end));
    }
    Json(body).into_response()
}

fn batch_records(body: &Value) -> Option<Vec<Value>> {
    body.get("records").and_then(|r| r.as_array()).cloned()
}

async fn create_records(
    State(state): State<Shared>,
    Path((_base, table)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return api_error(StatusCode::UNAUTHORIZED, "AUTHENTICATION_REQUIRED");
    }
    let Some(records) = batch_records(&body) else {
        return api_error(StatusCode::UNPROCESSABLE_ENTITY, "INVALID_REQUEST_MISSING_FIELDS");
    };
    let mut st = state.lock().expect("state");
    st.seen.push(SeenRequest {
        method: Method::POST,
        table: table.clone(),
        query: HashMap::new(),
        batch_len: Some(records.len()),
    });
    if records.len() > 10 {
        return api_error(StatusCode::UNPROCESSABLE_ENTITY, "INVALID_RECORDS");
    }
    let mut created = Vec::new();
    for r in records {
        let id = st.new_id();
        let row = json!({
            "id": id,
            "fields": r.get("fields").cloned().unwrap_or_else(|| json!({})),
            "createdTime": "2025-12-26T00:00:00.000Z"
        });
        created.push(row.clone());
        st.tables.entry(table.clone()).or_default().push(row);
    }
    Json(json!({ "records": created })).into_response()
}

async fn update_records(
    State(state): State<Shared>,
    Path((_base, table)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return api_error(StatusCode::UNAUTHORIZED, "AUTHENTICATION_REQUIRED");
    }
    let Some(patches) = batch_records(&body) else {
        return api_error(StatusCode::UNPROCESSABLE_ENTITY, "INVALID_REQUEST_MISSING_FIELDS");
    };
    let mut st = state.lock().expect("state");
    st.seen.push(SeenRequest {
        method: Method::PATCH,
        table: table.clone(),
        query: HashMap::new(),
        batch_len: Some(patches.len()),
    });
    let rows = st.tables.entry(table).or_default();
    let mut updated = Vec::new();
    for patch in patches {
        let Some(row) = rows.iter_mut().find(|r| r["id"] == patch["id"]) else {
            return api_error(StatusCode::NOT_FOUND, "ROW_DOES_NOT_EXIST");
        };
        let fields: Map<String, Value> = patch["fields"].as_object().cloned().unwrap_or_default();
        for (k, v) in fields {
            row["fields"][k] = v;
        }
        updated.push(row.clone());
    }
    Json(json!({ "records": updated })).into_response()
}

async fn delete_record(
    State(state): State<Shared>,
    Path((_base, table, id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return api_error(StatusCode::UNAUTHORIZED, "AUTHENTICATION_REQUIRED");
    }
    let mut st = state.lock().expect("state");
    st.seen.push(SeenRequest {
        method: Method::DELETE,
        table: table.clone(),
        query: HashMap::new(),
        batch_len: None,
    });
    let rows = st.tables.entry(table).or_default();
    let before = rows.len();
    rows.retain(|r| r["id"] != json!(id));
    if rows.len() == before {
        return api_error(StatusCode::NOT_FOUND, "NOT_FOUND");
    }
    Json(json!({ "id": id, "deleted": true })).into_response()
}

pub async fn start() -> FakeApi {
    let state: Shared = Arc::new(Mutex::new(ApiState::default()));
    let app = Router::new()
        .route(
            "/v0/:base/:table",
            get(list_records).post(create_records).patch(update_records),
        )
        .route("/v0/:base/:table/:id", delete(delete_record))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake api");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve fake api");
    });
    FakeApi { addr, state }
}

/// Runs the fake API on its own runtime so blocking tests can talk to it.
pub fn start_in_background() -> (tokio::runtime::Runtime, FakeApi) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("runtime");
    let api = rt.block_on(start());
    (rt, api)
}
