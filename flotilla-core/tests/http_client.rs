//! HttpClient tests against a fake remote served by axum.

mod common;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use flotilla_core::client::{HttpClient, RemoteClient};
use flotilla_core::{
    Action, DeleteOptions, LifecycleState, Reconciler, RemoteError, ResourceStatus,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use common::{payload, web};

#[derive(Default)]
struct FakeRemote {
    resources: Mutex<HashMap<String, Value>>,
    failures: Mutex<VecDeque<(StatusCode, Value)>>,
    requests: Mutex<Vec<String>>,
}

type Shared = Arc<FakeRemote>;

impl FakeRemote {
    async fn fail_next(&self, status: StatusCode, body: Value) {
        self.failures.lock().await.push_back((status, body));
    }

    /// Record the request and pop a scripted failure, if any.
    async fn enter(&self, method: &str, kind: &str, name: &str, params: &Params) -> Option<Response> {
        self.requests.lock().await.push(format!(
            "{method} {kind}/{name} scope={} force={}",
            params.scope.as_deref().unwrap_or("-"),
            params.force.map(|f| f.to_string()).unwrap_or_else(|| "-".into())
        ));
        let (status, body) = self.failures.lock().await.pop_front()?;
        Some((status, Json(body)).into_response())
    }
}

#[derive(Debug, Deserialize)]
struct Params {
    scope: Option<String>,
    force: Option<bool>,
}

fn key(kind: &str, name: &str, params: &Params) -> String {
    format!("{kind}/{}/{name}", params.scope.as_deref().unwrap_or(""))
}

fn not_found(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"code": "NotFound", "message": format!("{name} not found")})),
    )
        .into_response()
}

async fn describe(
    State(remote): State<Shared>,
    Path((kind, name)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> Response {
    if let Some(response) = remote.enter("GET", &kind, &name, &params).await {
        return response;
    }
    match remote.resources.lock().await.get(&key(&kind, &name, &params)) {
        Some(fields) => Json(json!({
            "name": name,
            "scope": params.scope,
            "status": "ACTIVE",
            "arn": format!("arn:fake:{kind}/{name}"),
            "fields": fields,
        }))
        .into_response(),
        None => not_found(&name),
    }
}

async fn create(
    State(remote): State<Shared>,
    Path((kind, name)): Path<(String, String)>,
    Query(params): Query<Params>,
    Json(body): Json<Value>,
) -> Response {
    if let Some(response) = remote.enter("POST", &kind, &name, &params).await {
        return response;
    }
    let mut resources = remote.resources.lock().await;
    let key = key(&kind, &name, &params);
    if resources.contains_key(&key) {
        return (
            StatusCode::CONFLICT,
            Json(json!({"code": "AlreadyExists", "message": "exists"})),
        )
            .into_response();
    }
    resources.insert(key, body);
    Json(json!({"name": name, "arn": format!("arn:fake:{kind}/{name}")})).into_response()
}

async fn update(
    State(remote): State<Shared>,
    Path((kind, name)): Path<(String, String)>,
    Query(params): Query<Params>,
    Json(body): Json<Value>,
) -> Response {
    if let Some(response) = remote.enter("PATCH", &kind, &name, &params).await {
        return response;
    }
    let mut resources = remote.resources.lock().await;
    match resources.get_mut(&key(&kind, &name, &params)) {
        Some(Value::Object(fields)) => {
            if let Value::Object(changes) = body {
                fields.extend(changes);
            }
            StatusCode::NO_CONTENT.into_response()
        }
        _ => not_found(&name),
    }
}

async fn delete(
    State(remote): State<Shared>,
    Path((kind, name)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> Response {
    if let Some(response) = remote.enter("DELETE", &kind, &name, &params).await {
        return response;
    }
    match remote.resources.lock().await.remove(&key(&kind, &name, &params)) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found(&name),
    }
}

async fn spawn_remote() -> (HttpClient, Shared) {
    let remote = Arc::new(FakeRemote::default());
    let app = Router::new()
        .route(
            "/v1/{kind}/{name}",
            get(describe).post(create).patch(update).delete(delete),
        )
        .with_state(remote.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = HttpClient::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap();
    (client, remote)
}

// =============================================================================
// Status Mapping
// =============================================================================

#[tokio::test]
async fn test_describe_missing_is_none() {
    let (client, _remote) = spawn_remote().await;
    let observed = client.describe("service", "web", Some("prod")).await.unwrap();
    assert!(observed.is_none());
}

#[tokio::test]
async fn test_error_statuses_map_to_taxonomy() {
    let (client, remote) = spawn_remote().await;
    let body = payload(json!({"desiredCount": 1}));

    remote
        .fail_next(StatusCode::CONFLICT, json!({"code": "AlreadyExists", "message": "taken"}))
        .await;
    assert_eq!(
        client.create("service", "web", Some("prod"), &body).await,
        Err(RemoteError::AlreadyExists("taken".into()))
    );

    remote
        .fail_next(StatusCode::CONFLICT, json!({"message": "update in progress"}))
        .await;
    assert_eq!(
        client.update("service", "web", Some("prod"), &body).await,
        Err(RemoteError::Conflict("update in progress".into()))
    );

    remote
        .fail_next(StatusCode::TOO_MANY_REQUESTS, json!({"message": "rate exceeded"}))
        .await;
    assert!(matches!(
        client.describe("service", "web", Some("prod")).await,
        Err(RemoteError::Throttled(_))
    ));

    remote.fail_next(StatusCode::SERVICE_UNAVAILABLE, json!({})).await;
    assert!(matches!(
        client.describe("service", "web", Some("prod")).await,
        Err(RemoteError::Throttled(_))
    ));

    remote
        .fail_next(StatusCode::BAD_REQUEST, json!({"message": "invalid desiredCount"}))
        .await;
    let err = client.create("service", "web", Some("prod"), &body).await.unwrap_err();
    assert!(matches!(err, RemoteError::Fatal(_)));
    assert!(err.to_string().contains("invalid desiredCount"));

    let err = client.update("service", "ghost", Some("prod"), &body).await.unwrap_err();
    assert!(matches!(err, RemoteError::NotFound(_)));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpClient::new(&format!("http://{addr}"), Duration::from_secs(1)).unwrap();
    let err = client.describe("cluster", "prod", None).await.unwrap_err();
    assert!(err.is_retryable(), "{err}");
}

#[tokio::test]
async fn test_delete_sends_scope_and_force() {
    let (client, remote) = spawn_remote().await;
    client
        .create("service", "web", Some("prod"), &payload(json!({})))
        .await
        .unwrap();

    client
        .delete("service", "web", Some("prod"), &DeleteOptions { force: Some(true) })
        .await
        .unwrap();

    let requests = remote.requests.lock().await.clone();
    assert_eq!(requests.last().unwrap(), "DELETE service/web scope=prod force=true");
}

// =============================================================================
// Reconcile over HTTP
// =============================================================================

#[tokio::test]
async fn test_reconcile_over_http() {
    let (client, remote) = spawn_remote().await;
    let reconciler = Reconciler::new(Arc::new(client), common::config());

    let result = reconciler.reconcile(&web(3)).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.action, Action::Create);
    assert_eq!(result.state, LifecycleState::Active);
    assert_eq!(
        result.observed.as_ref().map(|o| o.status),
        Some(ResourceStatus::Active)
    );

    let result = reconciler.reconcile(&web(5)).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.action, Action::Update);

    let stored = remote.resources.lock().await.get("service/prod/web").cloned();
    assert_eq!(stored, Some(json!({"desiredCount": 5, "cluster": "prod"})));

    let requests = remote.requests.lock().await.clone();
    let mutations: Vec<_> = requests
        .iter()
        .filter(|r| !r.starts_with("GET"))
        .map(|r| r.split(' ').next().unwrap_or_default())
        .collect();
    assert_eq!(mutations, vec!["POST", "PATCH"]);
}
