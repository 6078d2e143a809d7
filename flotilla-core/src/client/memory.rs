//! In-memory remote.
//!
//! Behaves like an eventually-consistent cloud API: new resources can stay
//! invisible or report CREATING for a number of describes, deletes leave
//! INACTIVE tombstones, and failures can be scripted per operation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{ObservedState, Payload, RemoteClient, RemoteHandle, ResourceStatus};
use crate::descriptor::DeleteOptions;
use crate::error::RemoteError;

/// Remote operation, for scripting failures and inspecting calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Create,
    Describe,
    Update,
    Delete,
}

impl RemoteOp {
    pub fn is_mutation(self) -> bool {
        !matches!(self, RemoteOp::Describe)
    }
}

/// One call received by the remote.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub op: RemoteOp,
    pub kind: String,
    pub name: String,
    pub scope: Option<String>,
    pub payload: Option<Payload>,
    pub force: Option<bool>,
}

type Key = (String, Option<String>, String);

#[derive(Debug, Clone)]
struct StoredResource {
    status: ResourceStatus,
    arn: String,
    fields: Payload,
    invisible_for: u32,
    creating_for: u32,
}

#[derive(Default)]
struct MemoryState {
    resources: BTreeMap<Key, StoredResource>,
    failures: HashMap<RemoteOp, VecDeque<RemoteError>>,
    calls: Vec<RemoteCall>,
}

/// Serializable content of a [`MemoryClient`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub resources: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub kind: String,
    #[serde(default)]
    pub scope: Option<String>,
    pub name: String,
    pub status: ResourceStatus,
    pub arn: String,
    #[serde(default)]
    pub fields: Payload,
}

/// In-memory [`RemoteClient`].
#[derive(Default)]
pub struct MemoryClient {
    state: Mutex<MemoryState>,
    latency: Duration,
    invisible_describes: u32,
    creating_describes: u32,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// New resources are not returned by the first `n` describes.
    pub fn with_invisible_describes(mut self, n: u32) -> Self {
        self.invisible_describes = n;
        self
    }

    /// New resources report CREATING for the first `n` visible describes.
    pub fn with_creating_describes(mut self, n: u32) -> Self {
        self.creating_describes = n;
        self
    }

    pub fn from_snapshot(snapshot: MemorySnapshot) -> Self {
        let resources = snapshot
            .resources
            .into_iter()
            .map(|e| {
                (
                    (e.kind, e.scope, e.name),
                    StoredResource {
                        status: e.status,
                        arn: e.arn,
                        fields: e.fields,
                        invisible_for: 0,
                        creating_for: 0,
                    },
                )
            })
            .collect();

        Self {
            state: Mutex::new(MemoryState {
                resources,
                ..MemoryState::default()
            }),
            ..Self::default()
        }
    }

    pub async fn snapshot(&self) -> MemorySnapshot {
        let state = self.state.lock().await;
        let resources = state
            .resources
            .iter()
            .map(|((kind, scope, name), r)| SnapshotEntry {
                kind: kind.clone(),
                scope: scope.clone(),
                name: name.clone(),
                status: r.status,
                arn: r.arn.clone(),
                fields: r.fields.clone(),
            })
            .collect();
        MemorySnapshot { resources }
    }

    /// Place a resource directly, bypassing the call log.
    pub async fn seed(
        &self,
        kind: &str,
        scope: Option<&str>,
        name: &str,
        status: ResourceStatus,
        fields: Payload,
    ) {
        let mut state = self.state.lock().await;
        state.resources.insert(
            key(kind, name, scope),
            StoredResource {
                status,
                arn: arn(kind, name, scope),
                fields,
                invisible_for: 0,
                creating_for: 0,
            },
        );
    }

    /// Queue an error for the next call of `op`. Queued errors are consumed
    /// in order, one per call.
    pub async fn fail_next(&self, op: RemoteOp, error: RemoteError) {
        let mut state = self.state.lock().await;
        state.failures.entry(op).or_default().push_back(error);
    }

    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn calls_of(&self, op: RemoteOp) -> Vec<RemoteCall> {
        self.calls().await.into_iter().filter(|c| c.op == op).collect()
    }

    pub async fn mutation_count(&self) -> usize {
        self.calls().await.iter().filter(|c| c.op.is_mutation()).count()
    }

    pub async fn status_of(&self, kind: &str, name: &str, scope: Option<&str>) -> Option<ResourceStatus> {
        let state = self.state.lock().await;
        state.resources.get(&key(kind, name, scope)).map(|r| r.status)
    }

    pub async fn fields_of(&self, kind: &str, name: &str, scope: Option<&str>) -> Option<Payload> {
        let state = self.state.lock().await;
        state.resources.get(&key(kind, name, scope)).map(|r| r.fields.clone())
    }

    /// Record the call and pop a scripted failure, if any.
    async fn enter(&self, call: RemoteCall) -> Result<(), RemoteError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut state = self.state.lock().await;
        let op = call.op;
        state.calls.push(call);
        match state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn key(kind: &str, name: &str, scope: Option<&str>) -> Key {
    (kind.to_string(), scope.map(str::to_string), name.to_string())
}

fn arn(kind: &str, name: &str, scope: Option<&str>) -> String {
    match scope {
        Some(scope) => format!("arn:flotilla:{kind}:{scope}/{name}"),
        None => format!("arn:flotilla:{kind}:{name}"),
    }
}

fn call(op: RemoteOp, kind: &str, name: &str, scope: Option<&str>) -> RemoteCall {
    RemoteCall {
        op,
        kind: kind.to_string(),
        name: name.to_string(),
        scope: scope.map(str::to_string),
        payload: None,
        force: None,
    }
}

#[async_trait]
impl RemoteClient for MemoryClient {
    async fn create(
        &self,
        kind: &str,
        name: &str,
        scope: Option<&str>,
        payload: &Payload,
    ) -> Result<RemoteHandle, RemoteError> {
        self.enter(RemoteCall {
            payload: Some(payload.clone()),
            ..call(RemoteOp::Create, kind, name, scope)
        })
        .await?;

        let mut state = self.state.lock().await;
        let key = key(kind, name, scope);
        if state.resources.get(&key).is_some_and(|r| r.status != ResourceStatus::Inactive) {
            return Err(RemoteError::AlreadyExists(format!("{kind} {name}")));
        }

        let status = if self.creating_describes > 0 {
            ResourceStatus::Creating
        } else {
            ResourceStatus::Active
        };
        let arn = arn(kind, name, scope);
        debug!(kind, name, ?scope, "memory remote: created");
        state.resources.insert(
            key,
            StoredResource {
                status,
                arn: arn.clone(),
                fields: payload.clone(),
                invisible_for: self.invisible_describes,
                creating_for: self.creating_describes,
            },
        );

        Ok(RemoteHandle {
            name: name.to_string(),
            arn: Some(arn),
        })
    }

    async fn describe(
        &self,
        kind: &str,
        name: &str,
        scope: Option<&str>,
    ) -> Result<Option<ObservedState>, RemoteError> {
        self.enter(call(RemoteOp::Describe, kind, name, scope)).await?;

        let mut state = self.state.lock().await;
        let Some(resource) = state.resources.get_mut(&key(kind, name, scope)) else {
            return Ok(None);
        };

        if resource.invisible_for > 0 {
            resource.invisible_for -= 1;
            return Ok(None);
        }
        if resource.creating_for > 0 {
            resource.creating_for -= 1;
        } else if resource.status == ResourceStatus::Creating {
            resource.status = ResourceStatus::Active;
        }

        Ok(Some(ObservedState {
            name: name.to_string(),
            scope: scope.map(str::to_string),
            status: resource.status,
            arn: Some(resource.arn.clone()),
            fields: resource.fields.clone(),
            observed_at: Utc::now(),
        }))
    }

    async fn update(
        &self,
        kind: &str,
        name: &str,
        scope: Option<&str>,
        payload: &Payload,
    ) -> Result<(), RemoteError> {
        self.enter(RemoteCall {
            payload: Some(payload.clone()),
            ..call(RemoteOp::Update, kind, name, scope)
        })
        .await?;

        let mut state = self.state.lock().await;
        match state.resources.get_mut(&key(kind, name, scope)) {
            Some(r) if r.status != ResourceStatus::Inactive => {
                for (k, v) in payload {
                    r.fields.insert(k.clone(), v.clone());
                }
                Ok(())
            }
            _ => Err(RemoteError::NotFound(format!("{kind} {name}"))),
        }
    }

    async fn delete(
        &self,
        kind: &str,
        name: &str,
        scope: Option<&str>,
        options: &DeleteOptions,
    ) -> Result<(), RemoteError> {
        self.enter(RemoteCall {
            force: options.force,
            ..call(RemoteOp::Delete, kind, name, scope)
        })
        .await?;

        let mut state = self.state.lock().await;
        match state.resources.get_mut(&key(kind, name, scope)) {
            Some(r) if r.status != ResourceStatus::Inactive => {
                r.status = ResourceStatus::Inactive;
                Ok(())
            }
            _ => Err(RemoteError::NotFound(format!("{kind} {name}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(v: serde_json::Value) -> Payload {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_twice_reports_already_exists() {
        let remote = MemoryClient::new();
        let body = payload(json!({"desiredCount": 1}));
        remote.create("service", "web", Some("prod"), &body).await.unwrap();

        let err = remote.create("service", "web", Some("prod"), &body).await.unwrap_err();
        assert!(matches!(err, RemoteError::AlreadyExists(_)));

        // Same name in another scope is a different resource
        remote.create("service", "web", Some("staging"), &body).await.unwrap();
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let remote = MemoryClient::new();
        remote.fail_next(RemoteOp::Describe, RemoteError::Throttled("1".into())).await;
        remote.fail_next(RemoteOp::Describe, RemoteError::Fatal("2".into())).await;

        assert_eq!(
            remote.describe("cluster", "prod", None).await,
            Err(RemoteError::Throttled("1".into()))
        );
        assert_eq!(
            remote.describe("cluster", "prod", None).await,
            Err(RemoteError::Fatal("2".into()))
        );
        assert_eq!(remote.describe("cluster", "prod", None).await, Ok(None));
        assert_eq!(remote.calls().await.len(), 3);
    }

    #[tokio::test]
    async fn test_eventual_visibility_then_creating_then_active() {
        let remote = MemoryClient::new()
            .with_invisible_describes(1)
            .with_creating_describes(1);
        remote.create("cluster", "prod", None, &Payload::new()).await.unwrap();

        assert!(remote.describe("cluster", "prod", None).await.unwrap().is_none());
        let observed = remote.describe("cluster", "prod", None).await.unwrap().unwrap();
        assert_eq!(observed.status, ResourceStatus::Creating);
        let observed = remote.describe("cluster", "prod", None).await.unwrap().unwrap();
        assert_eq!(observed.status, ResourceStatus::Active);
    }

    #[tokio::test]
    async fn test_delete_leaves_inactive_tombstone() {
        let remote = MemoryClient::new();
        remote.create("cluster", "prod", None, &Payload::new()).await.unwrap();
        remote
            .delete("cluster", "prod", None, &DeleteOptions { force: Some(true) })
            .await
            .unwrap();

        let observed = remote.describe("cluster", "prod", None).await.unwrap().unwrap();
        assert!(!observed.exists());
        assert!(matches!(
            remote.delete("cluster", "prod", None, &DeleteOptions::default()).await,
            Err(RemoteError::NotFound(_))
        ));
        assert_eq!(remote.calls_of(RemoteOp::Delete).await[0].force, Some(true));

        // Name can be reused after deletion
        remote.create("cluster", "prod", None, &Payload::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_restores_resources() {
        let remote = MemoryClient::new();
        remote
            .create("service", "web", Some("prod"), &payload(json!({"desiredCount": 2})))
            .await
            .unwrap();

        let restored = MemoryClient::from_snapshot(remote.snapshot().await);
        // The call log is not part of a snapshot
        assert!(restored.calls().await.is_empty());

        let observed = restored.describe("service", "web", Some("prod")).await.unwrap().unwrap();
        assert_eq!(observed.fields["desiredCount"], json!(2));
        let calls = restored.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].op, RemoteOp::Describe);
    }
}
