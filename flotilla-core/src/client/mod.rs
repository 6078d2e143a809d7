//! Remote client adapters.
//!
//! The reconciler talks to the cloud API only through [`RemoteClient`]:
//! - [`MemoryClient`]: in-process remote for tests and local dry runs
//! - [`HttpClient`]: JSON-over-HTTP transport

pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::descriptor::DeleteOptions;
use crate::error::RemoteError;

pub use http::HttpClient;
pub use memory::{MemoryClient, MemorySnapshot, RemoteCall, RemoteOp};

/// Wire-shaped request body: wire field name to value.
pub type Payload = Map<String, Value>;

/// Remote status of a resource as reported by describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    Active,
    Creating,
    Draining,
    Inactive,
    #[serde(other)]
    Unknown,
}

/// Last-known snapshot of a remote resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedState {
    pub name: String,
    #[serde(default)]
    pub scope: Option<String>,
    pub status: ResourceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    /// Full field set as returned by the API, keyed by wire name.
    #[serde(default)]
    pub fields: Payload,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl ObservedState {
    /// Whether the remote still considers the resource to exist.
    pub fn exists(&self) -> bool {
        self.status != ResourceStatus::Inactive
    }
}

/// Returned by a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHandle {
    pub name: String,
    #[serde(default)]
    pub arn: Option<String>,
}

/// Uniform create/describe/update/delete over a named resource kind.
///
/// Calls may block on network I/O. Implementations map provider errors onto
/// [`RemoteError`] and must apply an update payload in a single call.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn create(
        &self,
        kind: &str,
        name: &str,
        scope: Option<&str>,
        payload: &Payload,
    ) -> Result<RemoteHandle, RemoteError>;

    /// `Ok(None)` when the resource does not exist.
    async fn describe(
        &self,
        kind: &str,
        name: &str,
        scope: Option<&str>,
    ) -> Result<Option<ObservedState>, RemoteError>;

    async fn update(
        &self,
        kind: &str,
        name: &str,
        scope: Option<&str>,
        payload: &Payload,
    ) -> Result<(), RemoteError>;

    async fn delete(
        &self,
        kind: &str,
        name: &str,
        scope: Option<&str>,
        options: &DeleteOptions,
    ) -> Result<(), RemoteError>;
}
