//! Shared test utilities for flotilla-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use flotilla_core::client::{MemoryClient, ObservedState, Payload, RemoteClient, RemoteHandle};
use flotilla_core::{
    DeleteOptions, Reconciler, ReconcilerConfig, RemoteError, ResourceDescriptor, RetryPolicy,
    SettlePolicy,
};
use serde_json::Value;

/// Retry defaults with a short settle window.
pub fn config() -> ReconcilerConfig {
    ReconcilerConfig {
        retry: RetryPolicy::default(),
        settle: SettlePolicy {
            attempts: 5,
            interval: Duration::from_millis(100),
        },
    }
}

/// Reconciler over an in-memory remote. The remote is returned for
/// inspection.
pub fn setup(remote: MemoryClient) -> (Arc<MemoryClient>, Reconciler) {
    let remote = Arc::new(remote);
    let reconciler = Reconciler::new(remote.clone(), config());
    (remote, reconciler)
}

pub fn web(count: i64) -> ResourceDescriptor {
    service("web", count)
}

pub fn service(name: &str, count: i64) -> ResourceDescriptor {
    ResourceDescriptor::new("service", name)
        .with_field("desired_count", count)
        .with_field("cluster", "prod")
}

pub fn payload(value: Value) -> Payload {
    value.as_object().cloned().unwrap_or_default()
}

/// Wraps a remote and records the highest number of calls in flight at once.
pub struct CountingClient {
    inner: Arc<MemoryClient>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CountingClient {
    pub fn new(inner: Arc<MemoryClient>) -> Self {
        Self {
            inner,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteClient for CountingClient {
    async fn create(
        &self,
        kind: &str,
        name: &str,
        scope: Option<&str>,
        payload: &Payload,
    ) -> Result<RemoteHandle, RemoteError> {
        let _guard = self.enter();
        self.inner.create(kind, name, scope, payload).await
    }

    async fn describe(
        &self,
        kind: &str,
        name: &str,
        scope: Option<&str>,
    ) -> Result<Option<ObservedState>, RemoteError> {
        let _guard = self.enter();
        self.inner.describe(kind, name, scope).await
    }

    async fn update(
        &self,
        kind: &str,
        name: &str,
        scope: Option<&str>,
        payload: &Payload,
    ) -> Result<(), RemoteError> {
        let _guard = self.enter();
        self.inner.update(kind, name, scope, payload).await
    }

    async fn delete(
        &self,
        kind: &str,
        name: &str,
        scope: Option<&str>,
        options: &DeleteOptions,
    ) -> Result<(), RemoteError> {
        let _guard = self.enter();
        self.inner.delete(kind, name, scope, options).await
    }
}
