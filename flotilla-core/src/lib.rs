//! flotilla-core: declarative reconciliation of remote cloud resources.
//!
//! A [`ResourceDescriptor`] declares the desired state of one resource. The
//! [`Reconciler`] describes the resource through a [`RemoteClient`], compares
//! declared against observed fields and issues the single create, update or
//! delete call that closes the gap, retrying transient failures.
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use flotilla_core::{MemoryClient, Reconciler, ReconcilerConfig, ResourceDescriptor};
//!
//! let reconciler = Reconciler::new(Arc::new(MemoryClient::new()), ReconcilerConfig::default());
//! let web = ResourceDescriptor::new("service", "web")
//!     .with_field("cluster", "prod")
//!     .with_field("desired_count", 3);
//! let result = reconciler.reconcile(&web).await;
//! assert!(result.success);
//! ```

pub mod client;
pub mod descriptor;
pub mod drift;
pub mod error;
pub mod kinds;
pub mod manifest;
pub mod projector;
pub mod reconciler;
pub mod retry;

pub use client::{HttpClient, MemoryClient, ObservedState, RemoteClient, ResourceStatus};
pub use descriptor::{DeleteOptions, FieldValue, ResourceDescriptor, ResourceId, ResourceRef};
pub use error::{ErrorKind, ReconcileError, RemoteError};
pub use manifest::{Manifest, ManifestError};
pub use reconciler::{
    Action, BatchOptions, BatchOutcome, BatchReport, LifecycleState, PlanEntry,
    ReconciliationResult, Reconciler, ReconcilerConfig,
};
pub use retry::{RetryPolicy, SettlePolicy};
