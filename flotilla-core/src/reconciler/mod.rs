//! Reconciler - drives one remote resource toward its descriptor.
//!
//! Each pass describes the resource, compares declared against observed
//! fields, and issues at most one mutation (create, update or delete).
//! Passes for the same identity are serialized by a per-identity lock;
//! passes for distinct identities run in parallel.

pub mod batch;
pub mod state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::client::{ObservedState, Payload, RemoteClient, ResourceStatus};
use crate::descriptor::{DeleteOptions, ResourceDescriptor, ResourceId};
use crate::drift::{self, FieldDrift};
use crate::error::{ReconcileError, RemoteError};
use crate::projector;
use crate::retry::{RetryPolicy, SettlePolicy};

pub use batch::{BatchOptions, BatchOutcome, BatchReport};
pub use state::{Action, LifecycleState};

/// Reconciler tuning.
#[derive(Debug, Clone, Default)]
pub struct ReconcilerConfig {
    pub retry: RetryPolicy,
    pub settle: SettlePolicy,
}

/// Outcome of one reconcile or destroy pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    pub id: ResourceId,
    pub action: Action,
    pub success: bool,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<ReconcileError>,
    pub observed: Option<ObservedState>,
    pub state: LifecycleState,
    /// Declared fields that differed from the remote when the pass started.
    pub drift: Vec<FieldDrift>,
    /// Backoff delays slept on transient errors, in order.
    #[serde(skip)]
    pub retries: Vec<Duration>,
}

fn serialize_error<S>(error: &Option<ReconcileError>, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match error {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}

impl ReconciliationResult {
    fn new(id: ResourceId) -> Self {
        Self {
            id,
            action: Action::None,
            success: false,
            error: None,
            observed: None,
            state: LifecycleState::Absent,
            drift: Vec::new(),
            retries: Vec::new(),
        }
    }

    /// Result for a descriptor rejected before any remote call.
    pub fn rejected(id: ResourceId, error: ReconcileError) -> Self {
        Self {
            error: Some(error),
            state: LifecycleState::Failed,
            ..Self::new(id)
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.error, Some(ReconcileError::Timeout { .. }))
    }

    /// Result for a pass cut off by a deadline.
    pub fn timed_out(id: ResourceId, action: Action, state: LifecycleState) -> Self {
        Self {
            action,
            error: Some(ReconcileError::Timeout { action }),
            state,
            ..Self::new(id)
        }
    }
}

/// Dry-run outcome: what a reconcile pass would do.
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub id: ResourceId,
    pub action: Action,
    pub drift: Vec<FieldDrift>,
    /// Exact request body the pass would send.
    pub payload: Payload,
}

struct Inner {
    client: Arc<dyn RemoteClient>,
    config: ReconcilerConfig,
    /// Last observed state per identity. Refreshed on every describe.
    observed: RwLock<HashMap<ResourceId, ObservedState>>,
    states: RwLock<HashMap<ResourceId, LifecycleState>>,
    locks: Mutex<HashMap<ResourceId, Arc<Mutex<()>>>>,
}

/// Lifecycle state machine over a [`RemoteClient`]. Cheap to clone.
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Inner>,
}

impl Reconciler {
    pub fn new(client: Arc<dyn RemoteClient>, config: ReconcilerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                config,
                observed: RwLock::new(HashMap::new()),
                states: RwLock::new(HashMap::new()),
                locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.inner.config
    }

    /// Last observed state, if the resource was seen to exist.
    pub async fn observed(&self, id: &ResourceId) -> Option<ObservedState> {
        self.inner.observed.read().await.get(id).cloned()
    }

    pub async fn state(&self, id: &ResourceId) -> LifecycleState {
        self.inner
            .states
            .read()
            .await
            .get(id)
            .copied()
            .unwrap_or_default()
    }

    /// Bring the remote resource to the descriptor's declared state.
    pub async fn reconcile(&self, descriptor: &ResourceDescriptor) -> ReconciliationResult {
        let id = match validate(descriptor) {
            Ok(id) => id,
            Err(e) => {
                let id = descriptor.display_id();
                error!(%id, error = %e, "Rejected descriptor");
                return ReconciliationResult::rejected(id, e);
            }
        };

        let lock = self.lock_for(&id).await;
        let _guard = lock.lock().await;

        let mut result = ReconciliationResult::new(id.clone());
        info!(%id, "Reconciling");

        let observed = match self.describe(&id, &mut result.retries).await {
            Ok(observed) => observed,
            Err(e) => return self.fail(result, Action::None, e).await,
        };

        match observed {
            None => self.create(descriptor, result).await,
            Some(obs) if obs.status == ResourceStatus::Draining => {
                result.observed = Some(obs);
                let e = ReconcileError::Conflict(format!("{id} is draining; retry once deleted"));
                warn!(%id, "Resource is draining, not recreating yet");
                result.error = Some(e);
                self.set_state(&id, LifecycleState::Deleting).await;
                result.state = LifecycleState::Deleting;
                result
            }
            Some(obs) if obs.status == ResourceStatus::Creating => {
                // A previous pass, or someone else, is mid-create.
                self.set_state(&id, LifecycleState::Creating).await;
                result.action = Action::None;
                match self.settle(&id, &mut result.retries).await {
                    Ok(obs) => self.converge(descriptor, obs, result).await,
                    Err(e) => self.fail_with_state(result, e, LifecycleState::Creating).await,
                }
            }
            Some(obs) => self.converge(descriptor, obs, result).await,
        }
    }

    /// Report what a reconcile pass would do, without mutating anything.
    pub async fn plan(&self, descriptor: &ResourceDescriptor) -> Result<PlanEntry, ReconcileError> {
        let id = validate(descriptor)?;
        let mut delays = Vec::new();

        let observed = match self.describe(&id, &mut delays).await? {
            Some(obs) if obs.status == ResourceStatus::Draining => {
                return Err(ReconcileError::Conflict(format!(
                    "{id} is draining; reconcile would fail until it is deleted"
                )));
            }
            // Diff what the resource settles to, as reconcile would.
            Some(obs) if obs.status == ResourceStatus::Creating => {
                Some(self.settle(&id, &mut delays).await?)
            }
            other => other,
        };

        let entry = match observed {
            None => PlanEntry {
                action: Action::Create,
                drift: drift::diff_absent(descriptor)?,
                payload: projector::project(descriptor)?,
                id,
            },
            Some(obs) => {
                let drift = drift::diff(descriptor, &obs)?;
                if drift.is_empty() {
                    PlanEntry {
                        id,
                        action: Action::None,
                        drift,
                        payload: Payload::new(),
                    }
                } else {
                    let fields: Vec<&str> = drift.iter().map(|d| d.field.as_str()).collect();
                    PlanEntry {
                        id,
                        action: Action::Update,
                        payload: projector::project_fields(descriptor, &fields)?,
                        drift,
                    }
                }
            }
        };

        debug!(id = %entry.id, action = %entry.action, drifted = entry.drift.len(), "Planned");
        Ok(entry)
    }

    /// Delete the resource a descriptor declares.
    pub async fn destroy_descriptor(&self, descriptor: &ResourceDescriptor) -> ReconciliationResult {
        match descriptor.id() {
            Ok(id) => self.destroy(&id, descriptor.delete_options()).await,
            Err(e) => ReconciliationResult::rejected(descriptor.display_id(), e),
        }
    }

    /// Delete a resource by identity. Deleting an absent resource succeeds
    /// with action `none`.
    pub async fn destroy(&self, id: &ResourceId, options: &DeleteOptions) -> ReconciliationResult {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut result = ReconciliationResult::new(id.clone());
        info!(%id, "Destroying");

        let observed = match self.describe(id, &mut result.retries).await {
            Ok(observed) => observed,
            Err(e) => return self.fail(result, Action::None, e).await,
        };

        match observed {
            None => {
                debug!(%id, "Already absent");
                self.set_state(id, LifecycleState::Absent).await;
                result.success = true;
                result
            }
            Some(obs) if obs.status == ResourceStatus::Draining => {
                debug!(%id, "Already draining");
                self.set_state(id, LifecycleState::Deleting).await;
                result.observed = Some(obs);
                result.state = LifecycleState::Deleting;
                result.success = true;
                result
            }
            Some(_) => {
                self.set_state(id, LifecycleState::Deleting).await;
                result.action = Action::Delete;
                info!(target: "audit", %id, force = ?options.force, "Deleting resource");

                let client = &self.inner.client;
                let outcome = self
                    .inner
                    .config
                    .retry
                    .run(id, Action::Delete, &mut result.retries, || {
                        client.delete(&id.kind, &id.name, id.scope.as_deref(), options)
                    })
                    .await;

                match outcome {
                    Ok(()) => {}
                    Err(e) if matches!(e.error, RemoteError::NotFound(_)) => {
                        debug!(%id, "Vanished before delete");
                    }
                    Err(e) => return self.fail(result, Action::Delete, e.into_error(Action::Delete)).await,
                }

                self.inner.observed.write().await.remove(id);
                self.set_state(id, LifecycleState::Absent).await;
                info!(%id, "Deleted");
                result.success = true;
                result
            }
        }
    }

    /// Resource exists and is settled: update drifted fields, if any.
    async fn converge(
        &self,
        descriptor: &ResourceDescriptor,
        observed: ObservedState,
        mut result: ReconciliationResult,
    ) -> ReconciliationResult {
        let id = result.id.clone();
        let drift = match drift::diff(descriptor, &observed) {
            Ok(drift) => drift,
            Err(e) => return self.fail(result, Action::None, e).await,
        };

        if drift.is_empty() {
            debug!(%id, "In sync");
            self.set_state(&id, LifecycleState::Active).await;
            result.state = LifecycleState::Active;
            result.observed = Some(observed);
            result.success = true;
            return result;
        }

        let fields: Vec<&str> = drift.iter().map(|d| d.field.as_str()).collect();
        let payload = match projector::project_fields(descriptor, &fields) {
            Ok(payload) => payload,
            Err(e) => return self.fail(result, Action::Update, e).await,
        };
        info!(target: "audit", %id, fields = ?fields, "Updating resource");
        result.drift = drift;
        result.action = Action::Update;
        self.set_state(&id, LifecycleState::Updating).await;

        let client = &self.inner.client;
        let outcome = self
            .inner
            .config
            .retry
            .run(&id, Action::Update, &mut result.retries, || {
                client.update(&id.kind, &id.name, id.scope.as_deref(), &payload)
            })
            .await;

        if let Err(e) = outcome {
            return self.fail(result, Action::Update, e.into_error(Action::Update)).await;
        }

        // Fold the accepted payload into the cached observation.
        let mut observed = observed;
        observed.fields.extend(payload);
        self.inner
            .observed
            .write()
            .await
            .insert(id.clone(), observed.clone());

        self.set_state(&id, LifecycleState::Active).await;
        result.state = LifecycleState::Active;
        result.observed = Some(observed);
        result.success = true;
        info!(%id, "Updated");
        result
    }

    /// Resource is absent: create it and wait for it to settle.
    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        mut result: ReconciliationResult,
    ) -> ReconciliationResult {
        let id = result.id.clone();
        result.action = Action::Create;

        let payload = match projector::project(descriptor) {
            Ok(payload) => payload,
            Err(e) => return self.fail(result, Action::Create, e).await,
        };
        result.drift = drift::diff_absent(descriptor).unwrap_or_default();

        self.set_state(&id, LifecycleState::Creating).await;
        info!(target: "audit", %id, "Creating resource");

        let client = &self.inner.client;
        let outcome = self
            .inner
            .config
            .retry
            .run(&id, Action::Create, &mut result.retries, || {
                client.create(&id.kind, &id.name, id.scope.as_deref(), &payload)
            })
            .await;

        let adopting = match outcome {
            Ok(handle) => {
                debug!(%id, arn = ?handle.arn, "Create accepted");
                false
            }
            Err(e) if matches!(e.error, RemoteError::AlreadyExists(_)) => {
                // An earlier create may have landed while its response was
                // lost; it can take a while to become visible.
                info!(%id, "Create collided with an existing resource, waiting to adopt it");
                true
            }
            Err(e) => return self.fail(result, Action::Create, e.into_error(Action::Create)).await,
        };

        match self.settle(&id, &mut result.retries).await {
            Ok(obs) if adopting && (obs.name != id.name || obs.scope != id.scope) => {
                result.observed = Some(obs);
                let e = ReconcileError::Conflict(format!(
                    "{id} exists remotely but does not match the declared identity"
                ));
                self.fail(result, Action::Create, e).await
            }
            Ok(obs) => {
                if adopting {
                    info!(%id, "Create already applied, adopted existing resource");
                }
                self.set_state(&id, LifecycleState::Active).await;
                result.state = LifecycleState::Active;
                result.observed = Some(obs);
                result.success = true;
                info!(%id, "Created");
                result
            }
            Err(e) => self.fail_with_state(result, e, LifecycleState::Creating).await,
        }
    }

    /// Poll describe until the resource reports ACTIVE. Not-yet-visible reads
    /// are expected right after a create.
    async fn settle(
        &self,
        id: &ResourceId,
        delays: &mut Vec<Duration>,
    ) -> Result<ObservedState, ReconcileError> {
        let settle = &self.inner.config.settle;
        for poll in 0..settle.attempts.max(1) {
            if poll > 0 {
                tokio::time::sleep(settle.interval).await;
            }
            match self.describe(id, delays).await? {
                Some(obs) if obs.status == ResourceStatus::Active => return Ok(obs),
                Some(obs) if obs.status == ResourceStatus::Draining => {
                    return Err(ReconcileError::Conflict(format!(
                        "{id} started draining while being created"
                    )));
                }
                other => debug!(%id, poll, status = ?other.map(|o| o.status), "Waiting for resource to settle"),
            }
        }
        Err(ReconcileError::Timeout {
            action: Action::Create,
        })
    }

    /// Describe with retry. INACTIVE counts as absent. Refreshes the cache.
    async fn describe(
        &self,
        id: &ResourceId,
        delays: &mut Vec<Duration>,
    ) -> Result<Option<ObservedState>, ReconcileError> {
        let client = &self.inner.client;
        let observed = self
            .inner
            .config
            .retry
            .run(id, Action::None, delays, || {
                client.describe(&id.kind, &id.name, id.scope.as_deref())
            })
            .await
            .map_err(|e| e.into_error(Action::None))?
            .filter(ObservedState::exists);

        let mut cache = self.inner.observed.write().await;
        match &observed {
            Some(obs) => {
                cache.insert(id.clone(), obs.clone());
            }
            None => {
                cache.remove(id);
            }
        }
        Ok(observed)
    }

    async fn fail(
        &self,
        result: ReconciliationResult,
        action: Action,
        error: ReconcileError,
    ) -> ReconciliationResult {
        let mut result = result;
        result.action = action;
        self.fail_with_state(result, error, LifecycleState::Failed).await
    }

    async fn fail_with_state(
        &self,
        mut result: ReconciliationResult,
        error: ReconcileError,
        state: LifecycleState,
    ) -> ReconciliationResult {
        error!(id = %result.id, action = %result.action, error = %error, "Reconcile failed");
        self.set_state(&result.id, state).await;
        result.state = state;
        result.success = false;
        result.error = Some(error);
        if result.observed.is_none() {
            result.observed = self.observed(&result.id).await;
        }
        result
    }

    async fn set_state(&self, id: &ResourceId, state: LifecycleState) {
        self.inner.states.write().await.insert(id.clone(), state);
    }

    async fn lock_for(&self, id: &ResourceId) -> Arc<Mutex<()>> {
        let mut locks = self.inner.locks.lock().await;
        locks.entry(id.clone()).or_default().clone()
    }
}

/// Validation done before any remote call.
fn validate(descriptor: &ResourceDescriptor) -> Result<ResourceId, ReconcileError> {
    descriptor.check_required()?;
    descriptor.id()
}
