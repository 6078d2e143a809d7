//! Batch reconciliation with bounded concurrency and a deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::{ReconciliationResult, Reconciler};
use crate::descriptor::{DeleteOptions, ResourceDescriptor, ResourceId};
use crate::error::ReconcileError;

/// Batch tuning.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum resources in flight at once.
    pub concurrency: usize,
    /// Overall deadline for the batch, measured from its start.
    pub deadline: Option<Duration>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            deadline: None,
        }
    }
}

/// Batch-level outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Success,
    /// Some resources failed while others may have succeeded.
    PartialFailure { failed: Vec<ResourceId> },
}

/// One result per submitted item, in submission order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub results: Vec<ReconciliationResult>,
}

impl BatchReport {
    pub fn failed(&self) -> Vec<&ResourceId> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| &r.id)
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn outcome(&self) -> BatchOutcome {
        let failed: Vec<ResourceId> = self.failed().into_iter().cloned().collect();
        if failed.is_empty() {
            BatchOutcome::Success
        } else {
            BatchOutcome::PartialFailure { failed }
        }
    }
}

impl Reconciler {
    /// Reconcile every descriptor as an independent task. One failure never
    /// aborts the others.
    pub async fn reconcile_batch(
        &self,
        descriptors: Vec<ResourceDescriptor>,
        options: &BatchOptions,
    ) -> BatchReport {
        let items = descriptors
            .into_iter()
            .map(|d| (d.display_id(), d))
            .collect();
        self.run_batch(items, options, |reconciler, descriptor| async move {
            reconciler.reconcile(&descriptor).await
        })
        .await
    }

    /// Destroy every target as an independent task.
    pub async fn destroy_batch(
        &self,
        targets: Vec<(ResourceId, DeleteOptions)>,
        options: &BatchOptions,
    ) -> BatchReport {
        let items = targets
            .into_iter()
            .map(|(id, opts)| (id.clone(), (id, opts)))
            .collect();
        self.run_batch(items, options, |reconciler, (id, opts)| async move {
            reconciler.destroy(&id, &opts).await
        })
        .await
    }

    async fn run_batch<T, F, Fut>(
        &self,
        items: Vec<(ResourceId, T)>,
        options: &BatchOptions,
        work: F,
    ) -> BatchReport
    where
        T: Send + 'static,
        F: Fn(Reconciler, T) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = ReconciliationResult> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
        let deadline = options.deadline.map(|d| Instant::now() + d);
        let ids: Vec<ResourceId> = items.iter().map(|(id, _)| id.clone()).collect();
        info!(
            resources = ids.len(),
            concurrency = options.concurrency,
            deadline = ?options.deadline,
            "Starting batch"
        );

        let mut tasks = JoinSet::new();
        for (index, (id, item)) in items.into_iter().enumerate() {
            let reconciler = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let work = work.clone();
            let runner = reconciler.clone();

            tasks.spawn(async move {
                let pass = async move {
                    let _permit = semaphore.acquire_owned().await;
                    work(runner, item).await
                };
                let result = match deadline {
                    Some(at) => match tokio::time::timeout_at(at, pass).await {
                        Ok(result) => result,
                        Err(_) => {
                            let state = reconciler.state(&id).await;
                            let action = state.in_flight_action();
                            warn!(%id, %action, "Deadline exceeded");
                            ReconciliationResult::timed_out(id, action, state)
                        }
                    },
                    None => pass.await,
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<ReconciliationResult>> = vec![None; ids.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!(error = %e, "Reconcile task aborted"),
            }
        }

        let results = slots
            .into_iter()
            .zip(ids)
            .map(|(slot, id)| {
                slot.unwrap_or_else(|| {
                    ReconciliationResult::rejected(
                        id,
                        ReconcileError::Internal("reconcile task aborted".to_string()),
                    )
                })
            })
            .collect::<Vec<_>>();

        let report = BatchReport { results };
        info!(
            succeeded = report.succeeded(),
            failed = report.results.len() - report.succeeded(),
            "Batch finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryClient;
    use crate::error::ErrorKind;
    use crate::reconciler::ReconcilerConfig;

    #[tokio::test]
    async fn test_panicked_task_is_reported_as_internal() {
        let reconciler = Reconciler::new(Arc::new(MemoryClient::new()), ReconcilerConfig::default());
        let items = vec![
            (ResourceId::new("cluster", "prod", None), false),
            (ResourceId::new("cluster", "broken", None), true),
        ];

        let report = reconciler
            .run_batch(items, &BatchOptions::default(), |reconciler, panics| async move {
                if panics {
                    panic!("bug in reconcile pass");
                }
                let id = ResourceId::new("cluster", "prod", None);
                reconciler.destroy(&id, &DeleteOptions::default()).await
            })
            .await;

        assert!(report.results[0].success);
        let failed = &report.results[1];
        assert_eq!(failed.id.name, "broken");
        assert!(matches!(failed.error, Some(ReconcileError::Internal(_))));
        assert_eq!(failed.error.as_ref().map(ReconcileError::kind), Some(ErrorKind::Fatal));
    }
}
