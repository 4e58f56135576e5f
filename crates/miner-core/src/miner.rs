//! Runs the coordinator over many releases.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use tokio_util::sync::CancellationToken;

use crate::catalog::TargetSource;
use crate::coordinator::{Coordinator, TargetSummary};
use crate::job::Job;
use crate::releases::Release;

/// Mines a list of releases with a bounded number of targets in flight.
pub struct Miner {
    source: Arc<dyn TargetSource>,
    coordinator: Arc<Coordinator>,
    jobs: Vec<Arc<dyn Job>>,
    target_parallelism: usize,
}

impl std::fmt::Debug for Miner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Miner")
            .field("coordinator", &self.coordinator)
            .field("jobs", &self.jobs)
            .field("target_parallelism", &self.target_parallelism)
            .finish_non_exhaustive()
    }
}

impl Miner {
    pub fn new(
        source: Arc<dyn TargetSource>,
        coordinator: Arc<Coordinator>,
        jobs: Vec<Arc<dyn Job>>,
        target_parallelism: usize,
    ) -> Self {
        Self {
            source,
            coordinator,
            jobs,
            target_parallelism: target_parallelism.max(1),
        }
    }

    /// Mine every release; one summary per release, in completion order.
    ///
    /// A release whose catalog cannot be loaded yields a summary with
    /// `error` set and does not stop the others. Once `cancel` fires, releases
    /// not yet started are skipped.
    pub async fn run(&self, releases: Vec<Release>, cancel: &CancellationToken) -> Vec<TargetSummary> {
        stream::iter(releases)
            .map(|release| self.mine(release, cancel))
            .buffer_unordered(self.target_parallelism)
            .filter_map(|summary| async move { summary })
            .collect()
            .await
    }

    async fn mine(&self, release: Release, cancel: &CancellationToken) -> Option<TargetSummary> {
        if cancel.is_cancelled() {
            return None;
        }

        let target = match self.source.load(&release).await {
            Ok(target) => Arc::new(target),
            Err(e) => {
                tracing::error!(version = %release.version, error = %e, "failed to load catalog");
                return Some(TargetSummary::errored(release.version.to_string(), e));
            }
        };

        match self.coordinator.run_target(target, &self.jobs, cancel).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::error!(version = %release.version, error = %e, "target failed");
                Some(TargetSummary::errored(release.version.to_string(), e))
            }
        }
    }
}
