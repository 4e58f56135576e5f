//! Per-target execution: plan, download, extract, clean up.
//!
//! # Implementation Note: download batches
//!
//! All packages of a plan are downloaded as one batch, each download holding
//! a permit of the process-wide download semaphore. As soon as a package
//! lands, every job that was only waiting on it is spawned onto a `JoinSet`,
//! so extraction overlaps with the remaining downloads.
//!
//! A connection reset is not an error: the packages that hit one are
//! collected and, after a fixed delay, downloaded again as a new batch. This
//! repeats until nothing transient is left or the run is cancelled.
//!
//! A job is completed (see [`Job::complete`]) only when every one of its
//! extraction calls succeeded.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use miner_schema::{BuildTarget, ResolvedPackage};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::downloads::DownloadTable;
use crate::io::download::{DownloadError, Fetcher};
use crate::io::extract::Extractor;
use crate::job::{Job, JobContext, JobError};
use crate::planner::{Plan, Planner};
use crate::reporter::Reporter;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Failed to create workspace in {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub job: String,
    pub reason: String,
}

/// What happened to every job of one target.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TargetSummary {
    pub target: String,
    pub ran: Vec<String>,
    pub failed: Vec<JobFailure>,
    pub skipped_inapplicable: Vec<String>,
    pub skipped_fresh: Vec<String>,
    pub skipped_infeasible: Vec<String>,
    /// The run was cancelled before every planned job finished.
    pub cancelled: bool,
    /// The target could not be processed at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_secs: f64,
}

impl TargetSummary {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// A target that failed before any job could be considered.
    pub fn errored(target: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(target)
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.error.is_none() && !self.cancelled
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Fixed delay between download batches after a connection reset.
    pub retry_delay: Duration,
    /// Parent directory of per-target workspaces.
    pub tmp_dir: PathBuf,
}

/// Runs the pipeline of one target at a time; shared across targets.
pub struct Coordinator {
    catalog: Arc<dyn Catalog>,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    download_slots: Arc<Semaphore>,
    downloads: DownloadTable,
    reporter: Arc<dyn Reporter>,
    config: CoordinatorConfig,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("download_slots", &self.download_slots.available_permits())
            .field("downloads", &self.downloads.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn Extractor>,
        download_concurrency: usize,
        reporter: Arc<dyn Reporter>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            extractor,
            download_slots: Arc::new(Semaphore::new(download_concurrency.max(1))),
            downloads: DownloadTable::new(),
            reporter,
            config,
        }
    }

    /// The run's URL → local path table.
    pub fn downloads(&self) -> &DownloadTable {
        &self.downloads
    }

    /// Mine every stale, applicable job of `target`.
    ///
    /// Job failures end up in the summary; only failing to set up the target's
    /// workspace is an error.
    pub async fn run_target(
        &self,
        target: Arc<BuildTarget>,
        jobs: &[Arc<dyn Job>],
        cancel: &CancellationToken,
    ) -> Result<TargetSummary, CoordinatorError> {
        let started = Instant::now();
        let mut summary = TargetSummary::new(target.version.to_string());

        let mut runnable = Vec::new();
        for job in jobs {
            if !job.can_run_for(&target) {
                self.reporter.job_skipped(&target, job.name(), "inapplicable");
                summary.skipped_inapplicable.push(job.name().to_string());
            } else if !job.should_run_for(&target) {
                self.reporter.job_skipped(&target, job.name(), "fresh");
                summary.skipped_fresh.push(job.name().to_string());
            } else {
                runnable.push(Arc::clone(job));
            }
        }

        let requirement_sets: Vec<_> = runnable
            .iter()
            .map(|job| job.requirement_sets(&target))
            .collect();
        let plan = Planner::new(self.catalog.as_ref(), &target).plan(&requirement_sets);

        let mut planned = Vec::new();
        for (index, job) in runnable.into_iter().enumerate() {
            if plan.is_planned(index) {
                let packages: Vec<usize> =
                    plan.job_packages(index).into_iter().map(|(i, _)| i).collect();
                if packages.is_empty() && job.run_incrementally() {
                    // Every requirement was optional and none is available.
                    self.reporter.job_skipped(&target, job.name(), "no packages");
                    summary.skipped_infeasible.push(job.name().to_string());
                    continue;
                }
                planned.push(PlannedJob::new(job, packages));
            } else {
                self.reporter.job_skipped(&target, job.name(), "infeasible");
                summary.skipped_infeasible.push(job.name().to_string());
            }
        }

        if planned.is_empty() {
            summary.elapsed_secs = started.elapsed().as_secs_f64();
            return Ok(summary);
        }

        self.reporter.target_started(&target, planned.len());
        tracing::debug!(
            release = %target.label(),
            packages = plan.packages.len(),
            cost = plan.cost,
            "planned"
        );

        tokio::fs::create_dir_all(&self.config.tmp_dir)
            .await
            .map_err(|source| self.workspace_error(source))?;
        let workspace = tempfile::Builder::new()
            .prefix(&format!("{}-", target.version))
            .tempdir_in(&self.config.tmp_dir)
            .map_err(|source| self.workspace_error(source))?;

        let ctx = JobContext {
            target: Arc::clone(&target),
            workspace: workspace.path().to_path_buf(),
            extractor: Arc::clone(&self.extractor),
            cancel: cancel.clone(),
        };
        let urls: Vec<String> = plan.packages.iter().map(|p| p.url.clone()).collect();

        let mut run = TargetRun::new(self, ctx, plan, planned);
        let cancelled = run.download_all().await;
        let outcomes = run.finish().await;

        // Cleanup runs whatever the jobs did.
        self.downloads.release(urls.iter().map(String::as_str));
        if let Err(e) = workspace.close() {
            tracing::warn!(version = %target.version, error = %e, "failed to remove workspace");
        }

        for outcome in outcomes {
            match outcome.status {
                JobStatus::Ran => {
                    self.reporter.job_done(&target, outcome.name);
                    summary.ran.push(outcome.name.to_string());
                }
                JobStatus::Failed(reason) => {
                    self.reporter.job_failed(&target, outcome.name, &reason);
                    summary.failed.push(JobFailure {
                        job: outcome.name.to_string(),
                        reason,
                    });
                }
                JobStatus::Cancelled => summary.cancelled = true,
            }
        }
        summary.cancelled |= cancelled;
        summary.elapsed_secs = started.elapsed().as_secs_f64();
        self.reporter.summary(
            &target,
            summary.ran.len(),
            summary.failed.len(),
            summary.elapsed_secs,
        );
        Ok(summary)
    }

    fn workspace_error(&self, source: std::io::Error) -> CoordinatorError {
        CoordinatorError::Workspace {
            path: self.config.tmp_dir.clone(),
            source,
        }
    }

    /// Download `package` to `dest` under a download permit, reusing a file
    /// this run already has for the same URL.
    async fn download(
        &self,
        package: &ResolvedPackage,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        if let Some(path) = self.downloads.get(&package.url)
            && path.exists()
        {
            return Ok(path);
        }

        let _permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DownloadError::Cancelled),
            permit = self.download_slots.acquire() => permit.map_err(|_| DownloadError::Cancelled)?,
        };
        let fetched = self.fetcher.fetch(package, dest, cancel).await?;
        Ok(self.downloads.insert(&package.url, fetched.path))
    }
}

struct PlannedJob {
    job: Arc<dyn Job>,
    /// Plan indices of the job's packages, in requirement order.
    packages: Vec<usize>,
    waiting: HashSet<usize>,
    completed: usize,
    errors: Vec<String>,
    cancelled: bool,
}

impl PlannedJob {
    fn new(job: Arc<dyn Job>, mut packages: Vec<usize>) -> Self {
        if job.run_incrementally() {
            // One call per distinct package, however many requirements it satisfies.
            let mut seen = HashSet::new();
            packages.retain(|index| seen.insert(*index));
        }
        Self {
            waiting: packages.iter().copied().collect(),
            job,
            packages,
            completed: 0,
            errors: Vec::new(),
            cancelled: false,
        }
    }

    fn expected_calls(&self) -> usize {
        if self.job.run_incrementally() {
            self.packages.len()
        } else {
            1
        }
    }
}

enum JobStatus {
    Ran,
    Failed(String),
    Cancelled,
}

struct JobOutcome {
    name: &'static str,
    status: JobStatus,
}

/// Mutable state of one target's pipeline.
struct TargetRun<'a> {
    coordinator: &'a Coordinator,
    ctx: JobContext,
    plan: Plan,
    jobs: Vec<PlannedJob>,
    ready: HashMap<usize, PathBuf>,
    extractions: JoinSet<(usize, Result<(), JobError>)>,
}

impl<'a> TargetRun<'a> {
    fn new(coordinator: &'a Coordinator, ctx: JobContext, plan: Plan, jobs: Vec<PlannedJob>) -> Self {
        let mut run = Self {
            coordinator,
            ctx,
            plan,
            jobs,
            ready: HashMap::new(),
            extractions: JoinSet::new(),
        };

        // Jobs whose chosen set resolved to no packages at all.
        for index in 0..run.jobs.len() {
            let job = &run.jobs[index];
            if job.packages.is_empty() && !job.job.run_incrementally() {
                run.spawn(index, Vec::new());
            }
        }
        run
    }

    /// Download every package, retrying transient failures. Returns whether
    /// the run was cancelled.
    async fn download_all(&mut self) -> bool {
        let coordinator = self.coordinator;
        let cancel = self.ctx.cancel.clone();
        let download_dir = self.ctx.workspace.join("downloads");
        let mut pending: Vec<usize> = (0..self.plan.packages.len()).collect();

        loop {
            let mut batch: FuturesUnordered<_> = pending
                .iter()
                .map(|&index| {
                    let package = self.plan.packages[index].clone();
                    let dest = download_dir.join(download_name(index, &package));
                    let cancel = cancel.clone();
                    async move {
                        let result = coordinator.download(&package, &dest, &cancel).await;
                        (index, result)
                    }
                })
                .collect();

            let mut retry = Vec::new();
            while let Some((index, result)) = batch.next().await {
                match result {
                    Ok(path) => self.on_ready(index, path),
                    Err(e) if e.is_transient() => {
                        tracing::debug!(package = %self.plan.packages[index], error = %e, "transient download failure");
                        retry.push(index);
                    }
                    Err(DownloadError::Cancelled) => {}
                    Err(e) => self.on_failed(index, &e),
                }
            }

            if cancel.is_cancelled() {
                return true;
            }
            if retry.is_empty() {
                return false;
            }

            retry.sort_unstable();
            let delay = coordinator.config.retry_delay;
            coordinator
                .reporter
                .retrying(&self.ctx.target, retry.len(), delay.as_secs());
            tokio::select! {
                biased;
                () = cancel.cancelled() => return true,
                () = tokio::time::sleep(delay) => {}
            }
            pending = retry;
        }
    }

    fn on_ready(&mut self, index: usize, path: PathBuf) {
        self.ready.insert(index, path);

        let mut to_spawn = Vec::new();
        for (job_index, job) in self.jobs.iter_mut().enumerate() {
            if !job.packages.contains(&index) || !job.errors.is_empty() {
                continue;
            }
            if job.job.run_incrementally() {
                to_spawn.push((job_index, vec![index]));
            } else {
                job.waiting.remove(&index);
                if job.waiting.is_empty() {
                    to_spawn.push((job_index, job.packages.clone()));
                }
            }
        }

        for (job_index, packages) in to_spawn {
            self.spawn(job_index, packages);
        }
    }

    fn on_failed(&mut self, index: usize, error: &DownloadError) {
        let package = &self.plan.packages[index];
        for job in &mut self.jobs {
            if job.packages.contains(&index) {
                job.errors.push(
                    JobError::Download {
                        package: package.to_string(),
                        message: error.to_string(),
                    }
                    .to_string(),
                );
            }
        }
    }

    fn spawn(&mut self, job_index: usize, indices: Vec<usize>) {
        let job = Arc::clone(&self.jobs[job_index].job);
        let ctx = self.ctx.clone();
        let packages: Vec<ResolvedPackage> =
            indices.iter().map(|i| self.plan.packages[*i].clone()).collect();
        let paths: Vec<PathBuf> = indices
            .iter()
            .filter_map(|i| self.ready.get(i).cloned())
            .collect();

        self.extractions.spawn(async move {
            let result = AssertUnwindSafe(job.extract(&ctx, &packages, &paths))
                .catch_unwind()
                .await
                .unwrap_or(Err(JobError::Panicked));
            (job_index, result)
        });
    }

    /// Wait for every spawned extraction, complete the jobs whose calls all
    /// succeeded, and settle each job's status.
    async fn finish(mut self) -> Vec<JobOutcome> {
        while let Some(joined) = self.extractions.join_next().await {
            match joined {
                Ok((index, Ok(()))) => self.jobs[index].completed += 1,
                Ok((index, Err(e))) if e.is_cancelled() => self.jobs[index].cancelled = true,
                Ok((index, Err(e))) => self.jobs[index].errors.push(e.to_string()),
                Err(e) => tracing::error!(error = %e, "extraction task did not complete"),
            }
        }

        for job in &mut self.jobs {
            if !job.errors.is_empty() || job.cancelled || job.completed < job.expected_calls() {
                continue;
            }
            match job.job.complete(&self.ctx).await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => job.cancelled = true,
                Err(e) => job.errors.push(e.to_string()),
            }
        }

        self.jobs
            .iter()
            .map(|job| {
                let status = if !job.errors.is_empty() {
                    JobStatus::Failed(job.errors.join("; "))
                } else if job.cancelled || job.completed < job.expected_calls() {
                    JobStatus::Cancelled
                } else {
                    JobStatus::Ran
                };
                JobOutcome {
                    name: job.job.name(),
                    status,
                }
            })
            .collect()
    }
}

/// Local file name of a download; the index keeps same-named installers apart.
fn download_name(index: usize, package: &ResolvedPackage) -> String {
    match package.file_name() {
        "" => format!("{index}-{}-{}", package.kind, package.platform),
        name => format!("{index}-{name}"),
    }
}
