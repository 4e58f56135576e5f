//! Reporter trait for dependency injection
//!
//! Lets the coordinator report progress without being coupled to a
//! particular output. The binary logs through `tracing`; tests use
//! [`NullReporter`].

use miner_schema::{BuildTarget, ResolvedPackage};

pub trait Reporter: Send + Sync {
    /// A target's pipeline has started with `jobs` runnable jobs.
    fn target_started(&self, target: &BuildTarget, jobs: usize);

    /// Progress of a package download.
    fn downloading(&self, package: &ResolvedPackage, current: u64, total: Option<u64>);

    /// A package finished downloading.
    fn downloaded(&self, package: &ResolvedPackage, size: u64);

    /// A transient failure occurred; the remaining downloads are retried
    /// after `delay_secs`.
    fn retrying(&self, target: &BuildTarget, pending: usize, delay_secs: u64);

    /// A job produced its output.
    fn job_done(&self, target: &BuildTarget, job: &str);

    /// A job failed with `reason`.
    fn job_failed(&self, target: &BuildTarget, job: &str, reason: &str);

    /// A job was not run, with a short `reason` (`inapplicable`, `fresh`, `infeasible`).
    fn job_skipped(&self, target: &BuildTarget, job: &str, reason: &str);

    /// A target's pipeline finished.
    fn summary(&self, target: &BuildTarget, ran: usize, failed: usize, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn target_started(&self, target: &BuildTarget, jobs: usize) {
        (**self).target_started(target, jobs)
    }
    fn downloading(&self, package: &ResolvedPackage, current: u64, total: Option<u64>) {
        (**self).downloading(package, current, total)
    }
    fn downloaded(&self, package: &ResolvedPackage, size: u64) {
        (**self).downloaded(package, size)
    }
    fn retrying(&self, target: &BuildTarget, pending: usize, delay_secs: u64) {
        (**self).retrying(target, pending, delay_secs)
    }
    fn job_done(&self, target: &BuildTarget, job: &str) {
        (**self).job_done(target, job)
    }
    fn job_failed(&self, target: &BuildTarget, job: &str, reason: &str) {
        (**self).job_failed(target, job, reason)
    }
    fn job_skipped(&self, target: &BuildTarget, job: &str, reason: &str) {
        (**self).job_skipped(target, job, reason)
    }
    fn summary(&self, target: &BuildTarget, ran: usize, failed: usize, elapsed_secs: f64) {
        (**self).summary(target, ran, failed, elapsed_secs)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn target_started(&self, _: &BuildTarget, _: usize) {}
    fn downloading(&self, _: &ResolvedPackage, _: u64, _: Option<u64>) {}
    fn downloaded(&self, _: &ResolvedPackage, _: u64) {}
    fn retrying(&self, _: &BuildTarget, _: usize, _: u64) {}
    fn job_done(&self, _: &BuildTarget, _: &str) {}
    fn job_failed(&self, _: &BuildTarget, _: &str, _: &str) {}
    fn job_skipped(&self, _: &BuildTarget, _: &str, _: &str) {}
    fn summary(&self, _: &BuildTarget, _: usize, _: usize, _: f64) {}
}

/// Forwards events to `tracing`.
///
/// Download progress is only logged at `trace` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn target_started(&self, target: &BuildTarget, jobs: usize) {
        tracing::info!(release = %target.label(), jobs, "mining");
    }

    fn downloading(&self, package: &ResolvedPackage, current: u64, total: Option<u64>) {
        tracing::trace!(%package, current, total, "downloading");
    }

    fn downloaded(&self, package: &ResolvedPackage, size: u64) {
        tracing::info!(%package, size, "downloaded");
    }

    fn retrying(&self, target: &BuildTarget, pending: usize, delay_secs: u64) {
        tracing::warn!(
            version = %target.version,
            pending,
            delay_secs,
            "connection reset, retrying downloads"
        );
    }

    fn job_done(&self, target: &BuildTarget, job: &str) {
        tracing::info!(version = %target.version, job, "done");
    }

    fn job_failed(&self, target: &BuildTarget, job: &str, reason: &str) {
        tracing::error!(version = %target.version, job, reason, "job failed");
    }

    fn job_skipped(&self, target: &BuildTarget, job: &str, reason: &str) {
        tracing::debug!(version = %target.version, job, reason, "skipped");
    }

    fn summary(&self, target: &BuildTarget, ran: usize, failed: usize, elapsed_secs: f64) {
        tracing::info!(
            version = %target.version,
            ran,
            failed,
            elapsed = format!("{elapsed_secs:.1}s"),
            "finished"
        );
    }
}
