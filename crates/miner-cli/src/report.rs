//! Run summary output.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use miner_core::TargetSummary;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub targets: &'a [TargetSummary],
}

impl<'a> RunReport<'a> {
    pub fn new(targets: &'a [TargetSummary]) -> Self {
        Self {
            generated_at: Utc::now(),
            targets,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Targets that failed as a whole or had at least one failed job.
    pub fn failures(&self) -> usize {
        self.targets.iter().filter(|t| !t.is_success()).count()
    }
}

/// One block per target, failures indented below their target.
pub fn render_plain(targets: &[TargetSummary]) -> String {
    let mut out = String::new();
    for summary in targets {
        if let Some(error) = &summary.error {
            let _ = writeln!(out, "{}: error: {error}", summary.target);
            continue;
        }

        let _ = write!(
            out,
            "{}: {} ran, {} failed, {} skipped",
            summary.target,
            summary.ran.len(),
            summary.failed.len(),
            summary.skipped_inapplicable.len()
                + summary.skipped_fresh.len()
                + summary.skipped_infeasible.len(),
        );
        if summary.cancelled {
            out.push_str(" (cancelled)");
        }
        let _ = writeln!(out, " in {:.1}s", summary.elapsed_secs);
        for failure in &summary.failed {
            let _ = writeln!(out, "  {}: {}", failure.job, failure.reason);
        }
    }
    out
}
