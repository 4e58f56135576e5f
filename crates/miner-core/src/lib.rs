//! Core of the editor release miner.
//!
//! For every release ([`BuildTarget`](miner_schema::BuildTarget)) the
//! [`Coordinator`] filters the registered [`Job`]s, asks the [`Planner`] for the
//! cheapest set of upstream packages that satisfies all of them, downloads each
//! distinct package once, and hands the local files to the jobs for extraction.
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod downloads;
pub mod io;
pub mod job;
pub mod jobs;
pub mod layout;
pub mod miner;
pub mod notify;
pub mod paths;
pub mod planner;
pub mod releases;
pub mod reporter;

pub use catalog::{Catalog, CatalogLoader, TargetCatalog, TargetSource};
pub use config::MinerConfig;
pub use coordinator::{Coordinator, CoordinatorConfig, TargetSummary};
pub use job::{Job, JobContext, JobError};
pub use miner::Miner;
pub use notify::ErrorWebhook;
pub use paths::*;
pub use planner::{Plan, Planner};
pub use reporter::{LogReporter, NullReporter, Reporter};

/// User Agent string for catalog and package requests
pub const USER_AGENT: &str = concat!("unity-miner/", env!("CARGO_PKG_VERSION"));
