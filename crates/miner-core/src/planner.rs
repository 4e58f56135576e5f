//! Package planner.
//!
//! Given the requirement sets of every job that wants to run for a target, find
//! the cheapest set of upstream packages that satisfies all of them at once.
//!
//! # Implementation Note: best-first search
//!
//! Jobs overlap heavily (most of them want *an* editor, from whichever platform
//! is cheapest), so resolving each job on its own double-counts shared
//! packages. Instead we search over partial package sets covering jobs
//! `0..i`:
//!
//! ```text
//! (∅, 0) --job 0, set A--> ({editor@linux}, 1) --job 1, set A--> ({editor@linux}, 2) = done
//!        \--job 0, set B--> ({editor@macos}, 1) ...
//! ```
//!
//! States are popped cheapest-first. Packages are only ever added and every
//! package has a positive weight, so cost never decreases along a path and the
//! first state that covers every job is optimal.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use miner_schema::{
    BuildTarget, ComponentKind, Platform, Requirement, RequirementSet, ResolvedPackage, matches,
};
use serde::Serialize;

use crate::catalog::Catalog;

pub type Cost = u64;

/// Total weight of the distinct packages in `packages`.
pub fn cost(packages: &[ResolvedPackage]) -> Cost {
    let mut seen = HashSet::new();
    packages
        .iter()
        .filter(|p| seen.insert(p.key()))
        .map(|p| Cost::from(p.weight()))
        .sum()
}

/// A partial package assignment, in the order packages were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSet(Vec<ResolvedPackage>);

impl PackageSet {
    pub fn packages(&self) -> &[ResolvedPackage] {
        &self.0
    }

    pub fn cost(&self) -> Cost {
        cost(&self.0)
    }

    /// Whether a package already in the set satisfies `requirement`.
    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        self.0.iter().any(|p| matches(requirement, p))
    }

    fn with(&self, package: ResolvedPackage) -> Self {
        let mut next = self.0.clone();
        if !next.iter().any(|p| p.key() == package.key()) {
            next.push(package);
        }
        Self(next)
    }

    fn signature(&self) -> Vec<(ComponentKind, Platform)> {
        let mut keys: Vec<_> = self.0.iter().map(ResolvedPackage::key).collect();
        keys.sort_unstable();
        keys
    }
}

/// How one job is satisfied by a [`Plan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobAssignment {
    /// Index of the chosen requirement set in the job's offered sets.
    pub set_index: usize,
    /// For each requirement of the chosen set, the index of the satisfying
    /// package in [`Plan::packages`]; `None` for a missing optional requirement.
    pub package_indices: Vec<Option<usize>>,
}

/// The planner's answer for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// Distinct packages to download.
    pub packages: Vec<ResolvedPackage>,
    /// Per job, in input order. `None` when the job cannot be satisfied.
    pub assignments: Vec<Option<JobAssignment>>,
    pub cost: Cost,
}

impl Plan {
    /// Packages assigned to `job`, in requirement order, with their plan indices.
    pub fn job_packages(&self, job: usize) -> Vec<(usize, &ResolvedPackage)> {
        self.assignments
            .get(job)
            .and_then(Option::as_ref)
            .map(|a| {
                a.package_indices
                    .iter()
                    .flatten()
                    .map(|&i| (i, &self.packages[i]))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `job` has an assignment.
    pub fn is_planned(&self, job: usize) -> bool {
        matches!(self.assignments.get(job), Some(Some(_)))
    }

    /// Indices of jobs the planner could not satisfy.
    pub fn infeasible(&self) -> impl Iterator<Item = usize> + '_ {
        self.assignments
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_none())
            .map(|(i, _)| i)
    }
}

#[derive(Debug, Clone)]
struct SearchState {
    packages: PackageSet,
    next_job: usize,
}

struct FrontierEntry {
    cost: Cost,
    seq: u64,
    state: SearchState,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.seq == other.seq
    }
}

impl Eq for FrontierEntry {}

impl Ord for FrontierEntry {
    // Reversed: `BinaryHeap` is a max-heap and we want the cheapest, oldest entry.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue of search states keyed by cost; ties pop in insertion order.
#[derive(Default)]
struct Frontier {
    heap: BinaryHeap<FrontierEntry>,
    seq: u64,
}

impl Frontier {
    fn push(&mut self, state: SearchState) {
        let cost = state.packages.cost();
        self.heap.push(FrontierEntry {
            cost,
            seq: self.seq,
            state,
        });
        self.seq += 1;
    }

    fn pop(&mut self) -> Option<SearchState> {
        self.heap.pop().map(|e| e.state)
    }
}

/// Resolves requirement sets against one target's catalog.
pub struct Planner<'a> {
    catalog: &'a dyn Catalog,
    target: &'a BuildTarget,
}

impl std::fmt::Debug for Planner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("target", &self.target.version)
            .finish_non_exhaustive()
    }
}

impl<'a> Planner<'a> {
    pub fn new(catalog: &'a dyn Catalog, target: &'a BuildTarget) -> Self {
        Self { catalog, target }
    }

    /// Every concrete package that could satisfy `requirement`.
    ///
    /// A wildcard platform fans out over every platform with catalog data.
    pub fn candidates(&self, requirement: &Requirement) -> Vec<ResolvedPackage> {
        let platforms: Vec<Platform> = if requirement.platform.is_concrete() {
            vec![requirement.platform]
        } else {
            Platform::CONCRETE
                .into_iter()
                .filter(|p| self.catalog.has_data(self.target, *p))
                .collect()
        };

        platforms
            .into_iter()
            .filter(|p| requirement.kind.is_published_by(*p))
            .filter_map(|p| {
                self.catalog
                    .module_url(self.target, p, requirement.kind)
                    .map(|url| ResolvedPackage::new(requirement.kind, p, url))
            })
            .collect()
    }

    /// All ways of extending `base` so that every requirement of `set` is met.
    ///
    /// Requirements already satisfied by `base` add nothing. An optional
    /// requirement with no candidate is skipped; a mandatory one with no
    /// candidate discards the branch. Returns an empty list when the set
    /// cannot be satisfied.
    pub fn expand(&self, base: &PackageSet, set: &RequirementSet) -> Vec<PackageSet> {
        let mut completed = Vec::new();
        let mut work = vec![(base.clone(), 0usize)];

        while let Some((packages, index)) = work.pop() {
            let Some(requirement) = set.get(index) else {
                completed.push(packages);
                continue;
            };

            if packages.satisfies(requirement) {
                work.push((packages, index + 1));
                continue;
            }

            let candidates = self.candidates(requirement);
            if candidates.is_empty() {
                if requirement.allow_missing {
                    work.push((packages, index + 1));
                }
                continue;
            }

            // Reversed so branches complete in candidate order.
            for candidate in candidates.into_iter().rev() {
                work.push((packages.with(candidate), index + 1));
            }
        }

        completed
    }

    /// Whether at least one of `sets` can be satisfied on its own.
    pub fn is_satisfiable(&self, sets: &[RequirementSet]) -> bool {
        sets.iter()
            .any(|set| !self.expand(&PackageSet::default(), set).is_empty())
    }

    /// Minimum-cost plan satisfying every job, or `None` if any job cannot be
    /// satisfied.
    ///
    /// `jobs[i]` is the ordered list of requirement sets job `i` offers.
    pub fn resolve(&self, jobs: &[Vec<RequirementSet>]) -> Option<Plan> {
        let mut frontier = Frontier::default();
        let mut visited = HashSet::new();
        frontier.push(SearchState {
            packages: PackageSet::default(),
            next_job: 0,
        });

        while let Some(state) = frontier.pop() {
            if state.next_job == jobs.len() {
                return finalize(jobs, &state.packages);
            }
            if !visited.insert((state.packages.signature(), state.next_job)) {
                continue;
            }

            for set in &jobs[state.next_job] {
                for packages in self.expand(&state.packages, set) {
                    frontier.push(SearchState {
                        packages,
                        next_job: state.next_job + 1,
                    });
                }
            }
        }

        None
    }

    /// Plan every job that can be satisfied; the rest get no assignment.
    ///
    /// Satisfiability of a job depends only on the catalog, so an infeasible
    /// job is dropped up front instead of making the whole target infeasible.
    pub fn plan(&self, jobs: &[Vec<RequirementSet>]) -> Plan {
        let feasible: Vec<usize> = (0..jobs.len())
            .filter(|&i| self.is_satisfiable(&jobs[i]))
            .collect();
        let subset: Vec<Vec<RequirementSet>> = feasible.iter().map(|&i| jobs[i].clone()).collect();

        let mut assignments = vec![None; jobs.len()];
        let Some(partial) = self.resolve(&subset) else {
            return Plan {
                packages: Vec::new(),
                assignments,
                cost: 0,
            };
        };

        for (slot, assignment) in feasible.into_iter().zip(partial.assignments) {
            assignments[slot] = assignment;
        }
        Plan {
            packages: partial.packages,
            assignments,
            cost: partial.cost,
        }
    }
}

/// Pick each job's set against the final package set and index the packages.
///
/// A job prefers the set with the fewest unmet optional requirements; ties go
/// to the earliest set. Packages no chosen set refers to are dropped.
fn finalize(jobs: &[Vec<RequirementSet>], packages: &PackageSet) -> Option<Plan> {
    let available = packages.packages();
    let mut chosen = Vec::with_capacity(jobs.len());

    for sets in jobs {
        let (set_index, _) = sets
            .iter()
            .enumerate()
            .filter(|(_, set)| {
                set.iter()
                    .filter(|r| !r.allow_missing)
                    .all(|r| available.iter().any(|p| matches(r, p)))
            })
            .map(|(i, set)| {
                let unmet = set
                    .iter()
                    .filter(|r| r.allow_missing && !available.iter().any(|p| matches(r, p)))
                    .count();
                (i, unmet)
            })
            .min_by_key(|&(i, unmet)| (unmet, i))?;

        let indices: Vec<Option<usize>> = sets[set_index]
            .iter()
            .map(|r| available.iter().position(|p| matches(r, p)))
            .collect();
        chosen.push((set_index, indices));
    }

    let mut used: Vec<usize> = chosen
        .iter()
        .flat_map(|(_, indices)| indices.iter().flatten().copied())
        .collect();
    used.sort_unstable();
    used.dedup();

    let remap = |old: usize| used.binary_search(&old).ok();
    let final_packages: Vec<ResolvedPackage> = used.iter().map(|&i| available[i].clone()).collect();
    let assignments = chosen
        .into_iter()
        .map(|(set_index, indices)| {
            Some(JobAssignment {
                set_index,
                package_indices: indices.into_iter().map(|i| i.and_then(remap)).collect(),
            })
        })
        .collect();

    Some(Plan {
        cost: cost(&final_packages),
        packages: final_packages,
        assignments,
    })
}
