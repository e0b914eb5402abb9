//! Point-in-time view of which plans have been applied.

use std::collections::BTreeMap;

use crate::error::MigrationError;
use crate::plan::{Direction, MigrationPlan};
use crate::version::{Version, VersionId};

/// Derived view over the persisted version rows and the compiled plans.
///
/// Computed fresh inside each transaction and never persisted.
#[derive(Debug, Clone)]
pub struct VersionSummary<'p> {
    /// Persisted rows plus placeholders for unapplied plans, keyed by id.
    pub versions: BTreeMap<VersionId, Version>,
    /// Applied plans, most recently applied (highest id) first.
    pub applied: Vec<&'p MigrationPlan>,
    /// Unapplied plans, lowest id first.
    pub unapplied: Vec<&'p MigrationPlan>,
}

impl<'p> VersionSummary<'p> {
    /// Partition `plans` by whether `rows` contains their id.
    ///
    /// Rows whose id has no plan are kept in `versions`, so they can still be
    /// listed and forced, but belong to neither partition.
    pub fn build(plans: &'p [MigrationPlan], rows: Vec<Version>) -> Self {
        let mut versions: BTreeMap<VersionId, Version> =
            rows.into_iter().map(|v| (v.id, v)).collect();
        let mut applied = Vec::new();
        let mut unapplied = Vec::new();

        for plan in plans {
            let version = versions.entry(plan.id).or_insert_with(|| {
                unapplied.push(plan);
                Version::unapplied(plan.id)
            });
            if version.is_applied() {
                applied.push(plan);
            }
            version.up = plan.render(Direction::Up);
            version.down = plan.render(Direction::Down);
        }

        applied.sort_by(|a, b| b.id.cmp(&a.id));
        unapplied.sort_by_key(|p| p.id);

        Self {
            versions,
            applied,
            unapplied,
        }
    }

    /// The most recently applied plan's version.
    pub fn head(&self) -> Option<&Version> {
        self.applied.first().and_then(|p| self.versions.get(&p.id))
    }

    /// Highest applied id, or [`VersionId::EMPTY`].
    pub fn highest_applied(&self) -> VersionId {
        self.applied.first().map_or(VersionId::EMPTY, |p| p.id)
    }

    /// A version by id.
    pub fn version(&self, id: VersionId) -> Option<&Version> {
        self.versions.get(&id)
    }

    /// Check if a plan with this id has been applied.
    pub fn is_applied(&self, id: VersionId) -> bool {
        self.applied.iter().any(|p| p.id == id)
    }

    /// Fail if any applied version above `target` is locked.
    ///
    /// Scans from the highest applied id down and stops at the first id at or
    /// below `target`.
    pub fn check_locked(&self, target: VersionId) -> Result<(), MigrationError> {
        for plan in self.applied.iter().take_while(|p| p.id > target) {
            if self.versions.get(&plan.id).is_some_and(|v| v.locked) {
                return Err(MigrationError::Locked(plan.id));
            }
        }
        Ok(())
    }

    /// Fail if any persisted row above `target` is locked.
    ///
    /// Unlike [`check_locked`](Self::check_locked) this includes rows whose
    /// plan no longer exists.
    pub fn check_locked_rows(&self, target: VersionId) -> Result<(), MigrationError> {
        match self
            .versions
            .values()
            .rev()
            .take_while(|v| v.id > target)
            .find(|v| v.is_applied() && v.locked)
        {
            Some(v) => Err(MigrationError::Locked(v.id)),
            None => Ok(()),
        }
    }

    /// Fail if any persisted version is marked failed.
    pub fn ensure_not_failed(&self) -> Result<(), MigrationError> {
        match self.versions.values().find(|v| v.failed) {
            Some(v) => Err(MigrationError::PreviouslyFailed(v.id)),
            None => Ok(()),
        }
    }

    /// Number of down steps and up steps needed to reach `target`.
    pub fn steps_to(&self, target: VersionId) -> (usize, usize) {
        let down = self.applied.iter().take_while(|p| p.id > target).count();
        let up = self.unapplied.iter().take_while(|p| p.id <= target).count();
        (down, up)
    }

    /// All versions in ascending id order.
    pub fn into_versions(self) -> Vec<Version> {
        self.versions.into_values().collect()
    }
}
