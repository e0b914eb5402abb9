//! Migration plan compilation.
//!
//! Turns raw per-version definitions into an ordered list of plans whose
//! actions never refer to another version.

use std::collections::BTreeMap;

use crate::action::{Action, Operation};
use crate::definition::Definition;
use crate::error::{MigrationError, SchemaError, SchemaErrors};
use crate::version::VersionId;

/// Direction of a single migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Migrate up to a version from the previous one.
    Up,
    /// Migrate down from a version to the previous one.
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// A resolved, replay-free execution unit for one version.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationPlan {
    /// Version this plan migrates to (up) or from (down).
    pub id: VersionId,
    /// Resolved up operation. `None` only when the plan has errors.
    pub up: Option<Operation>,
    /// Resolved down operation. `None` only when the plan has errors.
    pub down: Option<Operation>,
    /// Problems found while compiling this plan.
    pub errors: Vec<SchemaError>,
}

impl MigrationPlan {
    /// The operation for a direction.
    pub fn operation(&self, direction: Direction) -> Result<&Operation, MigrationError> {
        let op = match direction {
            Direction::Up => self.up.as_ref(),
            Direction::Down => self.down.as_ref(),
        };
        op.ok_or_else(|| {
            MigrationError::Schema(SchemaErrors(vec![SchemaError::new(
                self.id,
                format!("{direction} migration not defined"),
            )]))
        })
    }

    /// Rendered text of the operation for a direction, empty if missing.
    pub fn render(&self, direction: Direction) -> String {
        self.operation(direction)
            .map(Operation::render)
            .unwrap_or_default()
    }
}

/// Output of a compilation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compilation {
    /// One plan per definition, in ascending id order.
    pub plans: Vec<MigrationPlan>,
}

impl Compilation {
    /// Every problem found in every plan, in version order.
    pub fn errors(&self) -> Vec<SchemaError> {
        self.plans
            .iter()
            .flat_map(|p| p.errors.iter().cloned())
            .collect()
    }
}

/// Compile definitions into ordered plans.
///
/// Plans are built in ascending id order. A replay is resolved against the
/// plans already built in this pass by copying the target's resolved up
/// operation, so chains of replays collapse to the original action.
pub fn compile(definitions: &BTreeMap<VersionId, Definition>) -> Compilation {
    let mut compiled: BTreeMap<VersionId, usize> = BTreeMap::new();
    let mut plans: Vec<MigrationPlan> = Vec::with_capacity(definitions.len());

    for (&id, def) in definitions {
        let mut errors = def.errors();
        let up = resolve(id, def.up_ref(), &plans, &compiled, &mut errors);
        let down = resolve(id, def.down_ref(), &plans, &compiled, &mut errors);

        compiled.insert(id, plans.len());
        plans.push(MigrationPlan {
            id,
            up,
            down,
            errors,
        });
    }

    Compilation { plans }
}

fn resolve(
    id: VersionId,
    action: Option<&Action>,
    plans: &[MigrationPlan],
    compiled: &BTreeMap<VersionId, usize>,
    errors: &mut Vec<SchemaError>,
) -> Option<Operation> {
    match action? {
        Action::Command(sql) => Some(Operation::Command(sql.clone())),
        Action::DbFunction(f) => Some(Operation::DbFunction(f.clone())),
        Action::TxFunction(f) => Some(Operation::TxFunction(f.clone())),
        Action::Replay(target) => {
            if *target >= id {
                errors.push(SchemaError::new(id, "replay must specify an earlier version"));
                return None;
            }
            match compiled.get(target) {
                Some(&idx) => plans[idx].up.clone(),
                None => {
                    errors.push(SchemaError::new(
                        id,
                        format!("replay refers to unknown version {target}"),
                    ));
                    None
                }
            }
        }
    }
}
