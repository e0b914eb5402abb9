//! The schema registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::definition::Definition;
use crate::error::{SchemaError, SchemaErrors};
use crate::plan::{compile, MigrationPlan};
use crate::version::VersionId;

/// All of the information required to migrate a database schema.
///
/// A `Schema` is an explicit registry: whatever assembles the migrations
/// owns it and passes it to each contributor, which calls [`Schema::define`]
/// once per version. Compiled plans are cached until the next definition.
#[derive(Debug, Default)]
pub struct Schema {
    definitions: BTreeMap<VersionId, Definition>,
    duplicates: Vec<Definition>,
    errors: Vec<SchemaError>,
    compiled: Option<Arc<[MigrationPlan]>>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a database schema version.
    ///
    /// Defining the same id twice is recorded as an error. The returned
    /// definition is then detached from the schema, so the first definition
    /// is kept intact.
    pub fn define(&mut self, id: impl Into<VersionId>) -> &mut Definition {
        let id = id.into();
        self.compiled = None;

        if self.definitions.contains_key(&id) {
            self.errors
                .push(SchemaError::new(id, "defined more than once"));
            self.duplicates.push(Definition::new(id));
            let last = self.duplicates.len() - 1;
            return &mut self.duplicates[last];
        }

        self.definitions
            .entry(id)
            .or_insert_with(|| Definition::new(id))
    }

    /// Number of distinct versions defined.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Check if no versions have been defined.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Check if a version has been defined.
    pub fn contains(&self, id: VersionId) -> bool {
        self.definitions.contains_key(&id)
    }

    /// Compiled plans in ascending id order.
    pub fn plans(&mut self) -> Arc<[MigrationPlan]> {
        if let Some(plans) = &self.compiled {
            return Arc::clone(plans);
        }
        let plans: Arc<[MigrationPlan]> = compile(&self.definitions).plans.into();
        self.compiled = Some(Arc::clone(&plans));
        plans
    }

    /// Report every problem in the schema.
    ///
    /// Registry problems come first, followed by each plan's problems in
    /// version order.
    pub fn validate(&mut self) -> Result<(), SchemaErrors> {
        let plans = self.plans();
        let mut errors = self.errors.clone();
        for plan in plans.iter() {
            errors.extend(plan.errors.iter().cloned());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaErrors(errors))
        }
    }
}
