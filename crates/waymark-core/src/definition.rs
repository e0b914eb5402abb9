//! Per-version migration definitions, as written by a schema author.

use crate::action::Action;
use crate::error::SchemaError;
use crate::version::VersionId;

/// Defines a database schema version, the action that migrates up to it
/// from the previous version, and the action that migrates back down.
///
/// Each direction must be set exactly once. Problems are collected rather
/// than reported immediately, so a whole schema can be checked in one pass.
///
/// ```
/// use waymark_core::{Action, Schema};
///
/// let mut schema = Schema::new();
/// schema
///     .define(1)
///     .up("create table city(id integer primary key, name text)")
///     .down("drop table city");
/// schema
///     .define(2)
///     .up_action(Action::replay(1))
///     .down("drop table city");
/// ```
#[derive(Debug, Clone)]
pub struct Definition {
    id: VersionId,
    up: Option<Action>,
    up_count: usize,
    down: Option<Action>,
    down_count: usize,
}

impl Definition {
    /// Start a definition with neither direction set.
    ///
    /// Most callers use [`Schema::define`](crate::Schema::define) instead.
    pub fn new(id: VersionId) -> Self {
        Self {
            id,
            up: None,
            up_count: 0,
            down: None,
            down_count: 0,
        }
    }

    /// The version being defined.
    pub fn id(&self) -> VersionId {
        self.id
    }

    /// Define the SQL that migrates up to this version.
    ///
    /// Shorthand for `up_action(Action::command(sql))`.
    pub fn up(&mut self, sql: impl Into<String>) -> &mut Self {
        self.up_action(Action::command(sql))
    }

    /// Define the action that migrates up to this version.
    pub fn up_action(&mut self, action: Action) -> &mut Self {
        self.up_count += 1;
        self.up = Some(action);
        self
    }

    /// Define the SQL that migrates down to the previous version.
    ///
    /// Shorthand for `down_action(Action::command(sql))`.
    pub fn down(&mut self, sql: impl Into<String>) -> &mut Self {
        self.down_action(Action::command(sql))
    }

    /// Define the action that migrates down to the previous version.
    pub fn down_action(&mut self, action: Action) -> &mut Self {
        self.down_count += 1;
        self.down = Some(action);
        self
    }

    pub(crate) fn up_ref(&self) -> Option<&Action> {
        self.up.as_ref()
    }

    pub(crate) fn down_ref(&self) -> Option<&Action> {
        self.down.as_ref()
    }

    /// Structural problems with this definition.
    pub fn errors(&self) -> Vec<SchemaError> {
        let mut errors = Vec::new();
        for (direction, count) in [("up", self.up_count), ("down", self.down_count)] {
            match count {
                0 => errors.push(SchemaError::new(
                    self.id,
                    format!("{direction} migration not defined"),
                )),
                1 => {}
                n => errors.push(SchemaError::new(
                    self.id,
                    format!("{direction} migration defined {n} times"),
                )),
            }
        }
        errors
    }
}
