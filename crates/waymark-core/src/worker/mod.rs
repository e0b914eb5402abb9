//! The migration worker.
//!
//! A [`Worker`] combines the compiled plans of a [`Schema`] with a database
//! connection. Every state-changing operation advances one version per
//! transaction, re-reading the version table at the start of each step.

mod protocol;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::backend::{Connection, Transaction};
use crate::cancel::CancellationToken;
use crate::config::WorkerConfig;
use crate::driver::{find_driver, Driver};
use crate::error::MigrationError;
use crate::plan::{Direction, MigrationPlan};
use crate::schema::Schema;
use crate::summary::VersionSummary;
use crate::version::{Version, VersionId};

use self::protocol::{Outside, Route};

/// Callback receiving human readable progress messages.
pub type ProgressFn = Box<dyn Fn(&str) + Send + Sync>;

/// Performs database migrations against one connection.
pub struct Worker<C: Connection> {
    conn: C,
    plans: Arc<[MigrationPlan]>,
    driver: Box<dyn Driver>,
    config: WorkerConfig,
    progress: Option<ProgressFn>,
    initialized: bool,
}

/// Result of the transactional half of one step.
enum Step {
    /// Nothing left to do in this direction.
    Idle,
    /// The head version is locked; down migrations stop here.
    Locked(VersionId),
    /// The step ran and was recorded inside the transaction.
    Done { id: VersionId, more: bool },
    /// The step must run outside a transaction.
    Deferred {
        id: VersionId,
        work: Outside,
        more: bool,
    },
}

/// Read-only view of the worker used inside a transaction.
struct VersionStore<'w> {
    driver: &'w dyn Driver,
    table: &'w str,
    plans: &'w [MigrationPlan],
}

impl<'w> VersionStore<'w> {
    /// Summary that tolerates failed versions.
    fn summary_allow_failed(
        &self,
        tx: &mut dyn Transaction,
    ) -> Result<VersionSummary<'w>, MigrationError> {
        let rows = self
            .driver
            .list_versions(tx, self.table)
            .map_err(MigrationError::backend("cannot query versions"))?;
        Ok(VersionSummary::build(self.plans, rows))
    }

    /// Summary for a state-changing operation: refuses failed versions.
    fn summary(&self, tx: &mut dyn Transaction) -> Result<VersionSummary<'w>, MigrationError> {
        let vs = self.summary_allow_failed(tx)?;
        vs.ensure_not_failed()?;
        Ok(vs)
    }

    fn insert(&self, tx: &mut dyn Transaction, version: &Version) -> Result<(), MigrationError> {
        self.driver
            .insert_version(tx, self.table, version)
            .map_err(MigrationError::backend(format!(
                "cannot insert migration version {}",
                version.id
            )))
    }

    fn delete(&self, tx: &mut dyn Transaction, id: VersionId) -> Result<(), MigrationError> {
        self.driver
            .delete_version(tx, self.table, id)
            .map_err(MigrationError::backend(format!(
                "cannot delete migration version {id}"
            )))
    }

    fn set_failed(
        &self,
        tx: &mut dyn Transaction,
        id: VersionId,
        failed: bool,
    ) -> Result<(), MigrationError> {
        self.driver
            .set_version_failed(tx, self.table, id, failed)
            .map_err(MigrationError::backend(format!(
                "cannot update migration version {id}"
            )))
    }

    fn set_locked(
        &self,
        tx: &mut dyn Transaction,
        id: VersionId,
        locked: bool,
    ) -> Result<(), MigrationError> {
        self.driver
            .set_version_locked(tx, self.table, id, locked)
            .map_err(MigrationError::backend(format!(
                "cannot update migration version {id}"
            )))
    }
}

impl<C: Connection> Worker<C> {
    /// Create a worker for `conn` using the plans in `schema`.
    ///
    /// Fails if the schema has any definition errors, if the configuration is
    /// invalid, or if no driver handles the connection's backend.
    pub fn new(conn: C, schema: &mut Schema, config: WorkerConfig) -> Result<Self, MigrationError> {
        config.validate()?;
        schema.validate()?;
        let driver = find_driver(conn.backend_name())?;
        Ok(Self {
            conn,
            plans: schema.plans(),
            driver,
            config,
            progress: None,
            initialized: false,
        })
    }

    /// Set the progress callback.
    pub fn with_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(f));
        self
    }

    /// Replace the progress callback.
    pub fn set_progress<F>(&mut self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(f));
    }

    /// The compiled plans, in ascending id order.
    pub fn plans(&self) -> &[MigrationPlan] {
        &self.plans
    }

    /// The worker configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Access the underlying connection.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Unwrap into the underlying connection.
    pub fn into_inner(self) -> C {
        self.conn
    }

    /// Migrate the database to the latest version.
    pub fn up(&mut self, cancel: &CancellationToken) -> Result<(), MigrationError> {
        cancel.check()?;
        self.init()?;
        while self.up_one(cancel)? {}
        self.finished("migrate up finished")
    }

    /// Migrate the database down to the most recent locked version.
    ///
    /// If no version is locked, every down migration is performed.
    pub fn down(&mut self, cancel: &CancellationToken) -> Result<(), MigrationError> {
        cancel.check()?;
        self.init()?;
        while self.down_one(cancel)? {}
        self.finished("migrate down finished")
    }

    /// Migrate up or down to `target`.
    ///
    /// A target of [`VersionId::EMPTY`] removes every migration.
    pub fn goto(
        &mut self,
        cancel: &CancellationToken,
        target: VersionId,
    ) -> Result<(), MigrationError> {
        cancel.check()?;
        if target != VersionId::EMPTY {
            self.check_version(target)?;
        }
        self.init()?;
        while self.goto_one(cancel, target)? {}
        self.finished("migrate goto finished")
    }

    /// Force the database schema to `target`.
    ///
    /// Used to repair a database after a non-transactional migration failed.
    /// Rows above `target` are deleted and a failure on `target` is cleared.
    /// Fails if any row above `target` is locked, even one without a plan.
    /// A target of [`VersionId::EMPTY`] is permitted.
    pub fn force(
        &mut self,
        cancel: &CancellationToken,
        target: VersionId,
    ) -> Result<(), MigrationError> {
        cancel.check()?;
        if target != VersionId::EMPTY {
            self.check_version(target)?;
        }
        self.init()?;

        let messages = self.transact(|store, tx| {
            let vs = store.summary_allow_failed(tx)?;
            vs.check_locked_rows(target)?;

            if target != VersionId::EMPTY && !vs.is_applied(target) {
                return Err(MigrationError::Unapplied {
                    verb: "force",
                    id: target,
                });
            }

            let mut messages = Vec::new();
            for version in vs.versions.values().filter(|v| v.is_applied()) {
                if version.id > target {
                    store.delete(tx, version.id)?;
                    messages.push(format!("deleted database schema version id={}", version.id));
                } else if version.failed {
                    store.set_failed(tx, version.id, false)?;
                    messages.push(format!(
                        "cleared database schema version failure id={}",
                        version.id
                    ));
                }
            }
            Ok(messages)
        })?;

        for message in &messages {
            self.log(message);
        }
        self.finished("database schema version forced")
    }

    /// Lock a version, preventing down migrations past it.
    pub fn lock(&mut self, cancel: &CancellationToken, id: VersionId) -> Result<(), MigrationError> {
        self.set_locked(cancel, id, "lock", true)
    }

    /// Unlock a version.
    pub fn unlock(
        &mut self,
        cancel: &CancellationToken,
        id: VersionId,
    ) -> Result<(), MigrationError> {
        self.set_locked(cancel, id, "unlock", false)
    }

    /// Details of one version.
    pub fn version(
        &mut self,
        cancel: &CancellationToken,
        id: VersionId,
    ) -> Result<Version, MigrationError> {
        cancel.check()?;
        self.check_version(id)?;
        self.init()?;
        self.transact(|store, tx| {
            let vs = store.summary_allow_failed(tx)?;
            vs.version(id)
                .cloned()
                .ok_or(MigrationError::InvalidVersion(id))
        })
    }

    /// Every known version, applied or not, in ascending id order.
    pub fn versions(&mut self, cancel: &CancellationToken) -> Result<Vec<Version>, MigrationError> {
        cancel.check()?;
        self.init()?;
        self.transact(|store, tx| Ok(store.summary_allow_failed(tx)?.into_versions()))
    }

    fn set_locked(
        &mut self,
        cancel: &CancellationToken,
        id: VersionId,
        verb: &'static str,
        locked: bool,
    ) -> Result<(), MigrationError> {
        cancel.check()?;
        self.check_version(id)?;
        self.init()?;
        self.transact(|store, tx| {
            let vs = store.summary(tx)?;
            if !vs.is_applied(id) {
                return Err(MigrationError::Unapplied { verb, id });
            }
            store.set_locked(tx, id, locked)
        })?;
        self.log(&format!("{verb} version={id}"));
        Ok(())
    }

    /// Apply the lowest unapplied plan. Reports whether another is pending.
    fn up_one(&mut self, cancel: &CancellationToken) -> Result<bool, MigrationError> {
        cancel.check()?;
        let transactional_ddl = self.driver.supports_transactional_ddl();

        let step = self.transact(|store, tx| {
            let vs = store.summary(tx)?;
            let Some(plan) = vs.unapplied.first() else {
                return Ok(Step::Idle);
            };
            let more = vs.unapplied.len() > 1;
            let op = plan.operation(Direction::Up)?;

            match protocol::route(op, transactional_ddl) {
                Route::Outside(work) => {
                    return Ok(Step::Deferred {
                        id: plan.id,
                        work,
                        more,
                    });
                }
                Route::InTransaction(work) => {
                    work.run(tx).map_err(MigrationError::step(plan.id))?;
                }
            }
            store.insert(tx, &Version::applied(plan.id, Utc::now()))?;
            Ok(Step::Done { id: plan.id, more })
        })?;

        match step {
            Step::Idle | Step::Locked(_) => Ok(false),
            Step::Done { id, more } => {
                self.log(&format!("migrated up version={id}"));
                Ok(more)
            }
            Step::Deferred { id, work, more } => {
                self.run_outside_transaction(id, Direction::Up, &work)?;
                self.log(&format!("migrated up version={id}"));
                Ok(more)
            }
        }
    }

    /// Reverse the highest applied plan. Reports whether another is applied.
    fn down_one(&mut self, cancel: &CancellationToken) -> Result<bool, MigrationError> {
        cancel.check()?;
        let transactional_ddl = self.driver.supports_transactional_ddl();

        let step = self.transact(|store, tx| {
            let vs = store.summary(tx)?;
            let Some(plan) = vs.applied.first() else {
                return Ok(Step::Idle);
            };
            if vs.version(plan.id).is_some_and(|v| v.locked) {
                return Ok(Step::Locked(plan.id));
            }
            let more = vs.applied.len() > 1;
            let op = plan.operation(Direction::Down)?;

            match protocol::route(op, transactional_ddl) {
                Route::Outside(work) => {
                    return Ok(Step::Deferred {
                        id: plan.id,
                        work,
                        more,
                    });
                }
                Route::InTransaction(work) => {
                    work.run(tx).map_err(MigrationError::step(plan.id))?;
                }
            }
            store.delete(tx, plan.id)?;
            Ok(Step::Done { id: plan.id, more })
        })?;

        match step {
            Step::Idle => Ok(false),
            Step::Locked(id) => {
                warn!(version = %id, "down migration stopped at locked version");
                self.report(&format!("locked version={id}"));
                Ok(false)
            }
            Step::Done { id, more } => {
                self.log(&format!("migrated down version={id}"));
                Ok(more)
            }
            Step::Deferred { id, work, more } => {
                self.run_outside_transaction(id, Direction::Down, &work)?;
                self.log(&format!("migrated down version={id}"));
                Ok(more)
            }
        }
    }

    /// Take one step towards `target`. Reports whether more steps remain.
    fn goto_one(
        &mut self,
        cancel: &CancellationToken,
        target: VersionId,
    ) -> Result<bool, MigrationError> {
        cancel.check()?;
        let (down, up) = self.transact(|store, tx| {
            let vs = store.summary(tx)?;
            vs.check_locked(target)?;
            Ok(vs.steps_to(target))
        })?;

        if down > 0 {
            self.down_one(cancel)?;
            Ok(down - 1 + up > 0)
        } else if up > 0 {
            self.up_one(cancel)?;
            Ok(up - 1 > 0)
        } else {
            Ok(false)
        }
    }

    fn finished(&mut self, message: &str) -> Result<(), MigrationError> {
        let line = self.transact(|store, tx| {
            let vs = store.summary_allow_failed(tx)?;
            let mut line = message.to_string();
            match vs.head() {
                Some(head) => {
                    line.push_str(&format!(" version={}", head.id));
                    if head.locked {
                        line.push_str(" status=locked");
                    }
                    if head.failed {
                        line.push_str(" status=failed");
                    }
                }
                None => line.push_str(" version=0"),
            }
            Ok(line)
        })?;
        self.log(&line);
        Ok(())
    }

    /// Create the version table once per worker.
    fn init(&mut self) -> Result<(), MigrationError> {
        if self.initialized {
            return Ok(());
        }
        let table = &self.config.migrations_table;
        self.driver
            .create_versions_table(&mut self.conn, table)
            .map_err(MigrationError::backend(format!("cannot create table {table}")))?;
        debug!(table = %table, driver = self.driver.name(), "version table ready");
        self.initialized = true;
        Ok(())
    }

    fn check_version(&self, id: VersionId) -> Result<(), MigrationError> {
        self.plans
            .binary_search_by_key(&id, |p| p.id)
            .map(|_| ())
            .map_err(|_| MigrationError::InvalidVersion(id))
    }

    /// Run `f` in a transaction, committing on success and rolling back on
    /// error.
    fn transact<T, F>(&mut self, f: F) -> Result<T, MigrationError>
    where
        F: FnOnce(&VersionStore<'_>, &mut dyn Transaction) -> Result<T, MigrationError>,
    {
        let store = VersionStore {
            driver: &*self.driver,
            table: &self.config.migrations_table,
            plans: &self.plans,
        };
        let mut tx = self
            .conn
            .begin()
            .map_err(MigrationError::backend("cannot begin tx"))?;

        match f(&store, &mut *tx) {
            Ok(value) => {
                tx.commit()
                    .map_err(MigrationError::backend("cannot commit tx"))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "cannot roll back tx");
                }
                Err(err)
            }
        }
    }

    /// Log an applied step or completion message.
    fn log(&self, message: &str) {
        info!("{message}");
        self.report(message);
    }

    fn report(&self, message: &str) {
        if let Some(progress) = &self.progress {
            progress(message);
        }
    }
}

impl<C: Connection + std::fmt::Debug> std::fmt::Debug for Worker<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("conn", &self.conn)
            .field("driver", &self.driver.name())
            .field("config", &self.config)
            .field("plans", &self.plans.len())
            .field("initialized", &self.initialized)
            .finish()
    }
}
