//! End-to-end worker tests against SQLite.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use waymark_core::{
    Action, BackendError, CancellationToken, Executor, MigrationError, Schema, SqliteConnection,
    Value, VersionId, VersionStatus, Worker, WorkerConfig,
};

type Log = Arc<Mutex<Vec<String>>>;

fn new_worker(schema: &mut Schema) -> (Worker<SqliteConnection>, Log) {
    let conn = SqliteConnection::open_in_memory().unwrap();
    with_log(Worker::new(conn, schema, WorkerConfig::default()).unwrap())
}

fn with_log(worker: Worker<SqliteConnection>) -> (Worker<SqliteConnection>, Log) {
    let log: Log = Arc::default();
    let sink = Arc::clone(&log);
    let worker = worker.with_progress(move |m| sink.lock().unwrap().push(m.to_string()));
    (worker, log)
}

fn take(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}

fn applied_ids(worker: &mut Worker<SqliteConnection>) -> Vec<i64> {
    worker
        .versions(&CancellationToken::new())
        .unwrap()
        .into_iter()
        .filter(|v| v.is_applied())
        .map(|v| v.id.get())
        .collect()
}

fn count(worker: &mut Worker<SqliteConnection>, sql: &str) -> i64 {
    let rows = worker.connection_mut().query(sql, &[]).unwrap();
    rows[0].get_i64(0).unwrap()
}

fn two_table_schema() -> Schema {
    let mut schema = Schema::new();
    schema
        .define(10)
        .up("create table t1(id int primary key, name varchar(30));")
        .down("drop table t1;");
    schema
        .define(20)
        .up("create table t2(id int primary key, name varchar(30));")
        .down("drop table t2;");
    schema
}

fn world_schema() -> Schema {
    let mut schema = Schema::new();

    schema
        .define(1)
        .up(r#"
            create table city (
                id integer not null,
                name text not null,
                countrycode character(3) not null,
                district text not null,
                population integer not null
            );
        "#)
        .down("drop table city;");

    schema
        .define(2)
        .up(r#"
            create table country (
                code character(3) not null,
                name text not null,
                continent text not null,
                region text not null,
                population integer not null,
                localname text not null
            );
        "#)
        .down("drop table country;");

    schema
        .define(3)
        .up(r#"
            drop view if exists city_country;

            create view city_country as
                select city.id, city.name, country.name as country_name
                from city
                inner join country on city.countrycode = country.code;
        "#)
        .down("drop view city_country");

    schema
        .define(4)
        .up_action(Action::tx_fn(|tx| {
            tx.execute(
                "insert into city(id, name, countrycode, district, population) values(?, ?, ?, ?, ?)",
                &[
                    Value::from(1),
                    Value::from("Kabul"),
                    Value::from("AFG"),
                    Value::from("Kabol"),
                    Value::from(1_780_000),
                ],
            )?;
            Ok(())
        }))
        .down_action(Action::tx_fn(|tx| {
            tx.execute("delete from city where id = ?", &[Value::from(1)])?;
            Ok(())
        }));

    schema
        .define(5)
        .up_action(Action::db_fn(|db| {
            db.execute(
                "insert into city(id, name, countrycode, district, population) values(?, ?, ?, ?, ?)",
                &[
                    Value::from(2),
                    Value::from("Qandahar"),
                    Value::from("AFG"),
                    Value::from("Qandahar"),
                    Value::from(237_500),
                ],
            )?;
            Ok(())
        }))
        .down_action(Action::db_fn(|db| {
            db.execute("delete from city where id = ?", &[Value::from(2)])?;
            Ok(())
        }));

    schema
        .define(6)
        .up(r#"
            drop view if exists city_country;

            create view city_country as
                select city.id, city.name, country.name as country_name, district
                from city
                inner join country on city.countrycode = country.code;
        "#)
        .down_action(Action::replay(3));

    schema
}

#[test]
fn test_worker_lifecycle() {
    let (mut worker, _log) = new_worker(&mut two_table_schema());
    let cancel = CancellationToken::new();

    worker.up(&cancel).unwrap();
    assert_eq!(applied_ids(&mut worker), vec![10, 20]);

    worker.down(&cancel).unwrap();
    assert!(applied_ids(&mut worker).is_empty());

    let err = worker.goto(&cancel, VersionId(3)).unwrap_err();
    assert_eq!(err.to_string(), "invalid schema version id=3");

    worker.goto(&cancel, VersionId(20)).unwrap();
    worker.lock(&cancel, VersionId(20)).unwrap();

    let err = worker.goto(&cancel, VersionId(10)).unwrap_err();
    assert_eq!(err.to_string(), "database schema version locked id=20");
    let err = worker.goto(&cancel, VersionId::EMPTY).unwrap_err();
    assert_eq!(err.to_string(), "database schema version locked id=20");
    assert_eq!(applied_ids(&mut worker), vec![10, 20]);

    worker.unlock(&cancel, VersionId(20)).unwrap();
    worker.goto(&cancel, VersionId(10)).unwrap();
    worker.goto(&cancel, VersionId::EMPTY).unwrap();

    let version = worker.version(&cancel, VersionId(20)).unwrap();
    assert!(version.applied_at.is_none());

    worker.up(&cancel).unwrap();
    let version = worker.version(&cancel, VersionId(20)).unwrap();
    assert!(version.applied_at.is_some());

    let err = worker.version(&cancel, VersionId(19)).unwrap_err();
    assert_eq!(err.to_string(), "invalid schema version id=19");

    assert_eq!(worker.versions(&cancel).unwrap().len(), 2);
    worker.goto(&cancel, VersionId::EMPTY).unwrap();
}

#[test]
fn test_world_schema_up_then_goto() {
    let (mut worker, log) = new_worker(&mut world_schema());
    let cancel = CancellationToken::new();

    worker.up(&cancel).unwrap();
    worker.goto(&cancel, VersionId(4)).unwrap();

    assert_eq!(
        take(&log),
        vec![
            "migrated up version=1",
            "migrated up version=2",
            "migrated up version=3",
            "migrated up version=4",
            "migrated up version=5",
            "migrated up version=6",
            "migrate up finished version=6",
            "migrated down version=6",
            "migrated down version=5",
            "migrate goto finished version=4",
        ]
    );
    assert_eq!(applied_ids(&mut worker), vec![1, 2, 3, 4]);
    assert_eq!(count(&mut worker, "select count(*) from city"), 1);

    let v3 = worker.version(&cancel, VersionId(3)).unwrap();
    let v6 = worker.version(&cancel, VersionId(6)).unwrap();
    assert_eq!(v6.down, v3.up);

    let v4 = worker.version(&cancel, VersionId(4)).unwrap();
    assert_eq!(v4.up, "(TxFunction)");
    let v5 = worker.version(&cancel, VersionId(5)).unwrap();
    assert_eq!(v5.down, "(DbFunction)");
    assert_eq!(v5.status(), VersionStatus::Unapplied);
}

#[test]
fn test_up_applies_in_id_order() {
    let (mut worker, _log) = new_worker(&mut world_schema());
    worker.up(&CancellationToken::new()).unwrap();

    let versions = worker.versions(&CancellationToken::new()).unwrap();
    let ids: Vec<i64> = versions.iter().map(|v| v.id.get()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);

    let applied_at: Vec<_> = versions.iter().map(|v| v.applied_at.unwrap()).collect();
    assert!(applied_at.windows(2).all(|w| w[0] <= w[1]));
    assert!(versions.iter().all(|v| v.status() == VersionStatus::Applied));
}

#[test]
fn test_down_stops_at_locked_version() {
    let (mut worker, log) = new_worker(&mut world_schema());
    let cancel = CancellationToken::new();
    worker.up(&cancel).unwrap();
    worker.lock(&cancel, VersionId(3)).unwrap();
    take(&log);

    worker.down(&cancel).unwrap();
    assert_eq!(applied_ids(&mut worker), vec![1, 2, 3]);
    assert_eq!(
        take(&log),
        vec![
            "migrated down version=6",
            "migrated down version=5",
            "migrated down version=4",
            "locked version=3",
            "migrate down finished version=3 status=locked",
        ]
    );

    worker.down(&cancel).unwrap();
    assert_eq!(applied_ids(&mut worker), vec![1, 2, 3]);
}

#[test]
fn test_goto_is_idempotent() {
    let (mut worker, log) = new_worker(&mut world_schema());
    let cancel = CancellationToken::new();

    worker.goto(&cancel, VersionId(4)).unwrap();
    assert_eq!(applied_ids(&mut worker), vec![1, 2, 3, 4]);
    take(&log);

    worker.goto(&cancel, VersionId(4)).unwrap();
    assert_eq!(take(&log), vec!["migrate goto finished version=4"]);
    assert_eq!(applied_ids(&mut worker), vec![1, 2, 3, 4]);
}

#[test]
fn test_lock_requires_applied_version() {
    let (mut worker, _log) = new_worker(&mut two_table_schema());
    let cancel = CancellationToken::new();
    worker.goto(&cancel, VersionId(10)).unwrap();

    let err = worker.lock(&cancel, VersionId(20)).unwrap_err();
    assert_eq!(err.to_string(), "cannot lock unapplied version id=20");
    let err = worker.unlock(&cancel, VersionId(20)).unwrap_err();
    assert_eq!(err.to_string(), "cannot unlock unapplied version id=20");
    let err = worker.lock(&cancel, VersionId(30)).unwrap_err();
    assert!(matches!(err, MigrationError::InvalidVersion(VersionId(30))));
}

#[test]
fn test_force_respects_locks() {
    let (mut worker, _log) = new_worker(&mut two_table_schema());
    let cancel = CancellationToken::new();
    worker.up(&cancel).unwrap();
    worker.lock(&cancel, VersionId(20)).unwrap();

    let err = worker.force(&cancel, VersionId(10)).unwrap_err();
    assert!(matches!(err, MigrationError::Locked(VersionId(20))));

    worker.unlock(&cancel, VersionId(20)).unwrap();
    worker.force(&cancel, VersionId(10)).unwrap();
    assert_eq!(applied_ids(&mut worker), vec![10]);

    // Force only rewrites the version table.
    assert_eq!(
        count(&mut worker, "select count(*) from sqlite_master where name = 't2'"),
        1
    );
}

#[test]
fn test_failed_db_function_requires_force() {
    let succeed = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&succeed);

    let mut schema = Schema::new();
    schema
        .define(1)
        .up("create table item(id integer primary key);")
        .down("drop table item;");
    schema
        .define(2)
        .up_action(Action::db_fn(move |db| {
            if !flag.load(Ordering::SeqCst) {
                return Err(BackendError::msg("disk on fire"));
            }
            db.execute_batch("insert into item(id) values(1);")
        }))
        .down("delete from item;");

    let (mut worker, log) = new_worker(&mut schema);
    let cancel = CancellationToken::new();

    let err = worker.up(&cancel).unwrap_err();
    assert!(matches!(
        err,
        MigrationError::Step {
            version: VersionId(2),
            ..
        }
    ));
    assert_eq!(err.to_string(), "migration 2 failed: disk on fire");

    let v2 = worker.version(&cancel, VersionId(2)).unwrap();
    assert_eq!(v2.status(), VersionStatus::Failed);

    for result in [
        worker.up(&cancel),
        worker.down(&cancel),
        worker.goto(&cancel, VersionId(1)),
        worker.lock(&cancel, VersionId(1)),
        worker.unlock(&cancel, VersionId(1)),
    ] {
        assert!(matches!(
            result,
            Err(MigrationError::PreviouslyFailed(VersionId(2)))
        ));
    }

    take(&log);
    worker.force(&cancel, VersionId(1)).unwrap();
    assert_eq!(
        take(&log),
        vec![
            "deleted database schema version id=2",
            "database schema version forced version=1",
        ]
    );

    succeed.store(true, Ordering::SeqCst);
    worker.up(&cancel).unwrap();
    assert_eq!(applied_ids(&mut worker), vec![1, 2]);
    assert_eq!(count(&mut worker, "select count(*) from item"), 1);
}

#[test]
fn test_force_clears_failure_in_place() {
    let mut schema = Schema::new();
    schema
        .define(1)
        .up_action(Action::db_fn(|_| Err(BackendError::msg("partial"))))
        .down("-- nothing");

    let (mut worker, log) = new_worker(&mut schema);
    let cancel = CancellationToken::new();
    assert!(worker.up(&cancel).is_err());
    assert!(matches!(
        worker.versions(&cancel).unwrap()[0].status(),
        VersionStatus::Failed
    ));

    take(&log);
    worker.force(&cancel, VersionId(1)).unwrap();
    assert_eq!(
        take(&log),
        vec![
            "cleared database schema version failure id=1",
            "database schema version forced version=1",
        ]
    );
    assert_eq!(
        worker.version(&cancel, VersionId(1)).unwrap().status(),
        VersionStatus::Applied
    );
    worker.up(&cancel).unwrap();
}

#[test]
fn test_force_unapplied_version() {
    let (mut worker, _log) = new_worker(&mut two_table_schema());
    let cancel = CancellationToken::new();
    worker.goto(&cancel, VersionId(10)).unwrap();

    let err = worker.force(&cancel, VersionId(20)).unwrap_err();
    assert_eq!(err.to_string(), "cannot force unapplied version id=20");

    worker.force(&cancel, VersionId::EMPTY).unwrap();
    assert!(applied_ids(&mut worker).is_empty());
}

#[test]
fn test_force_removes_orphaned_rows() {
    let (mut worker, log) = new_worker(&mut two_table_schema());
    let cancel = CancellationToken::new();
    worker.up(&cancel).unwrap();
    worker
        .connection_mut()
        .execute(
            "insert into schema_migrations(id, applied_at, failed, locked) values(?, ?, ?, ?)",
            &[
                Value::from(99),
                Value::from("2024-01-02 03:04:05+00:00"),
                Value::from(true),
                Value::from(false),
            ],
        )
        .unwrap();

    let versions = worker.versions(&cancel).unwrap();
    assert_eq!(versions.len(), 3);
    assert_eq!(versions[2].id, VersionId(99));
    assert!(matches!(
        worker.up(&cancel),
        Err(MigrationError::PreviouslyFailed(VersionId(99)))
    ));

    take(&log);
    worker.force(&cancel, VersionId(20)).unwrap();
    assert_eq!(
        take(&log),
        vec![
            "deleted database schema version id=99",
            "database schema version forced version=20",
        ]
    );
    worker.up(&cancel).unwrap();
}

#[test]
fn test_force_refuses_locked_orphan_row() {
    let (mut worker, log) = new_worker(&mut two_table_schema());
    let cancel = CancellationToken::new();
    worker.up(&cancel).unwrap();
    worker
        .connection_mut()
        .execute(
            "insert into schema_migrations(id, applied_at, failed, locked) values(?, ?, ?, ?)",
            &[
                Value::from(99),
                Value::from("2024-01-02 03:04:05+00:00"),
                Value::from(false),
                Value::from(true),
            ],
        )
        .unwrap();

    take(&log);
    let err = worker.force(&cancel, VersionId(20)).unwrap_err();
    assert!(matches!(err, MigrationError::Locked(VersionId(99))));
    assert!(take(&log).is_empty());

    let versions = worker.versions(&cancel).unwrap();
    let ids: Vec<i64> = versions.iter().map(|v| v.id.get()).collect();
    assert_eq!(ids, vec![10, 20, 99]);
    assert!(versions[2].locked);
}

#[test]
fn test_failed_tx_function_rolls_back() {
    let mut schema = Schema::new();
    schema
        .define(1)
        .up("create table item(id integer primary key);")
        .down("drop table item;");
    schema
        .define(2)
        .up_action(Action::tx_fn(|tx| {
            tx.execute_batch("insert into item(id) values(1);")?;
            Err(BackendError::msg("constraint violated"))
        }))
        .down("delete from item;");

    let (mut worker, _log) = new_worker(&mut schema);
    let cancel = CancellationToken::new();
    assert!(worker.up(&cancel).is_err());

    assert_eq!(applied_ids(&mut worker), vec![1]);
    assert_eq!(count(&mut worker, "select count(*) from item"), 0);

    // A rolled back step leaves nothing to force.
    worker.down(&cancel).unwrap();
    assert!(applied_ids(&mut worker).is_empty());
}

#[test]
fn test_cancelled_before_start() {
    let (mut worker, log) = new_worker(&mut two_table_schema());
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(matches!(worker.up(&cancel), Err(MigrationError::Cancelled)));
    assert!(matches!(
        worker.goto(&cancel, VersionId(10)),
        Err(MigrationError::Cancelled)
    ));
    assert!(take(&log).is_empty());
    assert!(applied_ids(&mut worker).is_empty());
}

#[test]
fn test_cancelled_between_steps() {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let conn = SqliteConnection::open_in_memory().unwrap();
    let mut worker = Worker::new(conn, &mut world_schema(), WorkerConfig::default())
        .unwrap()
        .with_progress(move |m| {
            if m == "migrated up version=2" {
                token.cancel();
            }
        });

    assert!(matches!(worker.up(&cancel), Err(MigrationError::Cancelled)));
    assert_eq!(applied_ids(&mut worker), vec![1, 2]);

    worker.up(&CancellationToken::new()).unwrap();
    assert_eq!(applied_ids(&mut worker), vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_state_persists_across_workers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("world.db");
    let cancel = CancellationToken::new();

    {
        let conn = SqliteConnection::open(&path).unwrap();
        let mut worker = Worker::new(conn, &mut world_schema(), WorkerConfig::default()).unwrap();
        worker.goto(&cancel, VersionId(3)).unwrap();
        worker.lock(&cancel, VersionId(3)).unwrap();
    }

    let conn = SqliteConnection::open(&path).unwrap();
    let (mut worker, log) = with_log(
        Worker::new(conn, &mut world_schema(), WorkerConfig::default()).unwrap(),
    );
    assert_eq!(applied_ids(&mut worker), vec![1, 2, 3]);
    assert!(worker.version(&cancel, VersionId(3)).unwrap().locked);

    worker.up(&cancel).unwrap();
    assert_eq!(take(&log).last().unwrap(), "migrate up finished version=6");
}

#[test]
fn test_goto_runs_down_steps_before_up_steps() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gap.db");
    let cancel = CancellationToken::new();

    let define = |schema: &mut Schema, id: i64| {
        schema
            .define(id)
            .up(format!("create table t{id}(id integer primary key);"))
            .down(format!("drop table t{id};"));
    };

    {
        let mut schema = Schema::new();
        define(&mut schema, 1);
        define(&mut schema, 3);
        let conn = SqliteConnection::open(&path).unwrap();
        let mut worker = Worker::new(conn, &mut schema, WorkerConfig::default()).unwrap();
        worker.up(&cancel).unwrap();
    }

    let mut schema = Schema::new();
    for id in [1, 2, 3] {
        define(&mut schema, id);
    }
    let conn = SqliteConnection::open(&path).unwrap();
    let (mut worker, log) =
        with_log(Worker::new(conn, &mut schema, WorkerConfig::default()).unwrap());
    assert_eq!(applied_ids(&mut worker), vec![1, 3]);

    worker.goto(&cancel, VersionId(2)).unwrap();
    assert_eq!(
        take(&log),
        vec![
            "migrated down version=3",
            "migrated up version=2",
            "migrate goto finished version=2",
        ]
    );
    assert_eq!(applied_ids(&mut worker), vec![1, 2]);
    assert_eq!(
        count(&mut worker, "select count(*) from sqlite_master where name = 't3'"),
        0
    );
}
