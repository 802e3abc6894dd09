// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! SQLite backend.
//!
//! SQLite has no native timestamp type, so timestamps are stored as a pair of integer columns
//! holding the seconds since the epoch and the nanoseconds within that second.  Use
//! `unpack_timestamp` and `build_timestamp` to convert to and from this representation.

use crate::db::{Db, DbError, DbResult, Executor, TxExecutor, split_schema};
use async_trait::async_trait;
use log::warn;
use sqlx::Transaction;
use sqlx::error::ErrorKind;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use time::{Duration, OffsetDateTime};

/// Number of nanoseconds in a second.
const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Takes a raw SQLx error `e` and converts it to our generic error type.
pub fn map_sqlx_error(e: sqlx::Error) -> DbError {
    match e {
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::ForeignKeyViolation => DbError::NotFound,
            ErrorKind::UniqueViolation => DbError::AlreadyExists,
            _ => DbError::BackendError(db.to_string()),
        },
        sqlx::Error::ColumnDecode { source, .. } => DbError::DataIntegrityError(source.to_string()),
        sqlx::Error::PoolTimedOut => DbError::Unavailable,
        sqlx::Error::RowNotFound => DbError::NotFound,
        e => DbError::BackendError(e.to_string()),
    }
}

/// Returns true if `conn_str` names an in-memory database.
fn is_in_memory(conn_str: &str) -> bool {
    let name = conn_str.strip_prefix("sqlite:").unwrap_or(conn_str).trim_start_matches("//");
    name == ":memory:" || name.contains("mode=memory")
}

/// Opens a connection pool against the database described by `conn_str`.
///
/// The `conn_str` can be a path to a file, which is created if missing, or `:memory:` to get a
/// private in-memory database.  Foreign key checks are always enabled.
pub async fn connect(conn_str: &str) -> DbResult<SqliteDb> {
    let options = SqliteConnectOptions::from_str(conn_str)
        .map_err(map_sqlx_error)?
        .create_if_missing(true)
        .foreign_keys(true);

    let mut pool_options = SqlitePoolOptions::new();
    if is_in_memory(conn_str) {
        // An in-memory database is gone as soon as its last connection closes.
        pool_options = pool_options.min_connections(1).idle_timeout(None).max_lifetime(None);
    }

    let pool = pool_options.connect_with(options).await.map_err(map_sqlx_error)?;
    Ok(SqliteDb { pool })
}

/// Executor for the SQLite backend.
#[derive(Debug)]
pub enum SqliteExecutor {
    /// Runs each query on a connection borrowed from the pool, outside of any transaction.
    PoolExec(PoolConnection<Sqlite>),

    /// Runs each query within an open transaction.
    TxExec(Transaction<'static, Sqlite>),
}

impl SqliteExecutor {
    /// Returns the raw connection to issue `sqlx` queries against.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        match self {
            SqliteExecutor::PoolExec(conn) => conn,
            SqliteExecutor::TxExec(tx) => tx,
        }
    }

    /// Commits the transaction behind this executor.
    pub(super) async fn commit(self) -> DbResult<()> {
        match self {
            SqliteExecutor::PoolExec(_) => unreachable!("Only transactions can be committed"),
            SqliteExecutor::TxExec(tx) => tx.commit().await.map_err(map_sqlx_error),
        }
    }
}

/// A database backed by SQLite, either on disk or in memory.
pub struct SqliteDb {
    /// Connections to the database.
    pool: SqlitePool,
}

impl Drop for SqliteDb {
    fn drop(&mut self) {
        if !self.pool.is_closed() {
            warn!("SQLite pool dropped while still open; close() was never called");
        }
    }
}

#[async_trait]
impl Db for SqliteDb {
    async fn ex(&self) -> DbResult<Executor> {
        let conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        Ok(Executor::Sqlite(SqliteExecutor::PoolExec(conn)))
    }

    async fn begin(&self) -> DbResult<TxExecutor> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(TxExecutor(Executor::Sqlite(SqliteExecutor::TxExec(tx))))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Runs every statement in `schema` against `ex`.
pub async fn run_schema(ex: &mut SqliteExecutor, schema: &str) -> DbResult<()> {
    for statement in split_schema(schema) {
        sqlx::query(&statement).execute(ex.conn()).await.map_err(map_sqlx_error)?;
    }
    Ok(())
}

/// Rebuilds a timestamp from its stored seconds `sec` and nanoseconds `nsec`.
pub fn build_timestamp(sec: i64, nsec: i64) -> DbResult<OffsetDateTime> {
    if sec < 0 || !(0..NANOS_PER_SEC).contains(&nsec) {
        return Err(DbError::DataIntegrityError(format!(
            "Invalid stored timestamp: sec={}, nsec={}",
            sec, nsec
        )));
    }

    OffsetDateTime::from_unix_timestamp(sec)
        .ok()
        .and_then(|ts| ts.checked_add(Duration::nanoseconds(nsec)))
        .ok_or_else(|| {
            DbError::DataIntegrityError(format!("Stored timestamp out of range: sec={}", sec))
        })
}

/// Splits `ts` into the seconds and nanoseconds to store in the database.
///
/// Timestamps before the epoch are rejected so that comparing the stored columns in SQL keeps
/// the same order as comparing the timestamps.
pub fn unpack_timestamp(ts: OffsetDateTime) -> DbResult<(i64, i64)> {
    let sec = ts.unix_timestamp();
    if sec < 0 {
        return Err(DbError::DataIntegrityError(format!(
            "Cannot store timestamp {} from before the epoch",
            ts
        )));
    }
    Ok((sec, i64::from(ts.nanosecond())))
}

/// Test utilities for the SQLite connection.
#[cfg(any(feature = "testutils", test))]
pub mod testutils {
    use super::*;

    /// Opens a fresh in-memory database.
    pub async fn setup() -> SqliteDb {
        let _can_fail = env_logger::builder().is_test(true).try_init();
        connect(":memory:").await.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testutils::*;
    use super::*;
    use crate::db::tests::generate_db_rw_tests;
    use time::macros::datetime;

    generate_db_rw_tests!(Box::new(setup().await));

    /// Extracts the SQLite executor out of a generic one.
    fn sqlite_ex(ex: Executor) -> SqliteExecutor {
        match ex {
            Executor::Sqlite(ex) => ex,
            #[allow(unreachable_patterns)]
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_timestamp_round_trip() {
        for ts in [
            datetime!(1970-01-01 00:00:00 UTC),
            datetime!(2023-09-04 18:00:00.000123 UTC),
            datetime!(2039-12-31 23:59:59.999999999 UTC),
        ] {
            let (sec, nsec) = unpack_timestamp(ts).unwrap();
            assert_eq!(ts, build_timestamp(sec, nsec).unwrap());
        }

        assert_eq!(
            (1693850400, 123000),
            unpack_timestamp(datetime!(2023-09-04 18:00:00.000123 UTC)).unwrap()
        );
    }

    #[test]
    fn test_unpack_timestamp_before_epoch() {
        match unpack_timestamp(datetime!(1969-12-31 23:59:59 UTC)) {
            Err(DbError::DataIntegrityError(e)) => assert!(e.contains("before the epoch")),
            e => panic!("Must have failed with a DataIntegrityError but got: {:?}", e),
        }
    }

    #[test]
    fn test_build_timestamp_invalid() {
        for (sec, nsec) in [(-1, 0), (0, -1), (0, NANOS_PER_SEC), (i64::MAX, 0)] {
            match build_timestamp(sec, nsec) {
                Err(DbError::DataIntegrityError(_)) => (),
                e => panic!("({}, {}) must have been rejected but got: {:?}", sec, nsec, e),
            }
        }
    }

    #[test]
    fn test_is_in_memory() {
        assert!(is_in_memory(":memory:"));
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://:memory:"));
        assert!(is_in_memory("file:shared?mode=memory&cache=shared"));
        assert!(!is_in_memory("/var/lib/wanderlust.db"));
        assert!(!is_in_memory("sqlite://wanderlust.db"));
    }

    #[tokio::test]
    async fn test_in_memory_database_outlives_idle_connections() {
        let db = setup().await;

        let mut ex = sqlite_ex(db.ex().await.unwrap());
        run_schema(&mut ex, "CREATE TABLE kept (i INTEGER)").await.unwrap();
        drop(ex);

        // Every connection borrowed above is idle now, which is when they could be reaped.
        let mut tx = db.begin().await.unwrap();
        match tx.ex() {
            Executor::Sqlite(ex) => {
                sqlx::query("INSERT INTO kept (i) VALUES (1)").execute(ex.conn()).await.unwrap();
            }
            #[allow(unreachable_patterns)]
            _ => unreachable!(),
        }
        tx.commit().await.unwrap();

        db.close().await;
    }

    #[tokio::test]
    async fn test_constraint_errors() {
        let db = setup().await;
        let mut ex = sqlite_ex(db.ex().await.unwrap());
        run_schema(
            &mut ex,
            "
            CREATE TABLE parents (id INTEGER PRIMARY KEY);
            CREATE TABLE children (
                id INTEGER PRIMARY KEY,
                parent_id INTEGER NOT NULL REFERENCES parents (id)
            );
            ",
        )
        .await
        .unwrap();

        let err = sqlx::query("INSERT INTO children (id, parent_id) VALUES (1, 5)")
            .execute(ex.conn())
            .await
            .map_err(map_sqlx_error)
            .unwrap_err();
        assert_eq!(DbError::NotFound, err);

        sqlx::query("INSERT INTO parents (id) VALUES (5)").execute(ex.conn()).await.unwrap();
        let err = sqlx::query("INSERT INTO parents (id) VALUES (5)")
            .execute(ex.conn())
            .await
            .map_err(map_sqlx_error)
            .unwrap_err();
        assert_eq!(DbError::AlreadyExists, err);

        drop(ex);
        db.close().await;
    }
}
