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

//! PostgreSQL backend.
//!
//! Connections are established lazily, and acquiring one waits with a growing, randomized delay
//! while the server is unreachable.  This lets the service start before its database does.

use crate::db::{Db, DbError, DbResult, Executor, TxExecutor, split_schema};
use crate::env::{get_optional_var, get_required_var};
use async_trait::async_trait;
use derivative::Derivative;
use log::warn;
use sqlx::Transaction;
use sqlx::error::ErrorKind;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions, Postgres};
use std::time::Duration;

/// Port to connect to when the configuration does not name one.
const DEFAULT_PORT: u16 = 5432;

/// Number of times to wait for an unavailable server when the configuration does not say.
const DEFAULT_MAX_RETRIES: u16 = 60;

/// How long to wait for a pooled connection before considering the server unavailable.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound of the delay between two attempts to reach the server, before jitter.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// SQLSTATE raised when the server refuses more clients.
const TOO_MANY_CONNECTIONS: &str = "53300";

/// Takes a raw SQLx error `e` and converts it to our generic error type.
pub fn map_sqlx_error(e: sqlx::Error) -> DbError {
    match e {
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::ForeignKeyViolation => DbError::NotFound,
            ErrorKind::UniqueViolation => DbError::AlreadyExists,
            _ if db.code().as_deref() == Some(TOO_MANY_CONNECTIONS) => DbError::Unavailable,
            _ => DbError::BackendError(db.to_string()),
        },
        sqlx::Error::ColumnDecode { source, .. } => DbError::DataIntegrityError(source.to_string()),
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => DbError::Unavailable,
        sqlx::Error::RowNotFound => DbError::NotFound,
        e => DbError::BackendError(e.to_string()),
    }
}

/// Options to establish a connection to a PostgreSQL database.
#[derive(Derivative)]
#[derivative(Debug)]
#[cfg_attr(test, derivative(PartialEq))]
pub struct PostgresOptions {
    /// Host to connect to.
    pub host: String,

    /// Port to connect to.
    pub port: u16,

    /// Database name to connect to.
    pub database: String,

    /// Username to establish the connection with.
    pub username: String,

    /// Password to establish the connection with.
    #[derivative(Debug = "ignore")]
    pub password: String,

    /// Upper bound on the number of connections kept by the pool.
    pub max_connections: Option<u32>,

    /// Number of times to wait for the server when it is unavailable before giving up.
    pub max_retries: u16,
}

impl PostgresOptions {
    /// Initializes a set of options from environment variables whose name is prefixed with the
    /// given `prefix`.
    ///
    /// `<prefix>_HOST`, `<prefix>_DATABASE`, `<prefix>_USERNAME` and `<prefix>_PASSWORD` are
    /// required.  `<prefix>_PORT`, `<prefix>_MAX_CONNECTIONS` and `<prefix>_MAX_RETRIES` are
    /// optional.
    pub fn from_env(prefix: &str) -> Result<PostgresOptions, String> {
        Ok(PostgresOptions {
            host: get_required_var(prefix, "HOST")?,
            port: get_optional_var(prefix, "PORT")?.unwrap_or(DEFAULT_PORT),
            database: get_required_var(prefix, "DATABASE")?,
            username: get_required_var(prefix, "USERNAME")?,
            password: get_required_var(prefix, "PASSWORD")?,
            max_connections: get_optional_var(prefix, "MAX_CONNECTIONS")?,
            max_retries: get_optional_var(prefix, "MAX_RETRIES")?.unwrap_or(DEFAULT_MAX_RETRIES),
        })
    }
}

/// Executor for the PostgreSQL backend.
#[derive(Debug)]
pub enum PostgresExecutor {
    /// Runs each query on a connection borrowed from the pool, outside of any transaction.
    PoolExec(PoolConnection<Postgres>),

    /// Runs each query within an open transaction.
    TxExec(Transaction<'static, Postgres>),
}

impl PostgresExecutor {
    /// Returns the raw connection to issue `sqlx` queries against.
    pub fn conn(&mut self) -> &mut PgConnection {
        match self {
            PostgresExecutor::PoolExec(conn) => conn,
            PostgresExecutor::TxExec(tx) => tx,
        }
    }

    /// Commits the transaction behind this executor.
    pub(super) async fn commit(self) -> DbResult<()> {
        match self {
            PostgresExecutor::PoolExec(_) => unreachable!("Only transactions can be committed"),
            PostgresExecutor::TxExec(tx) => tx.commit().await.map_err(map_sqlx_error),
        }
    }
}

/// Returns a random delay to spread out the attempts of concurrent clients.
fn jitter() -> Duration {
    Duration::from_millis(u64::from(rand::random::<u16>() % 500))
}

/// Schedule of waits between attempts to reach an unavailable server.
struct Backoff {
    /// Time to sleep before the next attempt.
    delay: Duration,

    /// Number of attempts that may still be made.
    attempts_left: u16,
}

impl Backoff {
    /// Creates a schedule that allows `attempts` more attempts.
    fn new(attempts: u16) -> Self {
        Self { delay: Duration::from_millis(100) + jitter(), attempts_left: attempts }
    }

    /// Sleeps before the next attempt.  Returns false without sleeping when no attempts are left.
    async fn wait(&mut self) -> bool {
        if self.attempts_left == 0 {
            return false;
        }
        self.attempts_left -= 1;

        warn!(
            "PostgreSQL is unavailable; retrying in {}ms ({} attempts left)",
            self.delay.as_millis(),
            self.attempts_left
        );
        tokio::time::sleep(self.delay).await;

        self.delay = (self.delay * 2).min(MAX_RETRY_DELAY) + jitter();
        true
    }
}

/// A database backed by a PostgreSQL server.
pub struct PostgresDb {
    /// Connections to the server.
    pool: PgPool,

    /// Number of times to wait for the server when it is unavailable.
    max_retries: u16,
}

impl Drop for PostgresDb {
    fn drop(&mut self) {
        if !self.pool.is_closed() {
            warn!("PostgreSQL pool dropped while still open; close() was never called");
        }
    }
}

impl PostgresDb {
    /// Prepares a pool of connections described by `opts`.  No connection is opened until the
    /// database is first used.
    pub fn connect(opts: PostgresOptions) -> DbResult<Self> {
        let connect_options = PgConnectOptions::new()
            .host(&opts.host)
            .port(opts.port)
            .database(&opts.database)
            .username(&opts.username)
            .password(&opts.password);

        let mut pool_options = PgPoolOptions::new().acquire_timeout(ACQUIRE_TIMEOUT);
        if let Some(max_connections) = opts.max_connections {
            pool_options = pool_options.max_connections(max_connections);
        }

        let pool = pool_options.connect_lazy_with(connect_options);
        Ok(Self { pool, max_retries: opts.max_retries })
    }

    /// Borrows a connection from the pool, waiting for the server if it is unavailable.
    async fn acquire(&self) -> DbResult<PoolConnection<Postgres>> {
        let mut backoff = Backoff::new(self.max_retries);
        loop {
            let result = self.pool.acquire().await.map_err(map_sqlx_error);
            if matches!(result, Err(DbError::Unavailable)) && backoff.wait().await {
                continue;
            }
            return result;
        }
    }
}

#[async_trait]
impl Db for PostgresDb {
    async fn ex(&self) -> DbResult<Executor> {
        let conn = self.acquire().await?;
        Ok(Executor::Postgres(PostgresExecutor::PoolExec(conn)))
    }

    async fn begin(&self) -> DbResult<TxExecutor> {
        let mut backoff = Backoff::new(self.max_retries);
        let tx = loop {
            match self.pool.begin().await.map_err(map_sqlx_error) {
                Ok(tx) => break tx,
                Err(DbError::Unavailable) => {
                    if !backoff.wait().await {
                        return Err(DbError::Unavailable);
                    }
                }
                Err(e) => return Err(e),
            }
        };
        Ok(TxExecutor(Executor::Postgres(PostgresExecutor::TxExec(tx))))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Runs every statement in `schema` against `ex`.
pub async fn run_schema(ex: &mut PostgresExecutor, schema: &str) -> DbResult<()> {
    for statement in split_schema(schema) {
        sqlx::query(&statement).execute(ex.conn()).await.map_err(map_sqlx_error)?;
    }
    Ok(())
}

/// Test utilities for the PostgreSQL connection.
#[cfg(any(feature = "testutils", test))]
pub mod testutils {
    use super::*;

    /// Connects to the server configured in the `PGSQL_TEST_*` variables.
    ///
    /// Every table lives in the `pg_temp` schema of the single pooled connection, so each test
    /// starts from an empty database and leaves nothing behind.  Errors panic.
    pub async fn setup() -> PostgresDb {
        let _can_fail = env_logger::builder().is_test(true).try_init();

        let opts = PostgresOptions {
            max_connections: Some(1),
            ..PostgresOptions::from_env("PGSQL_TEST").unwrap()
        };
        let db = PostgresDb::connect(opts).unwrap();

        let mut conn = db.acquire().await.unwrap();
        sqlx::query("SET search_path TO pg_temp").execute(&mut *conn).await.unwrap();
        db
    }
}

#[cfg(test)]
mod tests {
    use super::testutils::*;
    use super::*;
    use crate::db::tests::generate_db_rw_tests;

    generate_db_rw_tests!(
        Box::new(setup().await),
        #[ignore = "Requires environment configuration and is expensive"]
    );

    /// Runs `from_env` with the `OPTS_*` variables set to `vars` and every other one unset.
    fn from_env_with(vars: &[(&str, &str)]) -> Result<PostgresOptions, String> {
        let names = [
            "OPTS_HOST",
            "OPTS_PORT",
            "OPTS_DATABASE",
            "OPTS_USERNAME",
            "OPTS_PASSWORD",
            "OPTS_MAX_CONNECTIONS",
            "OPTS_MAX_RETRIES",
        ];
        let all = names
            .iter()
            .map(|name| (*name, vars.iter().find(|(n, _)| n == name).map(|(_, v)| *v)))
            .collect::<Vec<(&str, Option<&str>)>>();
        temp_env::with_vars(all, || PostgresOptions::from_env("OPTS"))
    }

    /// Minimal set of variables for `from_env_with` to succeed.
    const REQUIRED: &[(&str, &str)] = &[
        ("OPTS_HOST", "db.example.com"),
        ("OPTS_DATABASE", "wanderlust"),
        ("OPTS_USERNAME", "app"),
        ("OPTS_PASSWORD", "s3cr3t"),
    ];

    #[test]
    fn test_postgres_options_defaults() {
        let opts = from_env_with(REQUIRED).unwrap();
        assert_eq!(
            PostgresOptions {
                host: "db.example.com".to_owned(),
                port: DEFAULT_PORT,
                database: "wanderlust".to_owned(),
                username: "app".to_owned(),
                password: "s3cr3t".to_owned(),
                max_connections: None,
                max_retries: DEFAULT_MAX_RETRIES,
            },
            opts
        );
    }

    #[test]
    fn test_postgres_options_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([("OPTS_PORT", "6543"), ("OPTS_MAX_CONNECTIONS", "8"), ("OPTS_MAX_RETRIES", "0")]);
        let opts = from_env_with(&vars).unwrap();
        assert_eq!(6543, opts.port);
        assert_eq!(Some(8), opts.max_connections);
        assert_eq!(0, opts.max_retries);
    }

    #[test]
    fn test_postgres_options_errors() {
        let vars =
            REQUIRED.iter().copied().filter(|(n, _)| *n != "OPTS_DATABASE").collect::<Vec<_>>();
        assert!(from_env_with(&vars).unwrap_err().contains("OPTS_DATABASE not present"));

        let mut vars = REQUIRED.to_vec();
        vars.push(("OPTS_PORT", "http"));
        assert!(from_env_with(&vars).unwrap_err().contains("OPTS_PORT"));
    }

    #[test]
    fn test_postgres_options_debug_hides_password() {
        let opts = from_env_with(REQUIRED).unwrap();
        let debug = format!("{:?}", opts);
        assert!(debug.contains("db.example.com"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn test_map_sqlx_error() {
        assert_eq!(DbError::NotFound, map_sqlx_error(sqlx::Error::RowNotFound));
        assert_eq!(DbError::Unavailable, map_sqlx_error(sqlx::Error::PoolTimedOut));
        assert_eq!(
            DbError::Unavailable,
            map_sqlx_error(sqlx::Error::Io(std::io::ErrorKind::ConnectionRefused.into()))
        );
    }

    #[tokio::test]
    async fn test_backoff_runs_out() {
        let mut backoff = Backoff::new(1);
        assert!(backoff.wait().await);
        assert!(!backoff.wait().await);

        assert!(!Backoff::new(0).wait().await);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let opts = PostgresOptions {
            host: "127.0.0.1".to_owned(),
            port: 1,
            database: "none".to_owned(),
            username: "none".to_owned(),
            password: "none".to_owned(),
            max_connections: Some(1),
            max_retries: 0,
        };
        let db = PostgresDb::connect(opts).unwrap();
        assert_eq!(DbError::Unavailable, db.ex().await.unwrap_err());
        db.close().await;
    }
}
