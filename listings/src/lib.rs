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

//! Server-rendered directory of places to stay and the reviews left on them.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

use log::info;
use std::error::Error;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use wanderlust_core::clocks::SystemClock;
use wanderlust_core::db::Db;
use wanderlust_core::env::{get_optional_var, get_required_var};

pub mod db;
mod driver;
use driver::Driver;
pub(crate) mod model;
mod rest;
use rest::app;

/// Database systems the service can persist its data into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DbBackend {
    /// A PostgreSQL server configured via the `PGSQL_PROD_*` variables.
    Postgres,

    /// A local SQLite database.
    Sqlite,
}

impl FromStr for DbBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(DbBackend::Postgres),
            "sqlite" => Ok(DbBackend::Sqlite),
            s => Err(format!("Unknown database backend {}; must be postgres or sqlite", s)),
        }
    }
}

/// Configuration options for the service.
#[derive(Debug, PartialEq)]
pub struct ServiceOptions {
    /// Address to listen on.
    pub bind_addr: SocketAddr,

    /// Database system to use.
    pub backend: DbBackend,

    /// Connection string for the SQLite database, only present when `backend` is `Sqlite`.
    pub sqlite_path: Option<String>,
}

impl ServiceOptions {
    /// Initializes a set of options from environment variables whose name is prefixed with the
    /// given `prefix`.
    ///
    /// This will use variables such as `<prefix>_PORT` and `<prefix>_DB_BACKEND`.
    pub fn from_env(prefix: &str) -> Result<ServiceOptions, String> {
        let ip: IpAddr =
            get_optional_var(prefix, "BIND_ADDR")?.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let port: u16 = get_optional_var(prefix, "PORT")?.unwrap_or(8080);

        let backend = match get_optional_var::<String>(prefix, "DB_BACKEND")? {
            Some(value) => value.parse::<DbBackend>().map_err(|e| {
                format!("Invalid value in environment variable {}_DB_BACKEND: {}", prefix, e)
            })?,
            None => DbBackend::Postgres,
        };

        let sqlite_path = match backend {
            DbBackend::Postgres => None,
            DbBackend::Sqlite => Some(get_required_var::<String>(prefix, "SQLITE_PATH")?),
        };

        Ok(ServiceOptions { bind_addr: SocketAddr::new(ip, port), backend, sqlite_path })
    }
}

/// Connects to the database selected in `opts`.
///
/// The connection is established lazily for PostgreSQL, so errors in reaching the server surface
/// on first use.
pub async fn connect_db(opts: &ServiceOptions) -> Result<Arc<dyn Db + Send + Sync>, Box<dyn Error>> {
    match opts.backend {
        #[cfg(feature = "postgres")]
        DbBackend::Postgres => {
            use wanderlust_core::db::postgres::{PostgresDb, PostgresOptions};

            let db_opts = PostgresOptions::from_env("PGSQL_PROD")?;
            Ok(Arc::new(PostgresDb::connect(db_opts)?))
        }

        #[cfg(feature = "sqlite")]
        DbBackend::Sqlite => {
            let path = opts.sqlite_path.as_deref().unwrap_or(":memory:");
            Ok(Arc::new(wanderlust_core::db::sqlite::connect(path).await?))
        }

        #[allow(unreachable_patterns)]
        backend => Err(format!("Support for the {:?} backend was not built in", backend).into()),
    }
}

/// Instantiates all resources to serve the application on `bind_addr`.
///
/// While it'd be nice to push this responsibility to `main`, doing so would force us to expose many
/// crate-internal types to the public, which in turn would make dead code detection harder.
pub async fn serve(
    bind_addr: SocketAddr,
    db: Arc<dyn Db + Send + Sync>,
) -> Result<(), Box<dyn Error>> {
    let driver = Driver::new(db.clone(), Arc::new(SystemClock::default()));
    let app = app(driver);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Listening on http://{}/listings", listener.local_addr()?);
    let result = axum::serve(listener, app).await;

    db.close().await;
    Ok(result?)
}
