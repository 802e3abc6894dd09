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

//! Entry point to the listings service.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

use log::info;
use wanderlust_listings::db::init_schema;
use wanderlust_listings::{ServiceOptions, connect_db, serve};

#[tokio::main]
async fn main() {
    env_logger::init();

    let opts = ServiceOptions::from_env("WANDERLUST").unwrap();
    info!("Using the {:?} database backend", opts.backend);

    let db = connect_db(&opts).await.unwrap();
    init_schema(&mut db.ex().await.unwrap()).await.unwrap();

    serve(opts.bind_addr, db).await.unwrap()
}
