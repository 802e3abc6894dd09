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

//! Test utilities for the business layer.

use crate::db;
use crate::driver::Driver;
use crate::model::*;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::datetime;
use wanderlust_core::clocks::Clock;
use wanderlust_core::clocks::testutils::SettableClock;
use wanderlust_core::db::{Db, Executor};

/// Generates the fields of a listing whose contents derive from `name`.
pub(crate) fn fields(name: &str) -> ListingFields {
    ListingFields::new(
        name.to_owned(),
        format!("All about {}", name),
        format!("https://example.com/{}.png", name),
        Price::new(1500.0).unwrap(),
        "Goa".to_owned(),
        "India".to_owned(),
    )
}

/// State of a running test.
pub(crate) struct TestContext {
    /// The database backing the driver.
    db: Arc<dyn Db + Send + Sync>,

    /// The clock used by the driver.
    clock: Arc<SettableClock>,

    /// The driver under test.
    driver: Driver,
}

impl TestContext {
    /// Initializes a driver backed by an empty in-memory database.
    pub(crate) async fn setup() -> Self {
        let db: Arc<dyn Db + Send + Sync> =
            Arc::new(wanderlust_core::db::sqlite::testutils::setup().await);
        db::init_schema(&mut db.ex().await.unwrap()).await.unwrap();
        let clock = Arc::new(SettableClock::new(datetime!(2023-09-04 18:00:00 UTC)));
        let driver = Driver::new(db.clone(), clock.clone());
        Self { db, clock, driver }
    }

    /// Returns a direct executor against the database.
    pub(crate) async fn ex(&self) -> Executor {
        self.db.ex().await.unwrap()
    }

    /// Returns a copy of the driver to invoke one operation on.
    pub(crate) fn driver(&self) -> Driver {
        self.driver.clone()
    }

    /// Returns the current time of the fake clock.
    pub(crate) fn now(&self) -> OffsetDateTime {
        self.clock.now_utc()
    }

    /// Advances the fake clock by `delta`.
    pub(crate) fn advance_clock(&self, delta: Duration) {
        self.clock.advance(delta);
    }

    /// Creates a listing with `fields(name)` directly in the database.
    pub(crate) async fn put_listing(&self, name: &str) -> ListingId {
        let id = ListingId::new_random();
        db::create_listing(&mut self.ex().await, id, &fields(name)).await.unwrap();
        id
    }

    /// Creates a review and attaches it to `listing_id` directly in the database.
    pub(crate) async fn put_review(&self, listing_id: ListingId, comment: &str, rating: i64) -> Review {
        let review = Review::new(
            ReviewId::new_random(),
            comment.to_owned(),
            Rating::new(rating).unwrap(),
            self.now(),
        );
        let mut ex = self.ex().await;
        db::create_review(&mut ex, &review).await.unwrap();
        db::append_review_ref(&mut ex, listing_id, *review.id()).await.unwrap();
        review
    }
}
