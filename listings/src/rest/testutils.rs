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

//! Test utilities for the REST API.

use crate::db;
use crate::driver::Driver;
use crate::model::*;
use crate::rest::app;
use axum::Router;
use serde_json::{Value, json};
use std::sync::Arc;
use time::macros::datetime;
use wanderlust_core::clocks::testutils::SettableClock;
use wanderlust_core::db::{Db, Executor};

/// Returns a JSON payload with all fields of a valid listing derived from `name`.
pub(crate) fn listing_payload(name: &str) -> Value {
    json!({
        "title": name,
        "description": format!("A stay at {}", name),
        "image": format!("https://example.com/{}.jpg", name),
        "price": 2500,
        "location": "Kochi",
        "country": "India",
    })
}

/// Returns the fields that `listing_payload(name)` describes.
pub(crate) fn listing_fields(name: &str) -> ListingFields {
    ListingFields::new(
        name.to_owned(),
        format!("A stay at {}", name),
        format!("https://example.com/{}.jpg", name),
        Price::new(2500.0).unwrap(),
        "Kochi".to_owned(),
        "India".to_owned(),
    )
}

/// State of a running test.
pub(crate) struct TestContext {
    /// The database backing the app.
    db: Arc<dyn Db + Send + Sync>,

    /// The app under test.
    app: Router,
}

impl TestContext {
    /// Initializes an app backed by an empty in-memory database.
    pub(crate) async fn setup() -> Self {
        let db: Arc<dyn Db + Send + Sync> =
            Arc::new(wanderlust_core::db::sqlite::testutils::setup().await);
        db::init_schema(&mut db.ex().await.unwrap()).await.unwrap();
        let clock = Arc::new(SettableClock::new(datetime!(2023-09-04 18:00:00 UTC)));
        let driver = Driver::new(db.clone(), clock);
        let app = app(driver);
        Self { db, app }
    }

    /// Returns a copy of the app to send one request to.
    pub(crate) fn app(&self) -> Router {
        self.app.clone()
    }

    /// Returns a direct executor against the database.
    async fn ex(&self) -> Executor {
        self.db.ex().await.unwrap()
    }

    /// Creates a listing with `listing_fields(name)` directly in the database.
    pub(crate) async fn put_listing(&self, name: &str) -> ListingId {
        let id = ListingId::new_random();
        db::create_listing(&mut self.ex().await, id, &listing_fields(name)).await.unwrap();
        id
    }

    /// Creates a review and attaches it to `listing_id` directly in the database.
    pub(crate) async fn put_review(&self, listing_id: ListingId, comment: &str) -> ReviewId {
        let review = Review::new(
            ReviewId::new_random(),
            comment.to_owned(),
            Rating::new(3).unwrap(),
            datetime!(2023-09-01 10:00:00 UTC),
        );
        let mut ex = self.ex().await;
        db::create_review(&mut ex, &review).await.unwrap();
        db::append_review_ref(&mut ex, listing_id, *review.id()).await.unwrap();
        *review.id()
    }

    /// Gets the listing `id` from the database, if it exists.
    pub(crate) async fn get_listing(&self, id: ListingId) -> Option<Listing> {
        match db::get_listing(&mut self.ex().await, id).await {
            Ok(listing) => Some(listing),
            Err(wanderlust_core::db::DbError::NotFound) => None,
            Err(e) => panic!("{:?}", e),
        }
    }

    /// Gets all listings from the database.
    pub(crate) async fn get_listings(&self) -> Vec<Listing> {
        db::get_listings(&mut self.ex().await).await.unwrap()
    }

    /// Gets the reviews of `listing_id` from the database.
    pub(crate) async fn get_reviews(&self, listing_id: ListingId) -> Vec<Review> {
        db::get_listing_reviews(&mut self.ex().await, listing_id).await.unwrap()
    }

    /// Counts all reviews in the database, attached to a listing or not.
    pub(crate) async fn count_reviews(&self) -> usize {
        db::count_reviews(&mut self.ex().await).await.unwrap()
    }
}
