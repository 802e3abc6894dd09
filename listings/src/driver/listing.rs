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

//! Operations on one listing.

use crate::db;
use crate::driver::{Driver, listing_error};
use crate::model::*;
use log::info;
use wanderlust_core::db::Executor;
use wanderlust_core::driver::DriverResult;

/// Deletes the reviews referenced by the `snapshot` of a listing taken before its deletion.
///
/// Returns the number of reviews that were deleted.
pub(super) async fn cascade_delete_reviews(
    ex: &mut Executor,
    snapshot: &Listing,
) -> DriverResult<usize> {
    let count = db::delete_reviews(ex, snapshot.reviews()).await?;
    if count > 0 {
        info!("Deleted {} reviews of listing {}", count, snapshot.id());
    }
    Ok(count)
}

impl Driver {
    /// Creates a new listing with `fields` and returns its identifier.
    pub(crate) async fn create_listing(self, fields: ListingFields) -> DriverResult<ListingId> {
        let id = ListingId::new_random();

        let mut tx = self.db.begin().await?;
        db::create_listing(tx.ex(), id, &fields).await?;
        tx.commit().await?;

        info!("Created listing {}", id);
        Ok(id)
    }

    /// Gets the listing `id` with all of its reviews.
    pub(crate) async fn get_listing(self, id: ListingId) -> DriverResult<ListingDetails> {
        let mut tx = self.db.begin().await?;
        let listing = db::get_listing(tx.ex(), id).await.map_err(listing_error)?;
        let reviews = db::get_listing_reviews(tx.ex(), id).await?;
        tx.commit().await?;
        Ok(ListingDetails::new(listing, reviews))
    }

    /// Applies `update` to the listing `id` and returns the modified listing.
    pub(crate) async fn update_listing(
        self,
        id: ListingId,
        update: ListingUpdate,
    ) -> DriverResult<Listing> {
        let mut tx = self.db.begin().await?;
        let (id, fields, reviews) =
            db::get_listing(tx.ex(), id).await.map_err(listing_error)?.dissolve();
        let fields = update.apply(fields);
        db::update_listing(tx.ex(), id, &fields).await.map_err(listing_error)?;
        tx.commit().await?;

        info!("Updated listing {}", id);
        Ok(Listing::new(id, fields, reviews))
    }

    /// Deletes the listing `id` along with all of its reviews.
    ///
    /// Returns the number of reviews that were deleted with the listing.
    pub(crate) async fn delete_listing(self, id: ListingId) -> DriverResult<usize> {
        let mut tx = self.db.begin().await?;
        let snapshot = db::get_listing(tx.ex(), id).await.map_err(listing_error)?;
        db::delete_listing(tx.ex(), id).await.map_err(listing_error)?;
        let count = cascade_delete_reviews(tx.ex(), &snapshot).await?;
        tx.commit().await?;

        info!("Deleted listing {}", id);
        Ok(count)
    }
}
