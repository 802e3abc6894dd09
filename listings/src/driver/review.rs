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

//! Operations on the reviews of a listing.

use crate::db;
use crate::driver::{Driver, listing_error};
use crate::model::*;
use log::info;
use wanderlust_core::driver::DriverResult;

impl Driver {
    /// Adds `new_review` at the end of the reviews of the listing `listing_id`.
    pub(crate) async fn create_review(
        self,
        listing_id: ListingId,
        new_review: NewReview,
    ) -> DriverResult<Review> {
        let (comment, rating) = new_review.dissolve();
        let review = Review::new(ReviewId::new_random(), comment, rating, self.clock.now_utc());

        let mut tx = self.db.begin().await?;
        db::get_listing(tx.ex(), listing_id).await.map_err(listing_error)?;
        db::create_review(tx.ex(), &review).await?;
        db::append_review_ref(tx.ex(), listing_id, *review.id()).await.map_err(listing_error)?;
        tx.commit().await?;

        info!("Added review {} to listing {}", review.id(), listing_id);
        Ok(review)
    }

    /// Removes the review `review_id` from the listing `listing_id` and deletes the review.
    ///
    /// Deleting a review that does not exist, or that belongs to another listing, is not an error
    /// and leaves the database untouched.
    pub(crate) async fn delete_review(
        self,
        listing_id: ListingId,
        review_id: ReviewId,
    ) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;
        let held = db::remove_review_ref(tx.ex(), listing_id, review_id).await?;
        let deleted = held && db::delete_review(tx.ex(), review_id).await?;
        tx.commit().await?;

        if deleted {
            info!("Deleted review {} of listing {}", review_id, listing_id);
        }
        Ok(())
    }
}
