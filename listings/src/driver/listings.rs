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

//! Operations on the collection of listings.

use crate::db;
use crate::driver::Driver;
use crate::model::*;
use wanderlust_core::driver::DriverResult;

impl Driver {
    /// Gets all listings in creation order.
    pub(crate) async fn get_listings(self) -> DriverResult<Vec<Listing>> {
        let mut tx = self.db.begin().await?;
        let listings = db::get_listings(tx.ex()).await?;
        tx.commit().await?;
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testutils::*;

    #[tokio::test]
    async fn test_get_listings_empty() {
        let context = TestContext::setup().await;

        assert!(context.driver().get_listings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_listings_some() {
        let context = TestContext::setup().await;

        let id1 = context.put_listing("first").await;
        let id2 = context.put_listing("second").await;
        let review = context.put_review(id2, "Good", 4).await;

        assert_eq!(
            vec![
                Listing::new(id1, fields("first"), vec![]),
                Listing::new(id2, fields("second"), vec![*review.id()]),
            ],
            context.driver().get_listings().await.unwrap()
        );
    }
}
