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

//! API to delete a listing and all of its reviews.

use crate::driver::Driver;
use crate::rest::parse_listing_id;
use axum::extract::{Path, State};
use axum::response::Redirect;
use wanderlust_core::rest::{EmptyBody, RestResult};

/// API handler.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    Path(id): Path<String>,
    _: EmptyBody,
) -> RestResult<Redirect> {
    let id = parse_listing_id(&id)?;
    driver.delete_listing(id).await?;
    Ok(Redirect::to("/listings"))
}

#[cfg(test)]
mod tests {
    use crate::model::*;
    use crate::rest::testutils::*;
    use axum::http;
    use wanderlust_core::rest::testutils::*;

    fn route(id: &str) -> (http::Method, String) {
        (http::Method::DELETE, format!("/listings/{}", id))
    }

    #[tokio::test]
    async fn test_ok_with_reviews() {
        let context = TestContext::setup().await;

        let id = context.put_listing("Old mill").await;
        for comment in ["One", "Two", "Three"] {
            context.put_review(id, comment).await;
        }
        let other_id = context.put_listing("New mill").await;
        let other_review_id = context.put_review(other_id, "Unrelated").await;
        assert_eq!(4, context.count_reviews().await);

        let location = OneShotBuilder::new(context.app(), route(&id.to_string()))
            .send_empty()
            .await
            .expect_redirect()
            .await;
        assert_eq!("/listings", location);

        assert_eq!(None, context.get_listing(id).await);
        assert_eq!(1, context.count_reviews().await);
        assert_eq!(
            vec![other_review_id],
            context.get_reviews(other_id).await.iter().map(|r| *r.id()).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_method_override_from_form() {
        let context = TestContext::setup().await;

        let id = context.put_listing("Old mill").await;

        OneShotBuilder::new(
            context.app(),
            (http::Method::POST, format!("/listings/{}?_method=DELETE", id)),
        )
        .send_empty()
        .await
        .expect_redirect()
        .await;

        assert_eq!(None, context.get_listing(id).await);
    }

    #[tokio::test]
    async fn test_not_found() {
        let context = TestContext::setup().await;

        let id = context.put_listing("Survivor").await;

        OneShotBuilder::new(context.app(), route(&ListingId::new_random().to_string()))
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("^Listing not found$")
            .await;

        assert!(context.get_listing(id).await.is_some());
    }

    test_payload_must_be_empty!(
        TestContext::setup().await.app(),
        route(&ListingId::new_random().to_string())
    );
}
