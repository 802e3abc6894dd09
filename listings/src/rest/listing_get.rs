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

//! API to view one listing and its reviews.

use crate::driver::Driver;
use crate::rest::{parse_listing_id, views};
use axum::extract::{Path, State};
use axum::response::Html;
use wanderlust_core::rest::{EmptyBody, RestResult};

/// API handler.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    Path(id): Path<String>,
    _: EmptyBody,
) -> RestResult<Html<String>> {
    let id = parse_listing_id(&id)?;
    let details = driver.get_listing(id).await?;
    Ok(Html(views::show(&details)))
}

#[cfg(test)]
mod tests {
    use crate::model::*;
    use crate::rest::testutils::*;
    use axum::http;
    use wanderlust_core::rest::testutils::*;

    fn route(id: &str) -> (http::Method, String) {
        (http::Method::GET, format!("/listings/{}", id))
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContext::setup().await;

        let id = context.put_listing("Desert camp").await;
        let review_id = context.put_review(id, "Starry nights").await;

        let body = OneShotBuilder::new(context.app(), route(&id.to_string()))
            .send_empty()
            .await
            .expect_html("<h1>Desert camp</h1>")
            .await;
        assert!(body.contains("Starry nights"));
        assert!(body.contains(&format!("/listings/{}/reviews/{}?_method=DELETE", id, review_id)));
    }

    #[tokio::test]
    async fn test_not_found() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route(&ListingId::new_random().to_string()))
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("^Listing not found$")
            .await;
    }

    #[tokio::test]
    async fn test_malformed_id() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route("12345"))
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("^Listing not found$")
            .await;
    }

    test_payload_must_be_empty!(
        TestContext::setup().await.app(),
        route(&ListingId::new_random().to_string())
    );
}
