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

//! API to get the form to edit a listing.

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
    Ok(Html(views::edit(details.listing())))
}

#[cfg(test)]
mod tests {
    use crate::model::*;
    use crate::rest::testutils::*;
    use axum::http;
    use wanderlust_core::rest::testutils::*;

    fn route(id: &str) -> (http::Method, String) {
        (http::Method::GET, format!("/listings/{}/edit", id))
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContext::setup().await;

        let id = context.put_listing("Houseboat").await;

        let body = OneShotBuilder::new(context.app(), route(&id.to_string()))
            .send_empty()
            .await
            .expect_html(r#"value="Houseboat""#)
            .await;
        assert!(body.contains(&format!("action=\"/listings/{}?_method=PUT\"", id)));
        assert!(body.contains(r#"value="2500""#));
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

        OneShotBuilder::new(context.app(), route("not-a-uuid"))
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
