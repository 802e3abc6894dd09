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

//! Entry point to the HTTP server.

use crate::driver::Driver;
use crate::model::{ListingId, ReviewId};
use axum::Router;
use axum::routing::MethodRouter;
use wanderlust_core::rest::{RestError, RestResult, with_method_override};

mod listing_delete;
mod listing_edit_get;
mod listing_error_get;
mod listing_get;
mod listing_new_get;
mod listing_put;
mod listings_get;
mod listings_post;
mod review_delete;
mod reviews_post;
mod root_get;
mod style_get;
#[cfg(test)]
mod testutils;
mod views;

/// Handler for requests that do not match any route.
async fn not_found() -> RestError {
    RestError::NotFound("Page Not Found".to_owned())
}

/// Makes requests with an unsupported method on `route` go through the same path as requests
/// for unknown pages.
fn or_not_found(route: MethodRouter<Driver>) -> MethodRouter<Driver> {
    route.fallback(not_found)
}

/// Parses the listing identifier given in a path.
///
/// Malformed identifiers cannot match any listing so they are reported as missing listings.
fn parse_listing_id(id: &str) -> RestResult<ListingId> {
    id.trim().parse::<ListingId>().map_err(|_| RestError::NotFound("Listing not found".to_owned()))
}

/// Parses the review identifier given in a path.
fn parse_review_id(id: &str) -> RestResult<ReviewId> {
    id.trim().parse::<ReviewId>().map_err(|_| RestError::NotFound("Review not found".to_owned()))
}

/// Creates the router for the application.
pub(crate) fn app(driver: Driver) -> Router {
    use axum::routing::{delete, get, post};

    let router = Router::new()
        .route("/", or_not_found(get(root_get::handler)))
        .route("/css/style.css", or_not_found(get(style_get::handler)))
        .route(
            "/listings",
            or_not_found(get(listings_get::handler).post(listings_post::handler)),
        )
        .route("/listings/new", or_not_found(get(listing_new_get::handler)))
        .route("/listings/error", or_not_found(get(listing_error_get::handler)))
        .route(
            "/listings/:id",
            or_not_found(
                get(listing_get::handler)
                    .put(listing_put::handler)
                    .delete(listing_delete::handler),
            ),
        )
        .route("/listings/:id/edit", or_not_found(get(listing_edit_get::handler)))
        .route("/listings/:id/reviews", or_not_found(post(reviews_post::handler)))
        .route(
            "/listings/:id/reviews/:review_id",
            or_not_found(delete(review_delete::handler)),
        )
        .fallback(not_found)
        .with_state(driver);

    with_method_override(router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::testutils::*;
    use axum::http;
    use wanderlust_core::rest::testutils::*;

    #[tokio::test]
    async fn test_unknown_page() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), (http::Method::GET, "/no/such/page"))
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("^Page Not Found$")
            .await;
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), (http::Method::POST, "/listings/new"))
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("^Page Not Found$")
            .await;
    }

    #[test]
    fn test_parse_ids() {
        let id = ListingId::new_random();
        assert_eq!(Ok(id), parse_listing_id(&format!(" {} ", id)));
        assert_eq!(
            Err(RestError::NotFound("Listing not found".to_owned())),
            parse_listing_id("12345")
        );
        assert_eq!(
            Err(RestError::NotFound("Review not found".to_owned())),
            parse_review_id("abc")
        );
    }
}
