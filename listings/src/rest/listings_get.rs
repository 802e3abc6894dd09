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

//! API to browse all listings.

use crate::driver::Driver;
use crate::rest::views;
use axum::extract::State;
use axum::response::Html;
use wanderlust_core::rest::{EmptyBody, RestResult};

/// API handler.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    _: EmptyBody,
) -> RestResult<Html<String>> {
    let listings = driver.get_listings().await?;
    Ok(Html(views::index(&listings)))
}

#[cfg(test)]
mod tests {
    use crate::rest::testutils::*;
    use axum::http;
    use wanderlust_core::rest::testutils::*;

    fn route() -> (http::Method, String) {
        (http::Method::GET, "/listings".to_owned())
    }

    #[tokio::test]
    async fn test_empty() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route())
            .send_empty()
            .await
            .expect_html("No listings yet")
            .await;
    }

    #[tokio::test]
    async fn test_some() {
        let context = TestContext::setup().await;

        let id1 = context.put_listing("Beach hut").await;
        let id2 = context.put_listing("Tree house").await;

        let body = OneShotBuilder::new(context.app(), route())
            .send_empty()
            .await
            .expect_html("(?s)Beach hut.*Tree house")
            .await;
        assert!(body.contains(&format!("/listings/{}", id1)));
        assert!(body.contains(&format!("/listings/{}", id2)));
    }

    test_payload_must_be_empty!(TestContext::setup().await.app(), route());
}
