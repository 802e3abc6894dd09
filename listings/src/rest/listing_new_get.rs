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

//! API to get the form to create a listing.

use crate::rest::views;
use axum::response::Html;
use wanderlust_core::rest::EmptyBody;

/// API handler.
pub(crate) async fn handler(_: EmptyBody) -> Html<String> {
    Html(views::new_listing())
}

#[cfg(test)]
mod tests {
    use crate::rest::testutils::*;
    use axum::http;
    use wanderlust_core::rest::testutils::*;

    fn route() -> (http::Method, String) {
        (http::Method::GET, "/listings/new".to_owned())
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route())
            .send_empty()
            .await
            .expect_html(r#"<form class="listing-form" method="POST" action="/listings">"#)
            .await;
    }

    test_payload_must_be_empty!(TestContext::setup().await.app(), route());
}
