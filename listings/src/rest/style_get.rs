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

//! API to fetch the stylesheet of the site.

use axum::http::header;
use axum::response::IntoResponse;
use wanderlust_core::rest::EmptyBody;

/// Stylesheet shared by all pages.
const STYLE: &str = include_str!("style.css");

/// API handler.
pub(crate) async fn handler(_: EmptyBody) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], STYLE)
}

#[cfg(test)]
mod tests {
    use crate::rest::testutils::*;
    use axum::http;
    use wanderlust_core::rest::testutils::*;

    fn route() -> (http::Method, String) {
        (http::Method::GET, "/css/style.css".to_owned())
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContext::setup().await;

        let response =
            OneShotBuilder::new(context.app(), route()).send_empty().await.take_response().await;
        assert_eq!(
            "text/css; charset=utf-8",
            response.headers().get(http::header::CONTENT_TYPE).unwrap().to_str().unwrap()
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8(body.to_vec()).unwrap().contains(".listing-card"));
    }

    test_payload_must_be_empty!(TestContext::setup().await.app(), route());
}
