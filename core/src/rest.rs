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

//! Generic code for server-rendered HTTP handlers.
//!
//! All services should implement an `app` function in their `rest` module that returns the
//! `Router` for the application.
//!
//! Every API should be put in its own `.rs` file, using a name like `<entity>_<method>.rs`.  This
//! may seem overkill, but putting every API in its own file makes it easy to ensure all the
//! integration tests for the given API truly belong to that API.
//!
//! More specifically, the `tests` module within an API should define a `route` method that
//! returns the HTTP method and the API path under test.  All integration tests within the module
//! then rely on `route` to obtain this information, ensuring that they all test the desired API.
//!
//! Errors returned by handlers are funneled through `RestError`, which renders a single HTML
//! error page carrying the status code and the error message.

use crate::driver::DriverError;
use crate::model::ModelError;
use crate::template;
use async_trait::async_trait;
use axum::Router;
use axum::body::HttpBody;
use axum::extract::{FromRequest, Request};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use bytes::Bytes;
use http::{Method, StatusCode};
use log::warn;
use serde_json::{Map, Value};
use tower::Layer;

/// HTML page rendered for any failed request.
const ERROR_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head><title>%status% %reason%</title></head>

<body>
<div class="error">
<h1>%status% %reason%</h1>
<p class="error-message">%message%</p>
<a href="/listings">Back to all listings</a>
</div>
</body>
</html>
"#;

/// Frontend errors.  These are the errors that are visible to the user on failed requests.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RestError {
    /// Catch-all error type for all unexpected errors.
    #[error("{0}")]
    InternalError(String),

    /// Indicates an error in the contents of the request.
    #[error("{0}")]
    InvalidRequest(String),

    /// Indicates that a requested entity or page does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Indicates that a request that should have empty content did not.
    #[error("Content should be empty")]
    PayloadNotEmpty,
}

impl RestError {
    /// Returns the HTTP status code that represents this error.
    pub fn status(&self) -> StatusCode {
        match self {
            RestError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RestError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RestError::NotFound(_) => StatusCode::NOT_FOUND,
            RestError::PayloadNotEmpty => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl From<DriverError> for RestError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::AlreadyExists(_) => RestError::InvalidRequest(e.to_string()),
            DriverError::BackendError(_) => RestError::InternalError(e.to_string()),
            DriverError::InvalidInput(_) => RestError::InvalidRequest(e.to_string()),
            DriverError::NotFound(_) => RestError::NotFound(e.to_string()),
        }
    }
}

impl From<ModelError> for RestError {
    fn from(e: ModelError) -> Self {
        RestError::InvalidRequest(e.to_string())
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed with {}: {}", status, self);
        }

        let message = self.to_string();
        let message = if message.is_empty() { "Something went wrong".to_owned() } else { message };
        let body = template::apply(
            ERROR_TEMPLATE,
            &[
                ("status", status.as_str()),
                ("reason", status.canonical_reason().unwrap_or("Error")),
                ("message", &template::escape(&message)),
            ],
        );

        (status, Html(body)).into_response()
    }
}

/// Result type for this module.
pub type RestResult<T> = Result<T, RestError>;

/// A request body extractor that forbids any content.
///
/// Any API that doesn't expect a body should use this to ensure we don't get garbage data that we
/// don't care about.  This future-proofs the service.
pub struct EmptyBody {}

#[async_trait]
impl<S> FromRequest<S> for EmptyBody
where
    S: Send + Sync,
{
    type Rejection = RestError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        if req.into_body().is_end_stream() {
            Ok(EmptyBody {})
        } else {
            Err(RestError::PayloadNotEmpty)
        }
    }
}

/// Maximum nesting of `outer[inner]` keys accepted in forms.
const FORM_MAX_DEPTH: usize = 5;

/// A request body extractor that accepts either a JSON object or a URL-encoded form.
///
/// Form keys of the shape `outer[inner]` are nested as `{"outer": {"inner": ...}}`.  Both
/// representations are converted to the same JSON object so that handlers can validate
/// their input once, regardless of whether the request came from an HTML form or from an API
/// client.  A request without a content type and without a body yields an empty object.
#[derive(Debug)]
pub struct Payload(pub Map<String, Value>);

#[async_trait]
impl<S> FromRequest<S> for Payload
where
    S: Send + Sync,
{
    type Rejection = RestError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(http::header::CONTENT_TYPE)
            .map(|value| value.to_str().map(str::to_owned))
            .transpose()
            .map_err(|_| RestError::InvalidRequest("Invalid Content-Type header".to_owned()))?;

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| RestError::InvalidRequest(format!("Cannot read request body: {}", e)))?;

        let Some(content_type) = content_type else {
            if body.is_empty() {
                return Ok(Payload(Map::new()));
            }
            return Err(RestError::InvalidRequest("Missing Content-Type header".to_owned()));
        };

        let mime = content_type.parse::<mime::Mime>().map_err(|e| {
            RestError::InvalidRequest(format!("Invalid Content-Type {}: {}", content_type, e))
        })?;
        if mime.essence_str() == mime::APPLICATION_JSON.essence_str() {
            match serde_json::from_slice::<Value>(&body) {
                Ok(Value::Object(map)) => Ok(Payload(map)),
                Ok(_) => Err(RestError::InvalidRequest("Request body must be an object".to_owned())),
                Err(e) => Err(RestError::InvalidRequest(format!("Invalid JSON: {}", e))),
            }
        } else if mime.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
            // Browsers percent-encode the brackets of nested keys, so strict mode cannot be used.
            let map = serde_qs::Config::new(FORM_MAX_DEPTH, false)
                .deserialize_bytes::<Map<String, Value>>(&body)
                .map_err(|e| RestError::InvalidRequest(format!("Invalid form: {}", e)))?;
            Ok(Payload(map))
        } else {
            Err(RestError::InvalidRequest(format!("Unsupported content type {}", content_type)))
        }
    }
}

/// Extracts the method requested via the `_method` query parameter, if any.
///
/// Only methods that HTML forms cannot issue on their own are honored.
fn overridden_method(query: Option<&str>) -> Option<Method> {
    let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(query?).ok()?;
    let (_, method) = pairs.into_iter().find(|(key, _)| key == "_method")?;
    match method.to_ascii_uppercase().as_str() {
        "DELETE" => Some(Method::DELETE),
        "PATCH" => Some(Method::PATCH),
        "PUT" => Some(Method::PUT),
        _ => None,
    }
}

/// Middleware that rewrites `POST` requests carrying a `_method` query parameter into the
/// requested method.
async fn method_override(mut request: Request, next: Next) -> Response {
    if request.method() == Method::POST {
        if let Some(method) = overridden_method(request.uri().query()) {
            *request.method_mut() = method;
        }
    }
    next.run(request).await
}

/// Wraps `router` so that HTML forms can reach `PUT`, `PATCH` and `DELETE` routes by submitting
/// a `POST` with a `_method` query parameter.
///
/// The rewrite has to happen before routing, which is why the original router becomes the
/// fallback service of a new router instead of receiving a layer.
pub fn with_method_override(router: Router) -> Router {
    Router::new().fallback_service(middleware::from_fn(method_override).layer(router))
}

/// Common test code for the REST server.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    use super::*;
    use axum::http::{self, HeaderName, HeaderValue};
    use serde::Serialize;
    use tower::util::ServiceExt;

    /// Maximum body size for testing purposes.
    const MAX_BODY_SIZE: usize = 1024 * 1024;

    /// Builder for a single request to the API server.
    #[must_use]
    pub struct OneShotBuilder {
        /// The router for the app being tested.
        app: Router,

        /// Builder for the request that will be sent to the app.
        builder: axum::http::request::Builder,
    }

    impl OneShotBuilder {
        /// Creates a new request against a given `method`/`uri` pair served by an `app` router.
        pub fn new<U: AsRef<str>>(app: Router, (method, uri): (Method, U)) -> Self {
            let builder = Request::builder().method(method).uri(uri.as_ref());
            Self { app, builder }
        }

        /// Sets the header `name` to `value` in the outgoing request.
        pub fn with_header<K, V>(mut self, name: K, value: V) -> Self
        where
            HeaderName: TryFrom<K>,
            <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
            HeaderValue: TryFrom<V>,
            <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
        {
            self.builder = self.builder.header(name, value);
            self
        }

        /// Finishes building the request and sends it with an empty payload.
        pub async fn send_empty(self) -> ResponseChecker {
            let request = self.builder.body(axum::body::Body::empty()).unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }

        /// Finishes building the request and sends it with a text payload.
        pub async fn send_text<T: Into<String>>(self, text: T) -> ResponseChecker {
            let request = self
                .builder
                .header(http::header::CONTENT_TYPE, mime::TEXT_PLAIN.as_ref())
                .body(axum::body::Body::from(text.into()))
                .unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }

        /// Finishes building the request and sends it with a form encoded in the body as the
        /// payload.
        pub async fn send_form<T: Serialize>(self, request: T) -> ResponseChecker {
            let request = self
                .builder
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_WWW_FORM_URLENCODED.as_ref())
                .body(axum::body::Body::from(serde_urlencoded::to_string(&request).unwrap()))
                .unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }

        /// Finishes building the request and sends it with a JSON payload.
        pub async fn send_json<T: Serialize>(self, request: T) -> ResponseChecker {
            let request = self
                .builder
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(axum::body::Body::from(serde_json::to_vec(&request).unwrap()))
                .unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }
    }

    /// Reverts the effects of `template::escape` on `text`.
    fn unescape(text: &str) -> String {
        text.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&amp;", "&")
    }

    /// Validator for the outcome of a request sent by a `OneShotBuilder`.
    #[must_use]
    pub struct ResponseChecker {
        /// Actual response that we received from the app.
        response: Response,

        /// Expected HTTP status code in the response above.
        exp_status: StatusCode,
    }

    impl From<Response> for ResponseChecker {
        fn from(response: Response) -> Self {
            Self { response, exp_status: StatusCode::OK }
        }
    }

    impl ResponseChecker {
        /// Sets the expected exit HTTP status to `status`.
        pub fn expect_status(mut self, status: StatusCode) -> Self {
            self.exp_status = status;
            self
        }

        /// Performs common validation operations on the response.
        pub fn verify(&self) {
            assert_eq!(self.exp_status, self.response.status());
        }

        /// Returns the value of the `Content-Type` header of the response, if any.
        fn content_type(&self) -> Option<&str> {
            self.response
                .headers()
                .get(http::header::CONTENT_TYPE)
                .map(|value| value.to_str().unwrap())
        }

        /// Consumes the response and returns its body as UTF-8.
        async fn into_body_text(self) -> String {
            let body =
                axum::body::to_bytes(self.response.into_body(), MAX_BODY_SIZE).await.unwrap();
            String::from_utf8(body.to_vec()).unwrap()
        }

        /// Finishes checking the response and expects it to contain an empty body.
        pub async fn expect_empty(self) {
            self.verify();

            let body = self.into_body_text().await;
            assert!(body.is_empty(), "Body not empty; got {}", body);
        }

        /// Finishes checking the response and expects it to be the rendered error page with a
        /// message that matches `exp_re`.
        pub async fn expect_error(self, exp_re: &str) {
            self.verify();
            assert_eq!(Some("text/html; charset=utf-8"), self.content_type());

            let body = self.into_body_text().await;
            let message_re = regex::Regex::new(r#"(?s)<p class="error-message">(.*?)</p>"#).unwrap();
            let message = match message_re.captures(&body) {
                Some(captures) => unescape(&captures[1]),
                None => panic!("Response is not an error page; content was {}", body),
            };

            let re = regex::Regex::new(exp_re).unwrap();
            assert!(
                re.is_match(&message),
                "Error message '{}' does not match re '{}'",
                message,
                exp_re
            );
        }

        /// Finishes checking the response and expects it to be a redirection.  Returns the
        /// location the response redirects to.
        pub async fn expect_redirect(self) -> String {
            let checker = self.expect_status(StatusCode::SEE_OTHER);
            checker.verify();

            let location = checker
                .response
                .headers()
                .get(http::header::LOCATION)
                .expect("Redirections must have a Location header")
                .to_str()
                .unwrap()
                .to_owned();
            checker.expect_empty().await;
            location
        }

        /// Finishes checking the response and expects it to be an HTML document whose body
        /// matches `exp_re`.  Returns the body for further validation.
        pub async fn expect_html(self, exp_re: &str) -> String {
            self.verify();
            assert_eq!(Some("text/html; charset=utf-8"), self.content_type());

            let body = self.into_body_text().await;
            let re = regex::Regex::new(exp_re).unwrap();
            assert!(re.is_match(&body), "Body content '{}' does not match re '{}'", body, exp_re);
            body
        }

        /// Finishes checking the response and expects its body to be valid UTF-8 and to match
        /// `exp_re`.
        pub async fn expect_text(self, exp_re: &str) {
            assert!(!exp_re.is_empty(), "Use expect_empty to validate empty responses");

            self.verify();

            let body = self.into_body_text().await;
            let re = regex::Regex::new(exp_re).unwrap();
            assert!(re.is_match(&body), "Body content '{}' does not match re '{}'", body, exp_re);
        }

        /// Finishes checking the response and returns the body of the response as UTF-8.
        pub async fn take_body_as_text(self) -> String {
            self.verify();
            self.into_body_text().await
        }

        /// Finishes checking the response and returns the response itself for out of band
        /// validation of properties not supported by the `ResponseChecker`.
        pub async fn take_response(self) -> Response {
            self.verify();
            self.response
        }
    }

    /// Generates a test to verify that an API that does not expect a payload fails as necessary.
    #[macro_export]
    macro_rules! test_payload_must_be_empty {
        ( $app:expr, $route:expr ) => {
            #[tokio::test]
            async fn test_payload_must_be_empty() {
                $crate::rest::testutils::OneShotBuilder::new($app, $route)
                    .send_text("should not be here")
                    .await
                    .expect_status(axum::http::StatusCode::PAYLOAD_TOO_LARGE)
                    .expect_error("should be empty")
                    .await;
            }
        };
    }

    pub use test_payload_must_be_empty;

    /// Generates a test to verify that an API that expects a form or JSON object in its body
    /// fails when it gets something else.
    #[macro_export]
    macro_rules! test_payload_must_be_form_or_json {
        ( $app:expr, $route:expr ) => {
            #[tokio::test]
            async fn test_payload_must_be_form_or_json() {
                $crate::rest::testutils::OneShotBuilder::new($app, $route)
                    .send_text("this is not a form")
                    .await
                    .expect_status(axum::http::StatusCode::BAD_REQUEST)
                    .expect_error("Unsupported content type text/plain")
                    .await;

                $crate::rest::testutils::OneShotBuilder::new($app, $route)
                    .with_header(axum::http::header::CONTENT_TYPE, "application/json")
                    .send_empty()
                    .await
                    .expect_status(axum::http::StatusCode::BAD_REQUEST)
                    .expect_error("Invalid JSON")
                    .await;
            }
        };
    }

    pub use test_payload_must_be_form_or_json;
}
