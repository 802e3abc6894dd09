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

//! API to delete a review of a listing.

use crate::driver::Driver;
use crate::rest::{parse_listing_id, parse_review_id};
use axum::extract::{Path, State};
use axum::response::Redirect;
use wanderlust_core::rest::{EmptyBody, RestResult};

/// API handler.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    Path((id, review_id)): Path<(String, String)>,
    _: EmptyBody,
) -> RestResult<Redirect> {
    let id = parse_listing_id(&id)?;
    let review_id = parse_review_id(&review_id)?;
    driver.delete_review(id, review_id).await?;
    Ok(Redirect::to(&format!("/listings/{}", id)))
}
