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

//! Schema validators for the payloads that clients submit.
//!
//! Validators check the shape of an untyped payload and, if it is acceptable, convert it into the
//! corresponding typed model value.  All problems found in a payload are reported at once in a
//! single `ModelError` whose message joins the individual problems with commas.

use crate::model::{ListingFields, ListingUpdate, NewReview, Price, Rating};
use serde_json::{Map, Value};
use wanderlust_core::model::{ModelError, ModelResult};

/// Names of the fields that make up a listing, in display order.
const LISTING_FIELDS: &[&str] = &["title", "description", "image", "price", "location", "country"];

/// Names of the fields that make up a review.
const REVIEW_FIELDS: &[&str] = &["comment", "rating"];

/// Accumulator of the problems found while validating a payload.
#[derive(Default)]
struct Problems(Vec<String>);

impl Problems {
    /// Records the outcome of a field check, returning the value if the check passed.
    fn check<T>(&mut self, result: Result<T, String>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(message) => {
                self.0.push(message);
                None
            }
        }
    }

    /// Records that the required field `name` is missing.
    fn missing(&mut self, name: &str) {
        self.0.push(format!("\"{}\" is required", name));
    }

    /// Records a problem for every key in `payload` that is not in `allowed`.  Keys are reported
    /// as `prefix` followed by the key name.
    fn reject_unknown(&mut self, payload: &Map<String, Value>, allowed: &[&str], prefix: &str) {
        for key in payload.keys() {
            if !allowed.contains(&key.as_str()) {
                self.0.push(format!("\"{}{}\" is not allowed", prefix, key));
            }
        }
    }

    /// Returns true if no problems have been found.
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts the accumulated problems into an error.
    fn into_error(self) -> ModelError {
        ModelError(self.0.join(","))
    }
}

/// Checks that `value` is a string with some non-whitespace content and returns it as submitted.
fn check_text(name: &str, value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => {
            if s.trim().is_empty() {
                Err(format!("\"{}\" is not allowed to be empty", name))
            } else {
                Ok(s.clone())
            }
        }
        _ => Err(format!("\"{}\" must be a string", name)),
    }
}

/// Extracts a number from `value`, which can be a JSON number or a string holding a number as
/// submitted by HTML forms.
fn as_number(name: &str, value: &Value) -> Result<f64, String> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(format!("\"{}\" must be a number", name)),
    }
}

/// Checks that `value` is a valid price.
fn check_price(value: &Value) -> Result<Price, String> {
    let number = as_number("price", value)?;
    Price::new(number).map_err(|e| e.0)
}

/// Checks that `value` is a valid rating for the field `name`.
fn check_rating(name: &str, value: &Value) -> Result<Rating, String> {
    let number = as_number(name, value)?;
    if number.fract() != 0.0 {
        return Err(format!("\"{}\" must be an integer", name));
    }
    if number < Rating::MIN as f64 {
        return Err(format!("\"{}\" must be greater than or equal to {}", name, Rating::MIN));
    }
    if number > Rating::MAX as f64 {
        return Err(format!("\"{}\" must be less than or equal to {}", name, Rating::MAX));
    }
    Rating::new(number as i64).map_err(|e| e.0)
}

/// Validates the payload of a request to create a listing.
pub(crate) fn validate_listing(payload: &Map<String, Value>) -> ModelResult<ListingFields> {
    let mut problems = Problems::default();

    let text = |name: &str, problems: &mut Problems| match payload.get(name) {
        Some(value) => problems.check(check_text(name, value)),
        None => {
            problems.missing(name);
            None
        }
    };
    let title = text("title", &mut problems);
    let description = text("description", &mut problems);
    let image = text("image", &mut problems);
    let price = match payload.get("price") {
        Some(value) => problems.check(check_price(value)),
        None => {
            problems.missing("price");
            None
        }
    };
    let location = text("location", &mut problems);
    let country = text("country", &mut problems);
    problems.reject_unknown(payload, LISTING_FIELDS, "");

    match (title, description, image, price, location, country) {
        (Some(title), Some(description), Some(image), Some(price), Some(location), Some(country))
            if problems.is_empty() =>
        {
            Ok(ListingFields::new(title, description, image, price, location, country))
        }
        _ => Err(problems.into_error()),
    }
}

/// Validates the payload of a request to update a listing.
///
/// Only the fields present in the payload are validated and included in the update, but at least
/// one field must be present.
pub(crate) fn validate_listing_update(payload: &Map<String, Value>) -> ModelResult<ListingUpdate> {
    let mut problems = Problems::default();

    let text = |name: &str, problems: &mut Problems| {
        payload.get(name).and_then(|value| problems.check(check_text(name, value)))
    };
    let update = ListingUpdate {
        title: text("title", &mut problems),
        description: text("description", &mut problems),
        image: text("image", &mut problems),
        price: payload.get("price").and_then(|value| problems.check(check_price(value))),
        location: text("location", &mut problems),
        country: text("country", &mut problems),
    };
    problems.reject_unknown(payload, LISTING_FIELDS, "");
    if !LISTING_FIELDS.iter().any(|name| payload.contains_key(*name)) {
        problems.0.push(format!(
            "\"value\" must contain at least one of [{}]",
            LISTING_FIELDS.join(", ")
        ));
    }
    if !problems.is_empty() {
        return Err(problems.into_error());
    }

    Ok(update)
}

/// Validates the payload of a request to create a review, which carries the review's fields
/// nested under a `review` object.
pub(crate) fn validate_review(payload: &Map<String, Value>) -> ModelResult<NewReview> {
    let mut problems = Problems::default();
    problems.reject_unknown(payload, &["review"], "");

    let review = match payload.get("review") {
        Some(Value::Object(review)) => review,
        Some(_) => {
            problems.0.push("\"review\" must be of type object".to_owned());
            return Err(problems.into_error());
        }
        None => {
            problems.missing("review");
            return Err(problems.into_error());
        }
    };

    let comment = match review.get("comment") {
        Some(value) => problems.check(check_text("review.comment", value)),
        None => {
            problems.missing("review.comment");
            None
        }
    };
    let rating = match review.get("rating") {
        Some(value) => problems.check(check_rating("review.rating", value)),
        None => {
            problems.missing("review.rating");
            None
        }
    };
    problems.reject_unknown(review, REVIEW_FIELDS, "review.");

    match (comment, rating) {
        (Some(comment), Some(rating)) if problems.is_empty() => Ok(NewReview::new(comment, rating)),
        _ => Err(problems.into_error()),
    }
}
