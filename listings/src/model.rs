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

//! High-level data types.

use derive_getters::{Dissolve, Getters};
use derive_more::{AsRef, Constructor, Display};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;
use wanderlust_core::model::{ModelError, ModelResult};

pub(crate) mod validation;

/// Parses `s` as a UUID, describing what the value was for in the error.
fn parse_uuid(what: &str, s: &str) -> ModelResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| ModelError(format!("Invalid {} id '{}': {}", what, s, e)))
}

/// Unique identifier of a listing.
#[derive(AsRef, Clone, Constructor, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct ListingId(Uuid);

impl ListingId {
    /// Generates a new random identifier.
    pub(crate) fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for ListingId {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        parse_uuid("listing", s).map(Self)
    }
}

/// Unique identifier of a review.
#[derive(AsRef, Clone, Constructor, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct ReviewId(Uuid);

impl ReviewId {
    /// Generates a new random identifier.
    pub(crate) fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for ReviewId {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        parse_uuid("review", s).map(Self)
    }
}

/// Nightly price of a listing.  Guaranteed to be finite and not negative.
#[derive(Clone, Copy, Debug, Display, PartialEq, PartialOrd)]
pub(crate) struct Price(f64);

impl Price {
    /// Creates a new price after validating that `value` is acceptable.
    pub(crate) fn new(value: f64) -> ModelResult<Self> {
        if !value.is_finite() {
            return Err(ModelError("\"price\" must be a number".to_owned()));
        }
        if value < 0.0 {
            return Err(ModelError("\"price\" must be greater than or equal to 0".to_owned()));
        }
        Ok(Self(value))
    }

    /// Returns the price as a float.
    pub(crate) fn as_f64(&self) -> f64 {
        self.0
    }
}

/// Score given by a review, between `Rating::MIN` and `Rating::MAX`.
#[derive(Clone, Copy, Debug, Display, Eq, Ord, PartialEq, PartialOrd)]
pub(crate) struct Rating(u8);

impl Rating {
    /// Lowest acceptable rating.
    pub(crate) const MIN: i64 = 1;

    /// Highest acceptable rating.
    pub(crate) const MAX: i64 = 5;

    /// Creates a new rating after validating that `value` is in range.
    pub(crate) fn new(value: i64) -> ModelResult<Self> {
        if value < Self::MIN {
            Err(ModelError(format!("Rating {} must be greater than or equal to {}", value, Self::MIN)))
        } else if value > Self::MAX {
            Err(ModelError(format!("Rating {} must be less than or equal to {}", value, Self::MAX)))
        } else {
            Ok(Self(value as u8))
        }
    }

    /// Returns the rating as an integer.
    pub(crate) fn as_i16(&self) -> i16 {
        i16::from(self.0)
    }
}

/// User-supplied content of a listing.
#[derive(Clone, Constructor, Debug, Getters, PartialEq)]
pub(crate) struct ListingFields {
    /// Short name of the place.
    title: String,

    /// Free-form description of the place.
    description: String,

    /// URL of a picture of the place.
    image: String,

    /// Nightly price.
    price: Price,

    /// City or region where the place is.
    location: String,

    /// Country where the place is.
    country: String,
}

/// Partial modification to the fields of a listing.  Fields set to `None` keep their value.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ListingUpdate {
    /// New title, if any.
    pub(crate) title: Option<String>,

    /// New description, if any.
    pub(crate) description: Option<String>,

    /// New image URL, if any.
    pub(crate) image: Option<String>,

    /// New price, if any.
    pub(crate) price: Option<Price>,

    /// New location, if any.
    pub(crate) location: Option<String>,

    /// New country, if any.
    pub(crate) country: Option<String>,
}

impl ListingUpdate {
    /// Applies this update on top of `fields` and returns the result.
    pub(crate) fn apply(self, fields: ListingFields) -> ListingFields {
        ListingFields {
            title: self.title.unwrap_or(fields.title),
            description: self.description.unwrap_or(fields.description),
            image: self.image.unwrap_or(fields.image),
            price: self.price.unwrap_or(fields.price),
            location: self.location.unwrap_or(fields.location),
            country: self.country.unwrap_or(fields.country),
        }
    }
}

/// A stored listing along with the ordered references to its reviews.
#[derive(Clone, Constructor, Debug, Dissolve, Getters, PartialEq)]
pub(crate) struct Listing {
    /// Identifier of the listing.
    id: ListingId,

    /// Content of the listing.
    fields: ListingFields,

    /// References to the reviews of this listing, oldest first.
    reviews: Vec<ReviewId>,
}

/// User-supplied content of a review.
#[derive(Clone, Constructor, Debug, Dissolve, Getters, PartialEq)]
pub(crate) struct NewReview {
    /// Text of the review.
    comment: String,

    /// Score given to the listing.
    rating: Rating,
}

/// A stored review.
#[derive(Clone, Constructor, Debug, Getters, PartialEq)]
pub(crate) struct Review {
    /// Identifier of the review.
    id: ReviewId,

    /// Text of the review.
    comment: String,

    /// Score given to the listing.
    rating: Rating,

    /// Time when the review was submitted.
    created_at: OffsetDateTime,
}

/// A listing with its review references resolved to the reviews themselves.
#[derive(Constructor, Debug, Getters, PartialEq)]
pub(crate) struct ListingDetails {
    /// The listing.
    listing: Listing,

    /// The reviews of the listing in the same order as the listing's references.
    reviews: Vec<Review>,
}
